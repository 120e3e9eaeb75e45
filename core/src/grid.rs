use std::fmt;

/// Integer voxel coordinate.
///
/// Ordering is lexicographic with `x` most significant, which is also the
/// order in which the grid is scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Point {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Point {
    pub const fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Chebyshev (box) distance between two points.
    pub fn chebyshev(&self, other: &Point) -> usize {
        self.x
            .abs_diff(other.x)
            .max(self.y.abs_diff(other.y))
            .max(self.z.abs_diff(other.z))
    }
}

impl From<(usize, usize, usize)> for Point {
    fn from((x, y, z): (usize, usize, usize)) -> Self {
        Self::new(x, y, z)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Dimensions of a voxel grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl Shape {
    pub const fn new(nx: usize, ny: usize, nz: usize) -> Self {
        Self { nx, ny, nz }
    }

    pub fn dims(&self) -> (usize, usize, usize) {
        (self.nx, self.ny, self.nz)
    }

    pub fn len(&self) -> usize {
        self.nx.saturating_mul(self.ny).saturating_mul(self.nz)
    }

    pub fn checked_len(&self) -> Option<usize> {
        self.nx
            .checked_mul(self.ny)
            .and_then(|partial| partial.checked_mul(self.nz))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x < self.nx && p.y < self.ny && p.z < self.nz
    }

    /// Linear offset of `p`: `x * (ny * nz) + y * nz + z`.
    pub fn offset(&self, p: Point) -> usize {
        (p.x * self.ny + p.y) * self.nz + p.z
    }

    pub fn point(&self, offset: usize) -> Point {
        let z = offset % self.nz;
        let rest = offset / self.nz;
        Point::new(rest / self.ny, rest % self.ny, z)
    }

    /// All points in scan order (x-major, z-minor).
    pub fn points(&self) -> impl Iterator<Item = Point> {
        let (nx, ny, nz) = self.dims();
        (0..nx).flat_map(move |x| (0..ny).flat_map(move |y| (0..nz).map(move |z| Point::new(x, y, z))))
    }

    /// Points of the box of radius `radius` around `center`, clipped to the grid,
    /// in scan order.
    pub fn box_around(&self, center: Point, radius: usize) -> impl Iterator<Item = Point> {
        let lo = |c: usize| c.saturating_sub(radius);
        let hi = |c: usize, n: usize| c.saturating_add(radius).saturating_add(1).min(n);
        let xs = lo(center.x)..hi(center.x, self.nx);
        let ys = lo(center.y)..hi(center.y, self.ny);
        let zs = lo(center.z)..hi(center.z, self.nz);
        xs.flat_map(move |x| {
            let zs = zs.clone();
            ys.clone()
                .flat_map(move |y| zs.clone().map(move |z| Point::new(x, y, z)))
        })
    }
}

impl From<(usize, usize, usize)> for Shape {
    fn from((nx, ny, nz): (usize, usize, usize)) -> Self {
        Self::new(nx, ny, nz)
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.nx, self.ny, self.nz)
    }
}
