use crate::grid::{Point, Shape};
use rayon::prelude::*;
use std::ops::{Index, IndexMut};

/// Dense 3D array of per-voxel values.
///
/// **Layout Convention:**
/// Data is stored contiguously with `z` as the fastest-varying dimension,
/// followed by `y`, and then `x`. The element at (x, y, z) is located at
/// `index = x * (ny * nz) + y * nz + z`, so iterating the buffer visits voxels
/// in scan order.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    shape: Shape,
    data: Vec<T>,
}

/// Membership mask: `true` voxels take part in clustering.
pub type Mask = Volume<bool>;

impl<T: Clone> Volume<T> {
    pub fn filled(shape: Shape, value: T) -> Self {
        Self {
            shape,
            data: vec![value; shape.len()],
        }
    }
}

impl<T> Volume<T> {
    pub fn from_vec(shape: Shape, data: Vec<T>) -> crate::Result<Self> {
        let expected = shape.checked_len().ok_or_else(|| {
            crate::Error::InvalidParameter(format!("Volume shape {} overflows usize", shape))
        })?;
        if data.len() != expected {
            return Err(crate::Error::InvalidParameter(format!(
                "Volume of shape {} needs {} values, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn from_fn(shape: Shape, mut f: impl FnMut(Point) -> T) -> Self {
        let data = shape.points().map(&mut f).collect();
        Self { shape, data }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, p: Point) -> Option<&T> {
        if self.shape.contains(p) {
            self.data.get(self.shape.offset(p))
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, p: Point) -> Option<&mut T> {
        if self.shape.contains(p) {
            let offset = self.shape.offset(p);
            self.data.get_mut(offset)
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Voxels with their coordinates, in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (Point, &T)> + '_ {
        self.data
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.shape.point(i), v))
    }

    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Volume<U> {
        Volume {
            shape: self.shape,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T: Sync> Volume<T> {
    /// Evaluate `f` at every voxel on the rayon pool.
    pub fn par_map<U: Send>(&self, f: impl Fn(Point, &T) -> U + Sync + Send) -> Volume<U> {
        let shape = self.shape;
        let data = self
            .data
            .par_iter()
            .enumerate()
            .map(|(i, v)| f(shape.point(i), v))
            .collect();
        Volume { shape, data }
    }
}

impl Mask {
    pub fn count_true(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Mask selecting exactly the listed points.
    pub fn from_points(shape: Shape, points: impl IntoIterator<Item = Point>) -> crate::Result<Self> {
        let mut mask = Self::filled(shape, false);
        for p in points {
            let cell = mask.get_mut(p).ok_or_else(|| {
                crate::Error::InvalidParameter(format!("Point {} lies outside shape {}", p, shape))
            })?;
            *cell = true;
        }
        Ok(mask)
    }
}

impl<T> Index<Point> for Volume<T> {
    type Output = T;

    fn index(&self, p: Point) -> &T {
        debug_assert!(self.shape.contains(p), "{} outside {}", p, self.shape);
        &self.data[self.shape.offset(p)]
    }
}

impl<T> IndexMut<Point> for Volume<T> {
    fn index_mut(&mut self, p: Point) -> &mut T {
        debug_assert!(self.shape.contains(p), "{} outside {}", p, self.shape);
        let offset = self.shape.offset(p);
        &mut self.data[offset]
    }
}
