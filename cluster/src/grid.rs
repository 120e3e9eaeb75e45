use crate::predicate::NeighborhoodPredicate;
use std::sync::Arc;
use volseg_core::{Error, Label, Mask, Point, Result, Shape, Volume};

/// Points within the eps-box of a center that pass the mask and predicate
/// tests, in scan order. The center is always included.
pub type Neighborhood = Vec<Point>;

/// Immutable parameters of one clustering run, shared read-only by the
/// orchestrator and every worker.
pub struct GridParams {
    shape: Shape,
    eps: usize,
    min_pts: usize,
    mask: Mask,
    predicate: Arc<dyn NeighborhoodPredicate>,
}

impl GridParams {
    pub fn new(
        shape: Shape,
        eps: usize,
        min_pts: usize,
        mask: Mask,
        predicate: Arc<dyn NeighborhoodPredicate>,
    ) -> Result<Self> {
        if min_pts < 1 {
            return Err(Error::invalid_parameter("min_pts must be >= 1"));
        }
        if shape.checked_len().is_none() {
            return Err(Error::invalid_parameter(format!("shape {} overflows usize", shape)));
        }
        if mask.shape() != shape {
            return Err(Error::invalid_parameter(format!(
                "mask shape {} does not match grid shape {}",
                mask.shape(),
                shape
            )));
        }
        predicate.validate(shape)?;

        Ok(Self {
            shape,
            eps,
            min_pts,
            mask,
            predicate,
        })
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn eps(&self) -> usize {
        self.eps
    }

    pub fn min_pts(&self) -> usize {
        self.min_pts
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn in_mask(&self, p: Point) -> bool {
        self.mask.get(p).copied().unwrap_or(false)
    }

    pub fn predicate(&self) -> &dyn NeighborhoodPredicate {
        self.predicate.as_ref()
    }

    pub fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        self.predicate.test(center, candidate)
    }

    /// Bounds-clipped box scan around `center`, O(eps³).
    pub fn neighborhood(&self, center: Point) -> Result<Neighborhood> {
        let mut neighborhood = Vec::new();
        for p in self.shape.box_around(center, self.eps) {
            if p == center || (self.mask[p] && self.predicate.test(center, p)?) {
                neighborhood.push(p);
            }
        }
        Ok(neighborhood)
    }

    /// Neighborhood of `p` when `p` is a core voxel: inside the mask,
    /// similar to itself and with at least `min_pts` neighbors.
    pub fn core_neighborhood(&self, p: Point) -> Result<Option<Neighborhood>> {
        if !self.in_mask(p) {
            return Ok(None);
        }
        let neighborhood = self.neighborhood(p)?;
        if neighborhood.len() < self.min_pts || !self.predicate.test(p, p)? {
            return Ok(None);
        }
        Ok(Some(neighborhood))
    }
}

impl std::fmt::Debug for GridParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridParams")
            .field("shape", &self.shape)
            .field("eps", &self.eps)
            .field("min_pts", &self.min_pts)
            .field("masked", &self.mask.count_true())
            .field("predicate", &self.predicate.name())
            .finish()
    }
}

/// One replica of the label grid.
///
/// The orchestrator and every worker hold their own `GridState`; they share
/// only the read-only [`GridParams`].
#[derive(Debug, Clone)]
pub struct GridState {
    params: Arc<GridParams>,
    labels: Volume<Label>,
}

impl GridState {
    pub fn new(params: Arc<GridParams>) -> Self {
        let labels = Volume::filled(params.shape(), Label::Unvisited);
        Self { params, labels }
    }

    pub fn params(&self) -> &Arc<GridParams> {
        &self.params
    }

    pub fn neighborhood(&self, p: Point) -> Result<Neighborhood> {
        self.params.neighborhood(p)
    }

    pub fn label(&self, p: Point) -> Label {
        self.labels[p]
    }

    pub fn set_label(&mut self, p: Point, label: Label) {
        self.labels[p] = label;
    }

    pub fn eps(&self) -> usize {
        self.params.eps()
    }

    pub fn min_pts(&self) -> usize {
        self.params.min_pts()
    }

    pub fn mask(&self) -> &Mask {
        self.params.mask()
    }

    pub fn shape(&self) -> Shape {
        self.params.shape()
    }

    pub fn labels(&self) -> &Volume<Label> {
        &self.labels
    }

    pub fn into_labels(self) -> Volume<Label> {
        self.labels
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{from_fn, Spatial};
    use proptest::prelude::*;

    fn params(shape: Shape, eps: usize, min_pts: usize, mask: Mask) -> Arc<GridParams> {
        Arc::new(GridParams::new(shape, eps, min_pts, mask, Arc::new(Spatial)).unwrap())
    }

    #[test]
    fn test_neighborhood_is_clipped_and_masked() {
        let shape = Shape::new(2, 2, 2);
        let mut mask = Mask::filled(shape, true);
        mask[Point::new(1, 1, 1)] = false;
        let p = params(shape, 1, 1, mask);

        let n = p.neighborhood(Point::new(0, 0, 0)).unwrap();
        assert_eq!(n.len(), 7);
        assert!(!n.contains(&Point::new(1, 1, 1)));
    }

    #[test]
    fn test_neighborhood_always_contains_center() {
        let shape = Shape::new(3, 3, 3);
        let mask = Mask::filled(shape, false);
        let p = params(shape, 1, 1, mask);
        assert_eq!(p.neighborhood(Point::new(1, 1, 1)).unwrap(), vec![Point::new(1, 1, 1)]);
    }

    #[test]
    fn test_zero_eps_is_self_only() {
        let shape = Shape::new(3, 3, 3);
        let p = params(shape, 0, 1, Mask::filled(shape, true));
        assert_eq!(p.neighborhood(Point::new(2, 0, 1)).unwrap(), vec![Point::new(2, 0, 1)]);
    }

    #[test]
    fn test_predicate_filters_candidates() {
        let shape = Shape::new(1, 1, 5);
        let pred = from_fn(|c: Point, p: Point| c.z.abs_diff(p.z) != 1);
        let p = GridParams::new(shape, 2, 1, Mask::filled(shape, true), Arc::new(pred)).unwrap();
        let n = p.neighborhood(Point::new(0, 0, 2)).unwrap();
        assert_eq!(n, vec![Point::new(0, 0, 0), Point::new(0, 0, 2), Point::new(0, 0, 4)]);
    }

    #[test]
    fn test_core_neighborhood() {
        let shape = Shape::new(1, 1, 3);
        let mask = Mask::from_points(shape, [Point::new(0, 0, 0), Point::new(0, 0, 1)]).unwrap();
        let p = params(shape, 1, 2, mask);
        assert_eq!(p.core_neighborhood(Point::new(0, 0, 0)).unwrap().map(|n| n.len()), Some(2));
        assert!(p.core_neighborhood(Point::new(0, 0, 2)).unwrap().is_none());

        let irreflexive = GridParams::new(
            shape,
            1,
            1,
            Mask::filled(shape, true),
            Arc::new(from_fn(|c: Point, p: Point| c != p)),
        )
        .unwrap();
        assert!(irreflexive.core_neighborhood(Point::new(0, 0, 1)).unwrap().is_none());
    }

    #[test]
    fn test_validation() {
        let shape = Shape::new(2, 2, 2);
        let other = Shape::new(2, 2, 3);
        let err = GridParams::new(shape, 1, 0, Mask::filled(shape, true), Arc::new(Spatial)).unwrap_err();
        assert!(err.is_validation());
        let err = GridParams::new(shape, 1, 1, Mask::filled(other, true), Arc::new(Spatial)).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_replicas_are_independent() {
        let shape = Shape::new(2, 2, 2);
        let p = params(shape, 1, 1, Mask::filled(shape, true));
        let mut a = GridState::new(p.clone());
        let b = GridState::new(p);
        a.set_label(Point::new(0, 1, 0), Label::Member);
        assert_eq!(a.label(Point::new(0, 1, 0)), Label::Member);
        assert_eq!(b.label(Point::new(0, 1, 0)), Label::Unvisited);
    }

    proptest! {
        #[test]
        fn prop_neighborhood_stays_in_box(
            dims in (1usize..6, 1usize..6, 1usize..6),
            eps in 0usize..3,
            seed in any::<u64>(),
        ) {
            let shape = Shape::from(dims);
            let center = shape.point(seed as usize % shape.len());
            let mask = Mask::from_fn(shape, |p| (p.x + 2 * p.y + 3 * p.z + seed as usize) % 3 != 0);
            let p = params(shape, eps, 1, mask.clone());

            let n = p.neighborhood(center).unwrap();
            prop_assert!(n.contains(&center));
            prop_assert!(n.windows(2).all(|w| w[0] < w[1]));
            for q in &n {
                prop_assert!(q.chebyshev(&center) <= eps);
                prop_assert!(*q == center || mask[*q]);
            }
            let expected = shape
                .box_around(center, eps)
                .filter(|q| *q == center || mask[*q])
                .count();
            prop_assert_eq!(n.len(), expected);
        }
    }
}
