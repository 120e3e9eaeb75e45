//! Neighborhood predicates.
//!
//! A predicate decides whether `candidate` belongs to the neighborhood of
//! `center`. Every implementation must be reflexive (`test(p, p)` is true for
//! any point that should be able to seed a cluster); a point failing its own
//! test is classified as noise. Errors are fatal for the whole run.

use dashmap::DashMap;
use rayon::prelude::*;
use std::sync::Arc;
use volseg_core::{Error, Mask, Point, Result, Shape, Volume};

pub trait NeighborhoodPredicate: Send + Sync {
    fn test(&self, center: Point, candidate: Point) -> Result<bool>;

    /// Check that any auxiliary data the predicate reads covers `shape`.
    /// Called once before a run starts.
    fn validate(&self, _shape: Shape) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "predicate"
    }
}

impl<P: NeighborhoodPredicate + ?Sized> NeighborhoodPredicate for Arc<P> {
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        (**self).test(center, candidate)
    }

    fn validate(&self, shape: Shape) -> Result<()> {
        (**self).validate(shape)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<P: NeighborhoodPredicate + ?Sized> NeighborhoodPredicate for Box<P> {
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        (**self).test(center, candidate)
    }

    fn validate(&self, shape: Shape) -> Result<()> {
        (**self).validate(shape)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Mask-only clustering: every masked voxel in range is a neighbor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Spatial;

impl NeighborhoodPredicate for Spatial {
    fn test(&self, _center: Point, _candidate: Point) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "spatial"
    }
}

/// Predicate backed by a closure.
pub struct FnPredicate<F> {
    f: F,
}

impl<F> FnPredicate<F>
where
    F: Fn(Point, Point) -> Result<bool> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> NeighborhoodPredicate for FnPredicate<F>
where
    F: Fn(Point, Point) -> Result<bool> + Send + Sync,
{
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        (self.f)(center, candidate)
    }

    fn name(&self) -> &str {
        "fn"
    }
}

/// Wrap an infallible closure.
pub fn from_fn<F>(f: F) -> FnPredicate<impl Fn(Point, Point) -> Result<bool> + Send + Sync>
where
    F: Fn(Point, Point) -> bool + Send + Sync,
{
    FnPredicate::new(move |c, p| Ok(f(c, p)))
}

/// Conjunction of predicates, e.g. spatial proximity plus a similarity test.
#[derive(Default, Clone)]
pub struct Composite {
    parts: Vec<Arc<dyn NeighborhoodPredicate>>,
}

impl Composite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, predicate: impl NeighborhoodPredicate + 'static) -> Self {
        self.parts.push(Arc::new(predicate));
        self
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl NeighborhoodPredicate for Composite {
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        for part in &self.parts {
            if !part.test(center, candidate)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn validate(&self, shape: Shape) -> Result<()> {
        self.parts.iter().try_for_each(|p| p.validate(shape))
    }

    fn name(&self) -> &str {
        "composite"
    }
}

/// Per-voxel scalar statistic.
pub trait ScalarField: Send + Sync {
    fn value(&self, p: Point) -> Result<f64>;

    /// Shape of the data the field reads, if it is bounded.
    fn shape(&self) -> Option<Shape> {
        None
    }
}

impl ScalarField for Volume<f64> {
    fn value(&self, p: Point) -> Result<f64> {
        self.get(p)
            .copied()
            .ok_or_else(|| Error::predicate_failure(p, format!("outside scalar volume {}", self.shape())))
    }

    fn shape(&self) -> Option<Shape> {
        Some(Volume::shape(self))
    }
}

impl ScalarField for Volume<f32> {
    fn value(&self, p: Point) -> Result<f64> {
        self.get(p)
            .map(|&v| v as f64)
            .ok_or_else(|| Error::predicate_failure(p, format!("outside scalar volume {}", self.shape())))
    }

    fn shape(&self) -> Option<Shape> {
        Some(Volume::shape(self))
    }
}

impl<S: ScalarField + ?Sized> ScalarField for Arc<S> {
    fn value(&self, p: Point) -> Result<f64> {
        (**self).value(p)
    }

    fn shape(&self) -> Option<Shape> {
        (**self).shape()
    }
}

/// Neighbors differ from the center by at most `max_difference` in `field`.
#[derive(Debug, Clone)]
pub struct ScalarThreshold<S> {
    field: S,
    max_difference: f64,
}

impl<S: ScalarField> ScalarThreshold<S> {
    pub fn new(field: S, max_difference: f64) -> Result<Self> {
        if !(max_difference >= 0.0) {
            return Err(Error::invalid_parameter(format!(
                "max_difference must be a non-negative number, got {}",
                max_difference
            )));
        }
        Ok(Self {
            field,
            max_difference,
        })
    }

    pub fn field(&self) -> &S {
        &self.field
    }

    pub fn max_difference(&self) -> f64 {
        self.max_difference
    }
}

impl<S: ScalarField> NeighborhoodPredicate for ScalarThreshold<S> {
    fn test(&self, center: Point, candidate: Point) -> Result<bool> {
        let a = self.field.value(center)?;
        let b = self.field.value(candidate)?;
        Ok((a - b).abs() <= self.max_difference)
    }

    fn validate(&self, shape: Shape) -> Result<()> {
        match self.field.shape() {
            Some(field_shape) if field_shape != shape => Err(Error::invalid_parameter(format!(
                "auxiliary data shape {} does not match grid shape {}",
                field_shape, shape
            ))),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "scalar-threshold"
    }
}

/// Caches an expensive [`ScalarField`] per voxel.
///
/// The cache is shared by every worker of a run, so each voxel's value is
/// computed at most a handful of times even under contention.
pub struct Memoized<S> {
    inner: S,
    cache: DashMap<Point, f64>,
}

impl<S: ScalarField> Memoized<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Precompute every masked voxel on the rayon pool.
    pub fn warm(&self, mask: &Mask) -> Result<()> {
        let points: Vec<Point> = mask.iter().filter(|(_, m)| **m).map(|(p, _)| p).collect();
        let values: Vec<(Point, f64)> = points
            .par_iter()
            .map(|&p| self.inner.value(p).map(|v| (p, v)))
            .collect::<Result<_>>()?;
        for (p, v) in values {
            self.cache.insert(p, v);
        }
        Ok(())
    }
}

impl<S: ScalarField> ScalarField for Memoized<S> {
    fn value(&self, p: Point) -> Result<f64> {
        if let Some(v) = self.cache.get(&p) {
            return Ok(*v);
        }
        let v = self.inner.value(p)?;
        self.cache.insert(p, v);
        Ok(v)
    }

    fn shape(&self) -> Option<Shape> {
        self.inner.shape()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl ScalarField for Counting {
        fn value(&self, p: Point) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(p.z as f64)
        }
    }

    #[test]
    fn test_spatial_is_always_true() {
        let a = Point::new(0, 0, 0);
        let b = Point::new(5, 5, 5);
        assert!(Spatial.test(a, b).unwrap());
        assert!(Spatial.test(a, a).unwrap());
    }

    #[test]
    fn test_scalar_threshold_is_inclusive() {
        let shape = Shape::new(1, 1, 3);
        let field = Volume::from_vec(shape, vec![0.0, 0.5, 1.5]).unwrap();
        let pred = ScalarThreshold::new(field, 0.5).unwrap();
        let p = |z| Point::new(0, 0, z);
        assert!(pred.test(p(0), p(1)).unwrap());
        assert!(!pred.test(p(0), p(2)).unwrap());
        assert!(pred.test(p(2), p(2)).unwrap());
    }

    #[test]
    fn test_scalar_threshold_rejects_negative_difference() {
        let field = Volume::filled(Shape::new(1, 1, 1), 0.0f64);
        assert!(ScalarThreshold::new(field.clone(), -0.1).is_err());
        assert!(ScalarThreshold::new(field, f64::NAN).is_err());
    }

    #[test]
    fn test_scalar_threshold_validates_shape() {
        let field = Volume::filled(Shape::new(2, 2, 2), 0.0f32);
        let pred = ScalarThreshold::new(field, 0.1).unwrap();
        assert!(pred.validate(Shape::new(2, 2, 2)).is_ok());
        assert!(pred.validate(Shape::new(3, 2, 2)).unwrap_err().is_validation());
    }

    #[test]
    fn test_out_of_range_field_is_predicate_failure() {
        let field = Volume::filled(Shape::new(1, 1, 1), 0.0f64);
        let pred = ScalarThreshold::new(field, 0.1).unwrap();
        let err = pred.test(Point::new(0, 0, 0), Point::new(0, 0, 1)).unwrap_err();
        assert!(matches!(err, Error::PredicateFailure { .. }));
    }

    #[test]
    fn test_memoized_computes_once() {
        let memo = Memoized::new(Counting {
            calls: AtomicUsize::new(0),
        });
        let p = Point::new(0, 0, 4);
        assert_eq!(memo.value(p).unwrap(), 4.0);
        assert_eq!(memo.value(p).unwrap(), 4.0);
        assert_eq!(memo.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(memo.cached(), 1);
    }

    #[test]
    fn test_memoized_warm_covers_mask() {
        let shape = Shape::new(2, 2, 2);
        let mut mask = Mask::filled(shape, true);
        mask[Point::new(0, 0, 0)] = false;
        let memo = Memoized::new(Counting {
            calls: AtomicUsize::new(0),
        });
        memo.warm(&mask).unwrap();
        assert_eq!(memo.cached(), 7);
        memo.value(Point::new(1, 1, 1)).unwrap();
        assert_eq!(memo.inner().calls.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn test_composite_is_a_conjunction() {
        let near = from_fn(|c: Point, p: Point| c.chebyshev(&p) <= 1);
        let same_x = from_fn(|c: Point, p: Point| c.x == p.x);
        let both = Composite::new().and(near).and(same_x);
        assert_eq!(both.len(), 2);
        let o = Point::new(1, 1, 1);
        assert!(both.test(o, Point::new(1, 2, 2)).unwrap());
        assert!(!both.test(o, Point::new(2, 1, 1)).unwrap());
        assert!(!both.test(o, Point::new(1, 3, 1)).unwrap());
        assert!(Composite::new().test(o, o).unwrap());
    }

    #[test]
    fn test_fallible_fn_predicate_propagates_error() {
        let pred = FnPredicate::new(|c: Point, _p: Point| {
            if c.x == 3 {
                Err(Error::predicate_failure(c, "bad voxel"))
            } else {
                Ok(true)
            }
        });
        assert!(pred.test(Point::new(0, 0, 0), Point::new(0, 0, 0)).unwrap());
        assert!(pred.test(Point::new(3, 0, 0), Point::new(0, 0, 0)).is_err());
    }
}
