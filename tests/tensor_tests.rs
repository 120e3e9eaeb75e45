use std::sync::Arc;
use std::time::Duration;
use volseg::cluster::{statistic_map, LogEuclidean, Memoized, ScalarField, TensorField};
use volseg::{Dbscan, DbscanConfig, DiffusionTensor, Error, Mask, Point, Shape, TensorStatistic, Volume};

fn config(min_pts: usize) -> DbscanConfig {
    DbscanConfig::new(1, min_pts)
        .with_workers(2)
        .with_poll_interval(Duration::from_millis(5))
}

/// Isotropic tensors for z < 2, strongly oriented along x for z >= 2.
fn two_tissue_volume(shape: Shape) -> Arc<Volume<DiffusionTensor>> {
    Arc::new(Volume::from_fn(shape, |p| {
        if p.z < 2 {
            DiffusionTensor::diagonal(1.0, 1.0, 1.0)
        } else {
            DiffusionTensor::diagonal(3.0, 0.2, 0.2)
        }
    }))
}

#[test]
fn test_fa_threshold_separates_tissues() {
    let shape = Shape::new(3, 3, 4);
    let tensors = two_tissue_volume(shape);
    let pred = TensorField::new(tensors, TensorStatistic::FractionalAnisotropy)
        .threshold(0.05)
        .unwrap();
    pred.field().warm(&Mask::filled(shape, true)).unwrap();
    assert_eq!(pred.field().cached(), shape.len());

    let dbscan = Dbscan::new(config(4), shape, Mask::filled(shape, true), pred).unwrap();
    let out = dbscan.fit().unwrap();
    assert_eq!(out.clusters.len(), 2);
    assert!(out.clusters[0].points.iter().all(|p| p.z < 2));
    assert!(out.clusters[1].points.iter().all(|p| p.z >= 2));
    let sequential = dbscan.fit_sequential().unwrap();
    assert_eq!(out.clusters, sequential.clusters);
    assert_eq!(out.labels, sequential.labels);
}

#[test]
fn test_log_euclidean_separates_tissues() {
    let shape = Shape::new(2, 2, 4);
    let pred = LogEuclidean::new(two_tissue_volume(shape), 0.5).unwrap();
    let out = Dbscan::new(config(2), shape, Mask::filled(shape, true), pred)
        .unwrap()
        .fit()
        .unwrap();
    assert_eq!(out.clusters.len(), 2);
    assert_eq!(out.clusters[0].len(), 8);
    assert_eq!(out.clusters[1].len(), 8);
}

#[test]
fn test_singular_tensor_aborts_run() {
    let shape = Shape::new(2, 2, 2);
    let mut tensors = Volume::filled(shape, DiffusionTensor::diagonal(1.0, 1.0, 1.0));
    tensors[Point::new(1, 1, 1)] = DiffusionTensor::default();
    let pred = LogEuclidean::new(Arc::new(tensors), 0.5).unwrap();
    let err = Dbscan::new(config(2), shape, Mask::filled(shape, true), pred)
        .unwrap()
        .fit()
        .unwrap_err();
    assert!(matches!(err, Error::PredicateFailure { .. }));
}

#[test]
fn test_statistic_map_agrees_with_field() {
    let shape = Shape::new(3, 2, 4);
    let tensors = two_tissue_volume(shape);
    let field = Memoized::new(TensorField::new(tensors.clone(), TensorStatistic::RadialDiffusivity));
    let map = statistic_map(&tensors, TensorStatistic::RadialDiffusivity);
    for p in shape.points() {
        assert!((map[p] - field.value(p).unwrap()).abs() < 1e-12);
    }
}
