//! Single-threaded reference clustering.
//!
//! Produces exactly the same clusters and labels as [`Dbscan::fit`] for any
//! worker count: a round claims every voxel reachable from its seed through
//! core voxels that were still unvisited when the round started, and that
//! set does not depend on the order of expansion.
//!
//! [`Dbscan::fit`]: crate::Dbscan::fit

use crate::grid::{GridParams, GridState};
use crate::output::{Cluster, ClusteringDiagnostics, ClusteringOutput};
use volseg_core::{Label, Point, Result};

pub fn fit_sequential(params: &std::sync::Arc<GridParams>) -> Result<ClusteringOutput> {
    let mut state = GridState::new(params.clone());
    let mut clusters = Vec::new();
    let mut diagnostics = ClusteringDiagnostics {
        workers: 1,
        ..Default::default()
    };

    for p in params.shape().points() {
        if state.label(p).is_visited() {
            continue;
        }
        let Some(neighborhood) = params.core_neighborhood(p)? else {
            state.set_label(p, Label::Noise);
            continue;
        };

        diagnostics.rounds += 1;
        state.set_label(p, Label::Member);
        let mut cluster = Cluster::new(p);
        let mut seeds: Vec<Point> = neighborhood;
        let mut head = 0;
        while head < seeds.len() {
            let current = seeds[head];
            head += 1;
            if state.label(current).is_visited() {
                continue;
            }
            state.set_label(current, Label::Member);
            cluster.points.insert(current);
            if let Some(more) = params.core_neighborhood(current)? {
                seeds.extend(more.into_iter().filter(|n| !state.label(*n).is_visited()));
            }
        }

        if cluster.len() >= params.min_pts() {
            clusters.push(cluster);
        } else {
            for &q in &cluster.points {
                state.set_label(q, Label::Noise);
            }
            diagnostics.discarded.push(cluster);
        }
    }

    let labels = state.into_labels();
    diagnostics.noise = labels.as_slice().iter().filter(|l| **l == Label::Noise).count();
    Ok(ClusteringOutput {
        clusters,
        labels,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{from_fn, Spatial};
    use std::sync::Arc;
    use volseg_core::{Mask, Shape};

    fn run(shape: Shape, eps: usize, min_pts: usize, mask: Mask) -> ClusteringOutput {
        let params = Arc::new(GridParams::new(shape, eps, min_pts, mask, Arc::new(Spatial)).unwrap());
        fit_sequential(&params).unwrap()
    }

    #[test]
    fn test_two_separated_blobs() {
        let shape = Shape::new(1, 1, 7);
        let pts = [0, 1, 2, 4, 5, 6].map(|z| Point::new(0, 0, z));
        let out = run(shape, 1, 2, Mask::from_points(shape, pts).unwrap());
        assert_eq!(out.clusters.len(), 2);
        assert_eq!(out.clusters[0].seed, Point::new(0, 0, 0));
        assert_eq!(out.clusters[1].seed, Point::new(0, 0, 4));
        assert_eq!(out.labels[Point::new(0, 0, 3)], Label::Noise);
        assert!(out.is_complete());
        assert_eq!(out.diagnostics.noise, 1);
    }

    #[test]
    fn test_small_region_is_discarded() {
        let shape = Shape::new(3, 3, 3);
        let pts = [0, 1, 2].map(|z| Point::new(0, 0, z));
        let out = run(shape, 1, 3, Mask::from_points(shape, pts).unwrap());
        assert!(out.clusters.is_empty());
        assert_eq!(out.diagnostics.discarded.len(), 1);
        assert_eq!(out.diagnostics.discarded[0].seed, Point::new(0, 0, 1));
        assert_eq!(out.diagnostics.noise, shape.len());
    }

    #[test]
    fn test_border_voxel_joins_first_cluster_only() {
        // z=3 sees only itself, so it is a border voxel of both neighboring cores.
        let shape = Shape::new(1, 1, 7);
        let pred = from_fn(|c: Point, p: Point| c.z != 3 || p == c);
        let params = Arc::new(
            GridParams::new(shape, 1, 3, Mask::filled(shape, true), Arc::new(pred)).unwrap(),
        );
        let out = fit_sequential(&params).unwrap();
        assert_eq!(out.clusters.len(), 2);
        let z = |c: &Cluster| c.points.iter().map(|p| p.z).collect::<Vec<_>>();
        assert_eq!(z(&out.clusters[0]), vec![1, 2, 3]);
        assert_eq!(z(&out.clusters[1]), vec![4, 5, 6]);
        assert_eq!(out.labels[Point::new(0, 0, 0)], Label::Noise);
    }
}
