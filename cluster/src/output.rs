use std::collections::BTreeSet;
use volseg_core::{Label, Point, Volume};

/// A set of voxels grown from one core seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub seed: Point,
    pub points: BTreeSet<Point>,
}

impl Cluster {
    pub fn new(seed: Point) -> Self {
        let mut points = BTreeSet::new();
        points.insert(seed);
        Self { seed, points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn contains(&self, p: &Point) -> bool {
        self.points.contains(p)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusteringDiagnostics {
    /// Expansion rounds started, one per core seed found by the scan.
    pub rounds: usize,
    /// Regions grown from a seed but smaller than `min_pts`; their voxels are
    /// labeled noise.
    pub discarded: Vec<Cluster>,
    pub noise: usize,
    pub workers: usize,
}

/// Result of a clustering run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringOutput {
    /// Retained clusters in order of their seed in scan order.
    pub clusters: Vec<Cluster>,
    pub labels: Volume<Label>,
    pub diagnostics: ClusteringDiagnostics,
}

impl ClusteringOutput {
    /// Labels as integer codes: -1 noise, 1 member.
    pub fn label_codes(&self) -> Volume<i8> {
        self.labels.map(|l| l.code())
    }

    /// Per-voxel cluster index, `None` for noise.
    pub fn partition(&self) -> Volume<Option<usize>> {
        let mut index = Volume::filled(self.labels.shape(), None);
        for (i, cluster) in self.clusters.iter().enumerate() {
            for &p in &cluster.points {
                index[p] = Some(i);
            }
        }
        index
    }

    pub fn cluster_of(&self, p: Point) -> Option<usize> {
        self.clusters.iter().position(|c| c.contains(&p))
    }

    /// Every voxel was classified.
    pub fn is_complete(&self) -> bool {
        self.labels.as_slice().iter().all(|l| l.is_visited())
    }

    pub fn member_count(&self) -> usize {
        self.clusters.iter().map(Cluster::len).sum()
    }
}
