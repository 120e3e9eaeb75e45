//! Generalized DBSCAN over 3D voxel grids.
//!
//! Clusters are grown from core voxels by a pool of expansion workers. Each
//! worker owns a private replica of the label grid; replicas converge through
//! broadcast label updates and explicit barriers between expansion rounds,
//! while a compare-and-set [`ClaimArbiter`] decides which worker claims a
//! contested voxel.
//!
//! # Module Organization
//!
//! - `grid`: immutable run parameters and per-replica label state
//! - `predicate`: the pluggable neighborhood similarity test and its variants
//! - `tensor`: diffusion-tensor statistics used by similarity predicates
//! - `pool`: expansion workers
//! - `dbscan`: the orchestrator
//! - `sequential`: single-threaded reference with identical semantics
//!
//! # Usage
//!
//! ```
//! use volseg_cluster::{Dbscan, DbscanConfig, Spatial};
//! use volseg_core::{Mask, Shape};
//!
//! let shape = Shape::new(4, 4, 4);
//! let mask = Mask::filled(shape, true);
//! let dbscan = Dbscan::new(DbscanConfig::new(1, 2).with_workers(2), shape, mask, Spatial)?;
//! let output = dbscan.fit()?;
//! assert_eq!(output.clusters.len(), 1);
//! # Ok::<(), volseg_core::Error>(())
//! ```

pub mod arbiter;
pub mod config;
pub mod dbscan;
pub mod grid;
pub mod output;
pub mod pool;
pub mod predicate;
pub mod sequential;
pub mod tensor;

pub use arbiter::ClaimArbiter;
pub use config::DbscanConfig;
pub use dbscan::Dbscan;
pub use grid::{GridParams, GridState, Neighborhood};
pub use output::{Cluster, ClusteringDiagnostics, ClusteringOutput};
pub use pool::{ExpansionTask, LabelUpdate, WorkerPool};
pub use predicate::{
    from_fn, Composite, FnPredicate, Memoized, NeighborhoodPredicate, ScalarField,
    ScalarThreshold, Spatial,
};
pub use sequential::fit_sequential;
pub use tensor::{statistic_map, DiffusionTensor, LogEuclidean, TensorField, TensorStatistic};
