pub use volseg_cluster as cluster;
pub use volseg_core as core;
pub use volseg_runtime as runtime;

pub use volseg_cluster::{
    Cluster, ClusteringDiagnostics, ClusteringOutput, Dbscan, DbscanConfig, DiffusionTensor,
    NeighborhoodPredicate, Spatial, TensorStatistic,
};
pub use volseg_core::{Error, Label, Mask, Point, Result, Shape, Volume};

/// Initialize a single global Rayon thread pool for data-parallel routines
/// (statistic maps, memo warming).
///
/// Call this once at application startup. Repeated calls are idempotent and
/// return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `VOLSEG_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> Result<()> {
    volseg_core::init_global_thread_pool(num_threads)
}
