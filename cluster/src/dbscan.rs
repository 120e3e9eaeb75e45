use crate::arbiter::ClaimArbiter;
use crate::config::DbscanConfig;
use crate::grid::{GridParams, GridState, Neighborhood};
use crate::output::{Cluster, ClusteringDiagnostics, ClusteringOutput};
use crate::pool::{ExpansionTask, LabelUpdate, WorkerPool};
use crate::predicate::NeighborhoodPredicate;
use crate::sequential::fit_sequential;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use volseg_core::{resolve_worker_count, Error, Label, Mask, Point, Result, Shape};
use volseg_runtime::{Collected, Collector, Origin};

/// Parallel DBSCAN over a voxel grid.
///
/// Parameters are validated once, in [`Dbscan::new`]; no worker is started
/// before [`fit`](Self::fit).
#[derive(Debug, Clone)]
pub struct Dbscan {
    params: Arc<GridParams>,
    config: DbscanConfig,
}

impl Dbscan {
    /// Validate `config`, `mask` and `predicate` against `shape`.
    pub fn new<P>(config: DbscanConfig, shape: Shape, mask: Mask, predicate: P) -> Result<Self>
    where
        P: NeighborhoodPredicate + 'static,
    {
        Self::from_shared(config, shape, mask, Arc::new(predicate))
    }

    /// Like [`new`](Self::new), for a predicate already behind an `Arc`,
    /// e.g. one shared with other runs or kept for inspecting its cache.
    pub fn from_shared(
        config: DbscanConfig,
        shape: Shape,
        mask: Mask,
        predicate: Arc<dyn NeighborhoodPredicate>,
    ) -> Result<Self> {
        config.validate()?;
        let params = GridParams::new(shape, config.eps, config.min_pts, mask, predicate)?;
        Ok(Self {
            params: Arc::new(params),
            config,
        })
    }

    /// The validated run parameters, shared read-only with every worker.
    pub fn params(&self) -> &Arc<GridParams> {
        &self.params
    }

    /// Pool and timing settings.
    pub fn config(&self) -> &DbscanConfig {
        &self.config
    }

    /// Single-threaded run with the same result as [`fit`](Self::fit).
    pub fn fit_sequential(&self) -> Result<ClusteringOutput> {
        fit_sequential(&self.params)
    }

    /// Run the clustering on a fresh worker pool.
    ///
    /// Any predicate failure or worker failure aborts the run; no partial
    /// result is returned.
    pub fn fit(&self) -> Result<ClusteringOutput> {
        let workers = resolve_worker_count(self.config.worker_count)?;
        let shape = self.params.shape();
        tracing::info!(
            shape = %shape,
            eps = self.params.eps(),
            min_pts = self.params.min_pts(),
            workers,
            predicate = self.params.predicate().name(),
            "dbscan started"
        );
        let start = Instant::now();

        let arbiter = Arc::new(ClaimArbiter::new(shape));
        let pool = WorkerPool::start(self.params.clone(), arbiter.clone(), &self.config, workers)?;
        let result = Orchestrator::new(&self.params, &self.config, &pool, arbiter).run();

        match result {
            Ok(output) => {
                pool.shutdown()?;
                tracing::info!(
                    clusters = output.clusters.len(),
                    discarded = output.diagnostics.discarded.len(),
                    noise = output.diagnostics.noise,
                    rounds = output.diagnostics.rounds,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "dbscan finished"
                );
                Ok(output)
            }
            Err(err) => {
                tracing::warn!(error = %err, "dbscan aborted");
                drop(pool);
                Err(err)
            }
        }
    }
}

/// Blocking waits in `poll_interval` slices with health and stall checks
/// between slices.
struct Watchdog<'a> {
    pool: &'a WorkerPool,
    poll: Duration,
    stall_timeout: Option<Duration>,
}

impl Watchdog<'_> {
    fn wait(&self, stage: &str, mut ready: impl FnMut(Duration) -> bool) -> Result<()> {
        let mut last = self.pool.progress();
        let mut since = Instant::now();
        while !ready(self.poll) {
            self.pool.check_health()?;
            let progress = self.pool.progress();
            if progress != last {
                last = progress;
                since = Instant::now();
                continue;
            }
            if let Some(limit) = self.stall_timeout {
                if since.elapsed() >= limit {
                    tracing::warn!(stage, ?limit, "no progress from workers");
                    return Err(Error::worker_failure(format!(
                        "no progress for {:?} while waiting for {}",
                        limit, stage
                    )));
                }
            }
        }
        Ok(())
    }

    fn barrier(&self) -> Result<()> {
        let bus = self.pool.bus();
        self.wait("replica sync", |t| bus.wait_results_update(t))
    }
}

/// Drives the scan over the authoritative replica.
struct Orchestrator<'a> {
    params: &'a Arc<GridParams>,
    pool: &'a WorkerPool,
    arbiter: Arc<ClaimArbiter>,
    watchdog: Watchdog<'a>,
    state: GridState,
    clusters: Vec<Cluster>,
    diagnostics: ClusteringDiagnostics,
}

impl<'a> Orchestrator<'a> {
    fn new(
        params: &'a Arc<GridParams>,
        config: &DbscanConfig,
        pool: &'a WorkerPool,
        arbiter: Arc<ClaimArbiter>,
    ) -> Self {
        Self {
            params,
            pool,
            arbiter,
            watchdog: Watchdog {
                pool,
                poll: config.poll_interval,
                stall_timeout: config.stall_timeout,
            },
            state: GridState::new(params.clone()),
            clusters: Vec::new(),
            diagnostics: ClusteringDiagnostics {
                workers: pool.worker_count(),
                ..Default::default()
            },
        }
    }

    fn run(mut self) -> Result<ClusteringOutput> {
        for p in self.params.shape().points() {
            if self.state.label(p).is_visited() {
                continue;
            }
            match self.params.core_neighborhood(p)? {
                Some(neighborhood) => self.expand_cluster(p, neighborhood)?,
                None => self.publish(p, Label::Noise)?,
            }
        }
        // Workers must agree with the returned grid before they are released.
        self.watchdog.barrier()?;

        let labels = self.state.into_labels();
        self.diagnostics.noise = labels
            .as_slice()
            .iter()
            .filter(|l| **l == Label::Noise)
            .count();
        Ok(ClusteringOutput {
            clusters: self.clusters,
            labels,
            diagnostics: self.diagnostics,
        })
    }

    /// Record a coordinator decision in the local replica and the arbiter,
    /// then broadcast it to every worker.
    fn publish(&mut self, p: Point, label: Label) -> Result<()> {
        self.state.set_label(p, label);
        self.arbiter.store(p, label);
        self.pool
            .bus()
            .broadcast(Origin::Coordinator, LabelUpdate::new(p, label))?;
        Ok(())
    }

    fn expand_cluster(&mut self, seed: Point, neighborhood: Neighborhood) -> Result<()> {
        self.diagnostics.rounds += 1;
        tracing::trace!(seed = %seed, size = neighborhood.len(), "expanding seed");

        self.publish(seed, Label::Member)?;
        self.watchdog.barrier()?;

        let mut cluster = Cluster::new(seed);
        let pool = self.pool;
        let collector = pool.bus().collector();
        let frontier = pool.frontier();
        let bus = pool.bus();
        let watchdog = &self.watchdog;
        let poll = watchdog.poll;
        let state = &mut self.state;
        let points = &mut cluster.points;
        let abort = AtomicBool::new(false);

        thread::scope(|s| -> Result<()> {
            let handle = thread::Builder::new()
                .name("volseg-collector".to_string())
                .spawn_scoped(s, || collect_round(&collector, state, points, poll, &abort))
                .map_err(|e| Error::worker_failure(format!("collector thread: {}", e)))?;

            let waited = frontier
                .push(ExpansionTask {
                    point: seed,
                    neighborhood,
                })
                .map_err(Error::from)
                .and_then(|_| watchdog.wait("frontier", |t| frontier.wait_drained(t)))
                .and_then(|_| watchdog.barrier())
                .and_then(|_| watchdog.wait("collector", |t| bus.wait_collected(t)));

            if bus.poison_collector().is_err() {
                abort.store(true, Ordering::Release);
            }
            if handle.join().is_err() {
                return Err(Error::worker_failure("collector thread panicked"));
            }
            waited
        })?;

        self.finalize(cluster)
    }

    fn finalize(&mut self, cluster: Cluster) -> Result<()> {
        if cluster.len() >= self.params.min_pts() {
            tracing::debug!(seed = %cluster.seed, size = cluster.len(), "cluster retained");
            self.clusters.push(cluster);
            return Ok(());
        }

        for &p in &cluster.points {
            self.publish(p, Label::Noise)?;
        }
        self.watchdog.barrier()?;
        tracing::debug!(seed = %cluster.seed, size = cluster.len(), "cluster discarded");
        self.diagnostics.discarded.push(cluster);
        Ok(())
    }
}

/// Collector loop for one round: apply every claim to the orchestrator
/// replica and the round's cluster until the poison pill arrives.
fn collect_round(
    collector: &Collector<Point>,
    state: &mut GridState,
    points: &mut BTreeSet<Point>,
    poll: Duration,
    abort: &AtomicBool,
) {
    while !abort.load(Ordering::Acquire) {
        match collector.recv_timeout(poll) {
            Some(Collected::Item(p)) => {
                state.set_label(p, Label::Member);
                points.insert(p);
                collector.ack();
            }
            Some(Collected::Poison) => {
                collector.ack();
                break;
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{from_fn, FnPredicate, Spatial};

    fn config(eps: usize, min_pts: usize) -> DbscanConfig {
        DbscanConfig::new(eps, min_pts)
            .with_workers(3)
            .with_poll_interval(Duration::from_millis(5))
            .with_stall_timeout(Some(Duration::from_secs(30)))
    }

    #[test]
    fn test_fit_single_cluster() {
        let shape = Shape::new(3, 3, 3);
        let dbscan = Dbscan::new(config(1, 4), shape, Mask::filled(shape, true), Spatial).unwrap();
        let out = dbscan.fit().unwrap();
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].seed, Point::new(0, 0, 0));
        assert_eq!(out.clusters[0].len(), shape.len());
        assert_eq!(out.diagnostics.rounds, 1);
        assert_eq!(out.diagnostics.workers, 3);
        assert!(out.is_complete());
    }

    #[test]
    fn test_fit_matches_sequential() {
        let shape = Shape::new(4, 4, 4);
        let mask = Mask::from_fn(shape, |p| (p.x + p.y + p.z) % 3 != 0);
        let dbscan = Dbscan::new(config(1, 5), shape, mask, Spatial).unwrap();
        let parallel = dbscan.fit().unwrap();
        let sequential = dbscan.fit_sequential().unwrap();
        assert_eq!(parallel.clusters, sequential.clusters);
        assert_eq!(parallel.labels, sequential.labels);
        assert_eq!(parallel.diagnostics.discarded, sequential.diagnostics.discarded);
    }

    #[test]
    fn test_invalid_parameters_fail_before_fit() {
        let shape = Shape::new(2, 2, 2);
        let err = Dbscan::new(config(1, 0), shape, Mask::filled(shape, true), Spatial).unwrap_err();
        assert!(err.is_validation());
        let err = Dbscan::new(
            config(1, 1),
            shape,
            Mask::filled(Shape::new(2, 2, 1), true),
            Spatial,
        )
        .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_predicate_failure_aborts_run() {
        let shape = Shape::new(3, 3, 3);
        let bad = Point::new(2, 2, 2);
        let pred = FnPredicate::new(move |_c: Point, p: Point| {
            if p == bad {
                Err(Error::predicate_failure(p, "no data"))
            } else {
                Ok(true)
            }
        });
        let dbscan = Dbscan::new(config(1, 2), shape, Mask::filled(shape, true), pred).unwrap();
        let err = dbscan.fit().unwrap_err();
        assert!(matches!(err, Error::PredicateFailure { point, .. } if point == bad));
    }

    #[test]
    fn test_irreflexive_voxel_is_never_a_seed() {
        let shape = Shape::new(1, 1, 3);
        let lonely = Point::new(0, 0, 0);
        let pred = from_fn(move |c: Point, p: Point| !(c == lonely && p == lonely));
        let dbscan = Dbscan::new(config(1, 1), shape, Mask::filled(shape, true), pred).unwrap();
        let out = dbscan.fit().unwrap();
        assert!(out.clusters.iter().all(|c| c.seed != lonely));
        assert_eq!(out.clusters[0].seed, Point::new(0, 0, 1));
    }
}
