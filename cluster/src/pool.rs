//! Expansion workers.
//!
//! Each worker runs two threads over one private [`GridState`] replica: the
//! expansion loop consuming the shared [`Frontier`], and a sync loop applying
//! label updates broadcast by everyone else.

use crate::arbiter::ClaimArbiter;
use crate::config::DbscanConfig;
use crate::grid::{GridParams, GridState, Neighborhood};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use volseg_core::{Error, Label, Point, Result};
use volseg_runtime::{Frontier, GroupConfig, Mailbox, Origin, ResultBus, WorkerContext, WorkerGroup};

/// A replica change published on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelUpdate {
    pub point: Point,
    pub label: Label,
}

impl LabelUpdate {
    pub fn new(point: Point, label: Label) -> Self {
        Self { point, label }
    }
}

/// A core voxel whose neighborhood still has to be expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpansionTask {
    pub point: Point,
    pub neighborhood: Neighborhood,
}

/// Running expansion workers plus the channels connecting them to the
/// orchestrator.
#[derive(Debug)]
pub struct WorkerPool {
    group: WorkerGroup,
    frontier: Frontier<ExpansionTask>,
    bus: ResultBus<LabelUpdate, Point>,
}

impl WorkerPool {
    pub fn start(
        params: Arc<GridParams>,
        arbiter: Arc<ClaimArbiter>,
        config: &DbscanConfig,
        workers: usize,
    ) -> Result<Self> {
        let frontier = Frontier::new();
        let bus = ResultBus::new(workers);
        let shared = Shared {
            params,
            arbiter,
            frontier: frontier.clone(),
            bus: bus.clone(),
            poll: config.poll_interval,
        };

        let group_config = GroupConfig::new("volseg-worker", workers).pinned(config.pin_workers);
        let group = WorkerGroup::spawn(group_config, move |ctx| shared.run(ctx))?;
        Ok(Self {
            group,
            frontier,
            bus,
        })
    }

    pub fn frontier(&self) -> &Frontier<ExpansionTask> {
        &self.frontier
    }

    pub fn bus(&self) -> &ResultBus<LabelUpdate, Point> {
        &self.bus
    }

    pub fn worker_count(&self) -> usize {
        self.group.worker_count()
    }

    pub fn all_idle(&self) -> bool {
        self.group.all_idle()
    }

    /// No task is queued or being expanded.
    pub fn nothing_to_expand(&self) -> bool {
        self.frontier.in_flight() == 0
    }

    /// Monotonic counter advancing whenever a task or bus message completes.
    pub fn progress(&self) -> u64 {
        self.frontier.progress() + self.bus.progress()
    }

    pub fn check_health(&self) -> Result<()> {
        Ok(self.group.check_health()?)
    }

    pub fn shutdown(self) -> Result<()> {
        Ok(self.group.shutdown()?)
    }
}

struct StopOnDrop<'a>(&'a AtomicBool);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Everything a worker body needs; cloned into every worker thread.
struct Shared {
    params: Arc<GridParams>,
    arbiter: Arc<ClaimArbiter>,
    frontier: Frontier<ExpansionTask>,
    bus: ResultBus<LabelUpdate, Point>,
    poll: Duration,
}

impl Shared {
    fn run(&self, ctx: WorkerContext) -> Result<()> {
        let id = ctx.id();
        let mailbox = self.bus.mailbox(id)?;
        let replica = Mutex::new(GridState::new(self.params.clone()));
        let stop = AtomicBool::new(false);

        thread::scope(|s| {
            // Releases the sync thread even when the expansion loop unwinds,
            // so the worker thread can finish and be seen by the health check.
            let _stop_sync = StopOnDrop(&stop);
            let sync = thread::Builder::new()
                .name(format!("volseg-sync-{}", id))
                .spawn_scoped(s, || self.sync_loop(&ctx, &mailbox, &replica, &stop))
                .map_err(|e| Error::worker_failure(format!("sync thread {}: {}", id, e)))?;

            let result = self.expansion_loop(&ctx, &replica);
            stop.store(true, Ordering::Release);
            if sync.join().is_err() {
                return Err(Error::worker_failure(format!("sync thread {} panicked", id)));
            }
            result
        })
    }

    fn sync_loop(
        &self,
        ctx: &WorkerContext,
        mailbox: &Mailbox<LabelUpdate>,
        replica: &Mutex<GridState>,
        stop: &AtomicBool,
    ) {
        while !ctx.is_shutdown() && !stop.load(Ordering::Acquire) {
            if let Some(update) = mailbox.recv_timeout(self.poll) {
                replica.lock().set_label(update.point, update.label);
                mailbox.ack();
            }
        }
    }

    fn expansion_loop(&self, ctx: &WorkerContext, replica: &Mutex<GridState>) -> Result<()> {
        while !ctx.is_shutdown() {
            let Some(task) = self.frontier.pop_timeout(self.poll) else {
                ctx.set_idle(true);
                continue;
            };
            ctx.set_idle(false);
            // A failed task is never marked done; the orchestrator sees the
            // failure through the group's health check instead.
            self.expand(ctx.id(), &task, replica)?;
            self.frontier.task_done();
            if self.frontier.is_empty() {
                ctx.set_idle(true);
            }
        }
        Ok(())
    }

    fn expand(&self, id: usize, task: &ExpansionTask, replica: &Mutex<GridState>) -> Result<()> {
        tracing::trace!(worker = id, point = %task.point, size = task.neighborhood.len(), "expanding");
        for &p in &task.neighborhood {
            if replica.lock().label(p).is_visited() {
                continue;
            }
            if self.arbiter.try_claim(p).is_err() {
                continue;
            }
            replica.lock().set_label(p, Label::Member);
            self.bus
                .broadcast(Origin::Worker(id), LabelUpdate::new(p, Label::Member))?;
            self.bus.collect(p)?;

            if let Some(neighborhood) = self.params.core_neighborhood(p)? {
                self.frontier.push(ExpansionTask {
                    point: p,
                    neighborhood,
                })?;
            }
        }
        Ok(())
    }
}
