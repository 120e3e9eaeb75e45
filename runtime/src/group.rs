use core_affinity::CoreId;
use parking_lot::Mutex;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Thread name prefix; workers are named `{name}-{id}`.
    pub name: String,
    pub workers: usize,
    /// Pin worker `i` to core `i % cores`.
    pub pin_cores: bool,
}

impl GroupConfig {
    pub fn new(name: &str, workers: usize) -> Self {
        Self {
            name: name.to_string(),
            workers,
            pin_cores: false,
        }
    }

    pub fn pinned(mut self, pin: bool) -> Self {
        self.pin_cores = pin;
        self
    }
}

#[derive(Debug)]
struct GroupShared {
    shutdown: AtomicBool,
    idle: Vec<AtomicBool>,
    failure: Mutex<Option<crate::Error>>,
}

/// Handle given to every worker body.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    id: usize,
    shared: Arc<GroupShared>,
}

impl WorkerContext {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    pub fn set_idle(&self, idle: bool) {
        self.shared.idle[self.id].store(idle, Ordering::Release);
    }
}

/// Fixed set of long-running worker threads.
///
/// Unlike a task pool, each worker runs one body for the lifetime of the
/// group and owns whatever state that body creates. The group tracks
/// per-worker idle flags, a cooperative shutdown flag and the first failure
/// reported by any worker.
pub struct WorkerGroup {
    name: String,
    shared: Arc<GroupShared>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn spawn<F>(config: GroupConfig, body: F) -> crate::Result<Self>
    where
        F: Fn(WorkerContext) -> volseg_core::Result<()> + Send + Sync + 'static,
    {
        if config.workers == 0 {
            return Err(volseg_core::Error::invalid_parameter("worker group needs at least one worker").into());
        }

        let shared = Arc::new(GroupShared {
            shutdown: AtomicBool::new(false),
            idle: (0..config.workers).map(|_| AtomicBool::new(true)).collect(),
            failure: Mutex::new(None),
        });
        let body = Arc::new(body);
        let cores = if config.pin_cores {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut group = Self {
            name: config.name.clone(),
            shared: shared.clone(),
            handles: Vec::with_capacity(config.workers),
        };

        for id in 0..config.workers {
            let ctx = WorkerContext {
                id,
                shared: shared.clone(),
            };
            let body = body.clone();
            let core = cores.get(id % cores.len().max(1)).copied();
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.name, id))
                .spawn(move || run_worker(ctx, core, body.as_ref()));
            match spawned {
                Ok(handle) => group.handles.push(handle),
                Err(e) => {
                    // Dropping the partially built group stops the threads already started.
                    return Err(crate::Error::SpawnError(format!(
                        "{}-{}: {}",
                        config.name, id, e
                    )));
                }
            }
        }

        tracing::debug!(group = %group.name, workers = config.workers, "worker group started");
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn worker_count(&self) -> usize {
        self.shared.idle.len()
    }

    pub fn all_idle(&self) -> bool {
        self.shared.idle.iter().all(|f| f.load(Ordering::Acquire))
    }

    pub fn idle_count(&self) -> usize {
        self.shared
            .idle
            .iter()
            .filter(|f| f.load(Ordering::Acquire))
            .count()
    }

    /// Report the first worker failure, or a worker that exited while the
    /// group was still supposed to be running.
    pub fn check_health(&self) -> crate::Result<()> {
        if let Some(err) = self.shared.failure.lock().clone() {
            return Err(err);
        }
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Ok(());
        }
        for (id, handle) in self.handles.iter().enumerate() {
            if handle.is_finished() {
                // The body may have recorded its failure between the two checks.
                if let Some(err) = self.shared.failure.lock().clone() {
                    return Err(err);
                }
                return Err(crate::Error::WorkerFailed {
                    id,
                    message: "exited while the group was running".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Signal every worker to stop and join them.
    /// Returns the first failure any worker reported.
    pub fn shutdown(mut self) -> crate::Result<()> {
        self.stop_and_join();
        match self.shared.failure.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn stop_and_join(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for (id, handle) in self.handles.drain(..).enumerate() {
            if handle.join().is_err() {
                record_failure(
                    &self.shared,
                    crate::Error::WorkerFailed {
                        id,
                        message: "panicked".to_string(),
                    },
                );
            }
        }
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop_and_join();
        }
    }
}

impl std::fmt::Debug for WorkerGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerGroup")
            .field("name", &self.name)
            .field("workers", &self.worker_count())
            .field("idle", &self.idle_count())
            .finish()
    }
}

fn run_worker<F>(ctx: WorkerContext, core: Option<CoreId>, body: &F)
where
    F: Fn(WorkerContext) -> volseg_core::Result<()>,
{
    if let Some(core) = core {
        if !core_affinity::set_for_current(core) {
            tracing::debug!(worker = ctx.id, core = core.id, "could not pin worker");
        }
    }

    let id = ctx.id;
    let shared = ctx.shared.clone();
    match panic::catch_unwind(AssertUnwindSafe(|| body(ctx))) {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::warn!(worker = id, error = %err, "worker failed");
            record_failure(&shared, crate::Error::Core(err));
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::warn!(worker = id, %message, "worker panicked");
            record_failure(
                &shared,
                crate::Error::WorkerFailed {
                    id,
                    message: format!("panicked: {}", message),
                },
            );
        }
    }
    shared.idle[id].store(true, Ordering::Release);
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn record_failure(shared: &GroupShared, err: crate::Error) {
    let mut slot = shared.failure.lock();
    if slot.is_none() {
        *slot = Some(err);
    }
}
