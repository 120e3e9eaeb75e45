use std::time::Duration;
use volseg_core::{Error, Result};

/// Tuning knobs of a parallel run.
#[derive(Debug, Clone, PartialEq)]
pub struct DbscanConfig {
    /// Chebyshev radius of the neighborhood box.
    pub eps: usize,
    /// Minimum neighborhood size of a core voxel, and minimum cluster size.
    pub min_pts: usize,
    /// Expansion workers; `None` resolves from `VOLSEG_WORKERS` or the
    /// global CPU pool size.
    pub worker_count: Option<usize>,
    /// Slice length of every blocking wait; health and stall checks run
    /// between slices.
    pub poll_interval: Duration,
    /// Abort with a worker failure when neither the frontier nor the bus makes
    /// progress for this long. `None` waits forever.
    pub stall_timeout: Option<Duration>,
    pub pin_workers: bool,
}

impl Default for DbscanConfig {
    fn default() -> Self {
        Self {
            eps: 1,
            min_pts: 1,
            worker_count: None,
            poll_interval: Duration::from_millis(100),
            stall_timeout: Some(Duration::from_secs(300)),
            pin_workers: false,
        }
    }
}

impl DbscanConfig {
    pub fn new(eps: usize, min_pts: usize) -> Self {
        Self {
            eps,
            min_pts,
            ..Default::default()
        }
    }

    /// 26-connected neighborhood.
    pub fn adjacent(min_pts: usize) -> Self {
        Self::new(1, min_pts)
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn pinned(mut self, pin: bool) -> Self {
        self.pin_workers = pin;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_pts < 1 {
            return Err(Error::invalid_parameter("min_pts must be >= 1"));
        }
        if self.worker_count == Some(0) {
            return Err(Error::invalid_parameter("worker_count must be >= 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::invalid_parameter("poll_interval must be positive"));
        }
        if self.stall_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_parameter("stall_timeout must be positive"));
        }
        Ok(())
    }
}
