//! Message-passing runtime for replicated-state worker pools.
//!
//! Workers never share mutable state directly. They exchange work through a
//! [`Frontier`], reconcile private replicas through a [`ResultBus`], and the
//! coordinator detects quiescence through [`PendingCounter`] generation
//! barriers instead of polling flags.

pub mod bus;
pub mod frontier;
pub mod group;
pub mod signal;

pub use bus::{Collected, Collector, Mailbox, Origin, ResultBus};
pub use frontier::Frontier;
pub use group::{GroupConfig, WorkerContext, WorkerGroup};
pub use signal::PendingCounter;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("Core error: {0}")]
    Core(#[from] volseg_core::Error),

    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    #[error("Spawn error: {0}")]
    SpawnError(String),

    #[error("Worker {id} failed: {message}")]
    WorkerFailed { id: usize, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for volseg_core::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Core(inner) => inner,
            other => volseg_core::Error::WorkerFailure(other.to_string()),
        }
    }
}
