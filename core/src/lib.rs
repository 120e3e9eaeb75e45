pub mod grid;
pub mod label;
pub mod runtime;
pub mod volume;

pub use grid::*;
pub use label::*;
pub use runtime::*;
pub use volume::*;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Predicate failed at {point}: {message}")]
    PredicateFailure { point: Point, message: String },

    #[error("Worker failure: {0}")]
    WorkerFailure(String),
}

impl Error {
    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    pub fn predicate_failure(point: Point, msg: impl Into<String>) -> Self {
        Self::PredicateFailure {
            point,
            message: msg.into(),
        }
    }

    pub fn worker_failure(msg: impl Into<String>) -> Self {
        Self::WorkerFailure(msg.into())
    }

    /// Whether the error was raised before any worker could have started.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidParameter(_))
    }
}
