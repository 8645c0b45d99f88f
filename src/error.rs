//! Error types for the pool and dispatchers.

use std::io;

/// Error type returned by work units and message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {reason}")]
    InvalidConfiguration { reason: String },

    #[error("work rejected: queue is full (capacity: {capacity})")]
    Rejected { capacity: usize },

    #[error("pool has been shut down")]
    ShutDown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Result type for pool operations
pub type PoolResult<T> = Result<T, PoolError>;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatcher '{identity}' is stopped")]
    Stopped { identity: String },

    #[error("failed to spawn receive loop for '{identity}': {source}")]
    Spawn {
        identity: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for dispatcher operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// A unit of work that did not complete normally.
///
/// Caught on the worker thread and handed to the pool's failure hook; never
/// returned to the submitter.
#[derive(Debug, thiserror::Error)]
pub enum WorkFailure {
    #[error("task {task} failed: {source}")]
    Errored {
        task: u64,
        #[source]
        source: BoxError,
    },

    #[error("task {task} panicked: {message}")]
    Panicked { task: u64, message: String },
}

impl WorkFailure {
    pub fn task(&self) -> u64 {
        match self {
            Self::Errored { task, .. } | Self::Panicked { task, .. } => *task,
        }
    }
}
