//! Error types for the job engine and scrape tasks.

use thiserror::Error;

use crate::engine::job::{JobId, JobStatus};

/// Errors surfaced by the job engine to its callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Unknown job type or parameters rejected by the task's validator.
    /// The job is never created.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Queried, cancelled, or started a job id the store doesn't know.
    #[error("job {0} not found")]
    NotFound(JobId),

    /// Attempted a state transition the job state machine does not allow.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    /// The job store failed to read or write a record.
    #[error("job store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from a job store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// How a scrape task's execution ended when it did not complete normally.
///
/// Per-site failures are never represented here; tasks record those through
/// the progress sink and keep going. Only conditions that end the whole job
/// propagate as a `TaskError`.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task observed its cancellation token and stopped cleanly.
    /// Mapped to `Cancelled`, never `Failed`.
    #[error("cancelled")]
    Cancelled,

    /// The task cannot proceed at all (e.g. a required upstream is
    /// unreachable or rejects authentication). Mapped to `Failed`.
    #[error("{0}")]
    Fatal(String),
}

impl TaskError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}
