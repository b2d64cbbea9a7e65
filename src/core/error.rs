//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::job::JobStatus;
use crate::util::serde::{JobId, ResourceUnits};

/// Errors produced by scheduler components.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Queue is full.
    #[error("queue full: {0}")]
    QueueFull(String),
    /// A job with this id is already queued or in flight.
    #[error("duplicate job: {0}")]
    DuplicateJob(JobId),
    /// Job is unknown, or no longer in a state the operation applies to.
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// Job status change that the lifecycle does not allow.
    #[error("invalid transition for job {job_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Affected job.
        job_id: JobId,
        /// Current status.
        from: JobStatus,
        /// Requested status.
        to: JobStatus,
    },
    /// The capacity ledger cannot fit the request. Callers requeue or wait.
    #[error("resource exhausted: requested {requested}, available {available}")]
    ResourceExhausted {
        /// Units requested.
        requested: ResourceUnits,
        /// Units currently available.
        available: ResourceUnits,
    },
    /// The device is critical or unavailable; admission is paused system-wide.
    #[error("device critical: admission paused")]
    DeviceCritical,
    /// Configuration rejected at load time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Job repository failure.
    #[error("repository error: {0}")]
    Repository(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
