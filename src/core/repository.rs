//! Job persistence boundary.

use async_trait::async_trait;

use crate::core::job::{Job, JobStatus};
use crate::core::SchedulerError;
use crate::util::serde::JobId;

/// Storage for job records. Implementations map their own failures into
/// [`SchedulerError::Repository`].
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Fetch a job by id.
    async fn get(&self, id: JobId) -> Result<Option<Job>, SchedulerError>;

    /// Insert or replace a job.
    async fn put(&self, job: &Job) -> Result<(), SchedulerError>;

    /// Remove a job, returning the stored record.
    async fn delete(&self, id: JobId) -> Result<Option<Job>, SchedulerError>;

    /// All jobs currently in `status`.
    async fn query_by_status(&self, status: JobStatus) -> Result<Vec<Job>, SchedulerError>;
}
