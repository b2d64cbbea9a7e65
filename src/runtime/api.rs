//! API-facing request/response models.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::core::{
    Job, JobExecutor, JobScheduler, JobStatus, QueueStatus, ResourceState, SchedulerError,
};
use crate::util::serde::{JobId, Priority, ResourceUnits, WorkItemId};

/// Job submission payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSubmission {
    /// Work item to process.
    pub work_item_id: WorkItemId,
    /// Quality score in `0.0..=5.0`.
    pub quality_score: Option<f64>,
    /// Explicitly requested by a user.
    pub user_requested: bool,
    /// Context tag.
    pub context: String,
    /// Session the job belongs to.
    pub session_id: Option<String>,
    /// Manual priority.
    pub priority: Option<i64>,
    /// Estimated ledger cost at full speed.
    pub estimated_resource_cost: ResourceUnits,
    /// Retry budget; scheduler default when absent.
    pub max_retries: Option<u32>,
    /// Full retry policy; overrides `max_retries`.
    pub retry_policy: Option<RetryPolicy>,
}

impl JobSubmission {
    /// Build the job this submission describes.
    #[must_use]
    pub fn into_job(self, created_at_ms: u128, defaults: &RetryPolicy) -> Job {
        let mut job = Job::new(self.work_item_id, created_at_ms)
            .with_user_requested(self.user_requested)
            .with_context(self.context)
            .with_cost(self.estimated_resource_cost)
            .with_max_retries(self.max_retries.unwrap_or(defaults.max_retries));
        if let Some(score) = self.quality_score {
            job = job.with_quality(score);
        }
        if let Some(session) = self.session_id {
            job = job.with_session(session);
        }
        if let Some(priority) = self.priority {
            job = job.with_priority_override(priority);
        }
        if let Some(policy) = self.retry_policy {
            job = job.with_retry_policy(policy);
        }
        job
    }
}

/// Job status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Current priority.
    pub priority: Priority,
    /// Retries consumed.
    pub retry_count: u32,
    /// Last failure message.
    pub reason: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            priority: job.priority,
            retry_count: job.retry_count,
            reason: job.last_error.clone(),
        }
    }
}

/// Queue status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    /// Pending jobs.
    pub pending: usize,
    /// Dispatched or running jobs.
    pub in_flight: usize,
    /// Pending count per priority, keyed by priority value.
    pub by_priority: BTreeMap<u8, usize>,
    /// Mean pending priority.
    pub average_priority: f64,
    /// Age of the oldest pending job in hours.
    pub oldest_pending_age_hours: Option<f64>,
    /// Jobs completed since start.
    pub completed: u64,
    /// Jobs failed since start.
    pub failed: u64,
}

impl From<QueueStatus> for QueueStatusResponse {
    fn from(status: QueueStatus) -> Self {
        let d = status.distribution;
        Self {
            pending: d.pending,
            in_flight: d.in_flight,
            by_priority: d.by_priority,
            average_priority: d.average_priority,
            oldest_pending_age_hours: d.oldest_pending_age_hours,
            completed: status.dispatch.completed,
            failed: status.dispatch.failed,
        }
    }
}

/// Health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Healthy flag: telemetry is flowing and admission is not paused.
    pub ok: bool,
    /// Current device state.
    pub resource_state: ResourceState,
    /// Pending jobs.
    pub pending: usize,
}

/// Submit a job and report its initial status.
pub async fn submit_job<E: JobExecutor>(
    scheduler: &JobScheduler<E>,
    req: JobSubmission,
) -> Result<JobStatusResponse, SchedulerError> {
    let job = req.into_job(crate::util::clock::now_ms(), &scheduler.config().retry_defaults);
    let id = scheduler.submit(job).await?;
    let job = scheduler
        .get_job(id)
        .await?
        .ok_or(SchedulerError::NotFound(id))?;
    Ok(JobStatusResponse::from(&job))
}

/// Return a health payload.
#[must_use]
pub fn health<E: JobExecutor>(scheduler: &JobScheduler<E>) -> Health {
    let state = scheduler.monitor().latest().state;
    Health {
        ok: !state.blocks_admission(),
        resource_state: state,
        pending: scheduler.queue().len(),
    }
}
