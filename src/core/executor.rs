//! Job execution trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::job::Job;
use crate::core::retry::ExecutionError;
use crate::util::serde::ResourceUnits;

/// Per-attempt context handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Throttle multiplier in effect when the job was admitted.
    pub throttle_multiplier: f64,
    /// Ledger units reserved for this run.
    pub admitted_cost: ResourceUnits,
    /// Zero-based attempt number.
    pub attempt: u32,
    /// Worker that admitted the job.
    pub worker_id: usize,
}

/// Abstraction for running one job and producing a result.
///
/// The scheduler never inspects the result; it is handed back to callers
/// through events and the repository is updated with the terminal status only.
///
/// # Example
///
/// ```rust,ignore
/// use async_trait::async_trait;
/// use prometheus_job_scheduler::core::{ExecutionContext, ExecutionError, Job, JobExecutor};
///
/// #[derive(Clone)]
/// struct Culler;
///
/// #[async_trait]
/// impl JobExecutor for Culler {
///     async fn execute(&self, job: &Job, ctx: ExecutionContext) -> Result<serde_json::Value, ExecutionError> {
///         let batch = (32.0 * ctx.throttle_multiplier).ceil() as usize;
///         Ok(serde_json::json!({ "work_item": job.work_item_id, "batch": batch }))
///     }
/// }
/// ```
#[async_trait]
pub trait JobExecutor: Send + Sync + Clone + 'static {
    /// Execute one attempt of `job`.
    async fn execute(
        &self,
        job: &Job,
        ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError>;
}
