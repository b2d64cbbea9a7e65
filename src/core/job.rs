//! Job record and lifecycle.

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;
use crate::core::priority::PriorityInput;
use crate::core::SchedulerError;
use crate::util::clock::hours_between;
use crate::util::serde::{JobId, Priority, ResourceUnits, WorkItemId};

/// Status of a job in the scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the queue.
    Pending,
    /// Taken off the queue by a dispatcher worker, not yet executing.
    Dispatched,
    /// Handed to the executor.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed permanently.
    Failed,
    /// Cancelled before completion.
    Cancelled,
}

impl JobStatus {
    /// Terminal statuses are the only ones visible to submitters as outcomes.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Dispatched | Self::Cancelled)
                | (Self::Dispatched, Self::Running | Self::Pending | Self::Cancelled)
                | (
                    Self::Running,
                    Self::Completed | Self::Failed | Self::Cancelled | Self::Pending
                )
        )
    }

    /// Lowercase name, as used in events and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A unit of schedulable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Reference to the work item the executor processes.
    pub work_item_id: WorkItemId,
    /// Effective priority used for queue ordering.
    pub priority: Priority,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Creation timestamp (ms since epoch).
    pub created_at_ms: u128,
    /// When execution started.
    pub started_at_ms: Option<u128>,
    /// When the job reached a terminal status.
    pub completed_at_ms: Option<u128>,
    /// Retries consumed so far.
    pub retry_count: u32,
    /// Retry budget.
    pub max_retries: u32,
    /// Last failure message.
    pub last_error: Option<String>,
    /// Ledger units the job needs at full speed.
    pub estimated_resource_cost: ResourceUnits,
    /// Quality score in `0.0..=5.0`, if known.
    pub quality_score: Option<f64>,
    /// Explicitly requested by a user.
    pub user_requested: bool,
    /// Context tag (e.g. "wedding").
    pub context: String,
    /// Session the job belongs to.
    pub session_id: Option<String>,
    /// Manual priority that bypasses the formula.
    pub priority_override: Option<Priority>,
    /// Accumulated session boost, re-applied on every rebalance.
    pub session_boost: u8,
    /// Lower bound set by starvation boosting.
    pub priority_floor: Option<Priority>,
    /// Job-specific retry policy; scheduler defaults apply when absent.
    pub retry_policy: Option<RetryPolicy>,
}

impl Job {
    /// Create a pending job for a work item.
    #[must_use]
    pub fn new(work_item_id: impl Into<WorkItemId>, created_at_ms: u128) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            work_item_id: work_item_id.into(),
            priority: Priority::NEUTRAL,
            status: JobStatus::Pending,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            retry_count: 0,
            max_retries: RetryPolicy::default().max_retries,
            last_error: None,
            estimated_resource_cost: 0,
            quality_score: None,
            user_requested: false,
            context: String::new(),
            session_id: None,
            priority_override: None,
            session_boost: 0,
            priority_floor: None,
            retry_policy: None,
        }
    }

    /// Set the quality score.
    #[must_use]
    pub fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// Mark as user requested.
    #[must_use]
    pub const fn with_user_requested(mut self, requested: bool) -> Self {
        self.user_requested = requested;
        self
    }

    /// Set the context tag.
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Tag with a session.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Pin the priority manually.
    #[must_use]
    pub fn with_priority_override(mut self, priority: i64) -> Self {
        self.priority_override = Some(Priority::new(priority));
        self
    }

    /// Set the estimated ledger cost.
    #[must_use]
    pub const fn with_cost(mut self, cost: ResourceUnits) -> Self {
        self.estimated_resource_cost = cost;
        self
    }

    /// Set the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Attach a job-specific retry policy. Its `max_retries` becomes the job's budget.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.max_retries = policy.max_retries;
        self.retry_policy = Some(policy);
        self
    }

    /// Ledger consumer id for this job.
    #[must_use]
    pub fn consumer_id(&self) -> String {
        self.id.to_string()
    }

    /// Hours since creation.
    #[must_use]
    pub fn age_hours(&self, now_ms: u128) -> f64 {
        hours_between(self.created_at_ms, now_ms)
    }

    /// Formula inputs for this job at `now_ms`.
    #[must_use]
    pub fn priority_input(&self, now_ms: u128) -> PriorityInput<'_> {
        PriorityInput {
            quality_score: self.quality_score,
            age_hours: self.age_hours(now_ms),
            user_requested: self.user_requested,
            context: &self.context,
            manual_override: self.priority_override.map(|p| i64::from(p.value())),
        }
    }

    /// Apply session boost and starvation floor to a formula result.
    #[must_use]
    pub fn effective_priority(&self, base: Priority) -> Priority {
        let boosted = base.saturating_boost(self.session_boost);
        self.priority_floor.map_or(boosted, |floor| boosted.max(floor))
    }

    /// Move to `next`, stamping lifecycle timestamps.
    pub fn transition(&mut self, next: JobStatus, now_ms: u128) -> Result<(), SchedulerError> {
        if !self.status.can_transition_to(next) {
            return Err(SchedulerError::InvalidTransition {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        match next {
            JobStatus::Running => self.started_at_ms = Some(now_ms),
            JobStatus::Pending => self.started_at_ms = None,
            s if s.is_terminal() => self.completed_at_ms = Some(now_ms),
            _ => {}
        }
        self.status = next;
        Ok(())
    }
}
