//! Scheduler events and sinks.
//!
//! Sinks are fire-and-forget: publishing never fails and never blocks the
//! caller on a slow consumer.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::resource::ResourceState;
use crate::util::serde::{JobId, Priority, WorkItemId};

/// Lifecycle and resource events emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// A job was accepted into the queue.
    JobCreated {
        /// Job identifier.
        job_id: JobId,
        /// Work item the job processes.
        work_item_id: WorkItemId,
        /// Priority at submission.
        priority: Priority,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
    /// A job started executing.
    JobProgress {
        /// Job identifier.
        job_id: JobId,
        /// Worker that admitted the job.
        worker_id: usize,
        /// Ledger units reserved for the run.
        admitted_cost: u64,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
    /// A job finished successfully.
    JobCompleted {
        /// Job identifier.
        job_id: JobId,
        /// Attempts taken, including the successful one.
        attempts: u32,
        /// Executor output.
        result: serde_json::Value,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
    /// A job failed permanently.
    JobFailed {
        /// Job identifier.
        job_id: JobId,
        /// Last error message.
        error: String,
        /// Retries consumed.
        retry_count: u32,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
    /// A job was cancelled.
    JobCancelled {
        /// Job identifier.
        job_id: JobId,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
    /// The effective resource state changed.
    ResourceStateChanged {
        /// Device identifier.
        device_id: String,
        /// Previous state.
        from: ResourceState,
        /// New state.
        to: ResourceState,
        /// Multiplier for the new state.
        throttle_multiplier: f64,
        /// Timestamp (ms since epoch).
        at_ms: u128,
    },
}

impl SchedulerEvent {
    /// Short action name used in logs.
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::JobCreated { .. } => "job_created",
            Self::JobProgress { .. } => "job_progress",
            Self::JobCompleted { .. } => "job_completed",
            Self::JobFailed { .. } => "job_failed",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::ResourceStateChanged { .. } => "resource_state_changed",
        }
    }

    /// Job the event refers to, if any.
    #[must_use]
    pub const fn job_id(&self) -> Option<JobId> {
        match self {
            Self::JobCreated { job_id, .. }
            | Self::JobProgress { job_id, .. }
            | Self::JobCompleted { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::JobCancelled { job_id, .. } => Some(*job_id),
            Self::ResourceStateChanged { .. } => None,
        }
    }
}

/// Event sink abstraction.
pub trait EventSink: Send + Sync {
    /// Publish an event. Must not block or fail.
    fn publish(&self, event: SchedulerEvent);
}

/// In-memory sink with a bounded buffer, for tests and dev.
#[derive(Debug)]
pub struct InMemoryEventSink {
    events: Mutex<VecDeque<SchedulerEvent>>,
    max_events: usize,
}

impl InMemoryEventSink {
    /// Create a sink keeping at most `max_events`, dropping the oldest first.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Snapshot of stored events, oldest first.
    #[must_use]
    pub fn events(&self) -> Vec<SchedulerEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Stored events for one job.
    #[must_use]
    pub fn events_for(&self, job_id: JobId) -> Vec<SchedulerEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.job_id() == Some(job_id))
            .cloned()
            .collect()
    }
}

impl EventSink for InMemoryEventSink {
    fn publish(&self, event: SchedulerEvent) {
        if self.max_events == 0 {
            return;
        }
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn publish(&self, event: SchedulerEvent) {
        match &event {
            SchedulerEvent::JobFailed { job_id, error, .. } => {
                warn!(%job_id, %error, action = event.action(), "scheduler event");
            }
            SchedulerEvent::ResourceStateChanged { from, to, .. } => {
                info!(%from, %to, action = event.action(), "scheduler event");
            }
            _ => {
                let job_id = event.job_id().map(|id| id.to_string()).unwrap_or_default();
                info!(%job_id, action = event.action(), "scheduler event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cancelled(n: u128) -> SchedulerEvent {
        SchedulerEvent::JobCancelled {
            job_id: uuid::Uuid::new_v4(),
            at_ms: n,
        }
    }

    #[test]
    fn test_in_memory_sink_is_bounded() {
        let sink = InMemoryEventSink::new(2);
        for n in 0..3 {
            sink.publish(cancelled(n));
        }
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SchedulerEvent::JobCancelled { at_ms: 1, .. }));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = SchedulerEvent::ResourceStateChanged {
            device_id: "gpu0".into(),
            from: ResourceState::Optimal,
            to: ResourceState::Critical,
            throttle_multiplier: 0.0,
            at_ms: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "resource_state_changed");
        assert_eq!(json["to"], "CRITICAL");
        assert_eq!(event.job_id(), None);
    }
}
