//! Core scheduling abstractions and capacity accounting.

pub mod dispatcher;
pub mod error;
pub mod events;
pub mod executor;
pub mod job;
pub mod job_queue;
pub mod priority;
pub mod repository;
pub mod resource;
pub mod retry;
pub mod scheduler;

pub use dispatcher::{admitted_cost, DispatchStats, DispatchStatus, Dispatcher};
pub use error::{AppResult, SchedulerError};
pub use events::{EventSink, InMemoryEventSink, SchedulerEvent, TracingEventSink};
pub use executor::{ExecutionContext, JobExecutor};
pub use job::{Job, JobStatus};
pub use job_queue::{JobQueue, QueueDistribution};
pub use priority::{quality_component, PriorityCalculator, PriorityInput};
pub use repository::JobRepository;
pub use resource::{
    MemoryLedger, ResourceMonitor, ResourceSnapshot, ResourceState, TelemetryReading,
    TelemetrySource, TrendDirection, TrendMetric, TrendSummary,
};
pub use retry::{
    Classification, ErrorCategory, ErrorClassifier, ExecutionError, RecoveryStrategy,
    RetryFailure, RetryHistory, RetryManager, RetryOutcome, RetryStats, Severity,
};
pub use scheduler::{JobScheduler, QueueStatus, ResourceStatus};
