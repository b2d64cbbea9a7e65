//! Configuration models for the priority formula, resource monitor, retries, and dispatcher.

pub mod priority;
pub mod resources;
pub mod retry;
pub mod scheduler;

pub use priority::PriorityConfig;
pub use resources::{ResourceConfig, Thresholds};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use scheduler::{DispatcherConfig, SchedulerConfig, StarvationConfig};
