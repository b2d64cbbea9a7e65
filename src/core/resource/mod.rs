//! Device pressure tracking and the capacity ledger.

pub mod ledger;
pub mod monitor;
pub mod state;

pub use ledger::MemoryLedger;
pub use monitor::{
    ResourceMonitor, ResourceSnapshot, TelemetryReading, TelemetrySource, TrendDirection,
    TrendMetric, TrendSummary,
};
pub use state::{classify, classify_axis, ResourceState};
