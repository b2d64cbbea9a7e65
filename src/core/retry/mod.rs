//! Failure classification and the retry loop built on it.

pub mod classifier;
pub mod manager;

pub use classifier::{
    Classification, ErrorCategory, ErrorClassifier, ExecutionError, RecoveryStrategy, Severity,
};
pub use manager::{
    AttemptOutcome, HistoryOutcome, RetryAttempt, RetryFailure, RetryHistory, RetryManager,
    RetryOutcome, RetryStats, apply_jitter, delay_for_attempt,
};
