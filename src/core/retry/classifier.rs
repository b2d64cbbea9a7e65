//! Failure classification.
//!
//! [`ErrorClassifier::classify`] is pure: the same error always yields the
//! same category, severity, and suggested recovery.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure reported by a job executor.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    /// Ran out of accelerator or host memory.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Transient I/O failure (network, filesystem).
    #[error("io error: {0}")]
    Io(String),
    /// An external call did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),
    /// The input is invalid and will not become valid on retry.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Broken configuration; nothing will succeed until it is fixed.
    #[error("configuration error: {0}")]
    Config(String),
    /// Anything else. The message is inspected for well-known patterns.
    #[error("{0}")]
    Other(String),
}

/// What kind of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Memory or device capacity ran out.
    ResourceExhaustion,
    /// Network or filesystem hiccup.
    TransientIo,
    /// Upstream did not respond in time.
    ExternalTimeout,
    /// Bad input.
    Validation,
    /// Misconfiguration.
    FatalConfig,
    /// Unrecognized failure.
    Unknown,
}

impl ErrorCategory {
    /// Snake-case name used in logs and history records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResourceExhaustion => "resource_exhaustion",
            Self::TransientIo => "transient_io",
            Self::ExternalTimeout => "external_timeout",
            Self::Validation => "validation",
            Self::FatalConfig => "fatal_config",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational.
    Info,
    /// Low impact.
    Low,
    /// Medium impact.
    Medium,
    /// High impact.
    High,
    /// Requires operator attention.
    Critical,
}

/// Suggested reaction to a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Retry right away.
    Retry,
    /// Retry after the policy's backoff delay.
    RetryBackoff,
    /// Retry once resources free up.
    WaitForResource,
    /// Drop the work item without failing loudly.
    Skip,
    /// Give up on this job.
    FailPermanently,
    /// Stop admitting work until an operator intervenes.
    HaltSystem,
}

impl RecoveryStrategy {
    /// Whether the strategy allows another attempt.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Retry | Self::RetryBackoff | Self::WaitForResource)
    }
}

/// Result of classifying one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    /// Failure category.
    pub category: ErrorCategory,
    /// Failure severity.
    pub severity: Severity,
    /// Suggested recovery.
    pub strategy: RecoveryStrategy,
}

impl Classification {
    const fn new(category: ErrorCategory, severity: Severity, strategy: RecoveryStrategy) -> Self {
        Self {
            category,
            severity,
            strategy,
        }
    }

    /// Whether another attempt is worthwhile.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.strategy.is_retryable()
    }
}

const OOM_PATTERNS: &[&str] = &["out of memory", "oom-kill", "cuda error", "failed to allocate"];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "deadline exceeded"];
const TRANSIENT_PATTERNS: &[&str] = &[
    "connection reset",
    "connection refused",
    "broken pipe",
    "temporarily unavailable",
    "try again",
];
const UNPROCESSABLE_PATTERNS: &[&str] = &[
    "unsupported format",
    "unsupported file type",
    "no such file",
];
const VALIDATION_PATTERNS: &[&str] = &["invalid", "corrupt"];

/// Stateless failure classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an executor failure.
    #[must_use]
    pub fn classify(error: &ExecutionError) -> Classification {
        use ErrorCategory as C;
        use RecoveryStrategy as R;
        use Severity as S;

        match error {
            ExecutionError::ResourceExhausted(_) => {
                Classification::new(C::ResourceExhaustion, S::High, R::WaitForResource)
            }
            ExecutionError::Io(_) => Classification::new(C::TransientIo, S::Medium, R::RetryBackoff),
            ExecutionError::Timeout(_) => Classification::new(C::ExternalTimeout, S::Medium, R::Retry),
            ExecutionError::Validation(_) => Classification::new(C::Validation, S::Low, R::Skip),
            ExecutionError::Config(_) => Classification::new(C::FatalConfig, S::Critical, R::HaltSystem),
            ExecutionError::Other(message) => Self::classify_message(message),
        }
    }

    /// Shorthand for `classify(error).is_retryable()`.
    #[must_use]
    pub fn is_retryable(error: &ExecutionError) -> bool {
        Self::classify(error).is_retryable()
    }

    fn classify_message(message: &str) -> Classification {
        use ErrorCategory as C;
        use RecoveryStrategy as R;
        use Severity as S;

        let lower = message.to_ascii_lowercase();
        let matches = |patterns: &[&str]| patterns.iter().any(|p| lower.contains(p));
        if matches(OOM_PATTERNS) {
            Classification::new(C::ResourceExhaustion, S::High, R::WaitForResource)
        } else if matches(TIMEOUT_PATTERNS) {
            Classification::new(C::ExternalTimeout, S::Medium, R::Retry)
        } else if matches(TRANSIENT_PATTERNS) {
            Classification::new(C::TransientIo, S::Medium, R::RetryBackoff)
        } else if matches(UNPROCESSABLE_PATTERNS) {
            // The input can never be processed; surface it as a hard failure.
            Classification::new(C::Validation, S::High, R::FailPermanently)
        } else if matches(VALIDATION_PATTERNS) {
            Classification::new(C::Validation, S::Low, R::Skip)
        } else {
            Classification::new(C::Unknown, S::Medium, R::RetryBackoff)
        }
    }
}
