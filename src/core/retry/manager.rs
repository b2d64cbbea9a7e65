//! Retry loop with backoff, cancellation, and attempt history.

use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::classifier::{Classification, ErrorCategory, ErrorClassifier, ExecutionError};
use crate::config::{BackoffStrategy, RetryPolicy};
use crate::util::clock::now_ms;

/// Relative jitter applied to delays when enabled.
const JITTER_FRACTION: f64 = 0.1;

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The operation returned `Ok`.
    Succeeded,
    /// The operation returned an error.
    Failed,
}

/// Terminal outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    /// Some attempt succeeded.
    Succeeded,
    /// Retries ran out or the failure was not retryable.
    Failed,
    /// Cancelled before finishing; not a failure.
    Cancelled,
}

/// One invocation of the wrapped operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttempt {
    /// Zero-based attempt number.
    pub attempt_number: u32,
    /// When the attempt finished (ms since epoch).
    pub timestamp_ms: u128,
    /// Delay slept before this attempt.
    pub delay_applied_ms: u64,
    /// Category of the failure, if the attempt failed.
    pub error_category: Option<ErrorCategory>,
    /// Failure message, if the attempt failed.
    pub error: Option<String>,
    /// Attempt outcome.
    pub outcome: AttemptOutcome,
}

/// Attempt log of one logical operation. Append-only until finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryHistory {
    /// Operation identifier.
    pub operation_id: Uuid,
    /// Human-readable operation name.
    pub name: String,
    /// Start timestamp (ms since epoch).
    pub started_at_ms: u128,
    /// Set when finalized.
    pub completed_at_ms: Option<u128>,
    /// Set when finalized.
    pub outcome: Option<HistoryOutcome>,
    attempts: Vec<RetryAttempt>,
}

impl RetryHistory {
    /// Open a history for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            operation_id: Uuid::new_v4(),
            name: name.into(),
            started_at_ms: now_ms(),
            completed_at_ms: None,
            outcome: None,
            attempts: Vec::new(),
        }
    }

    /// Append an attempt. Ignored once finalized.
    pub fn record(&mut self, attempt: RetryAttempt) {
        if self.is_finalized() {
            return;
        }
        self.attempts.push(attempt);
    }

    /// Close the history. Only the first call has an effect.
    pub fn finalize(&mut self, outcome: HistoryOutcome) {
        if self.is_finalized() {
            return;
        }
        self.outcome = Some(outcome);
        self.completed_at_ms = Some(now_ms());
    }

    /// Whether an outcome has been recorded.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.outcome.is_some()
    }

    /// Attempts in order.
    #[must_use]
    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }

    /// Attempts made after the first.
    #[must_use]
    pub fn retries(&self) -> u32 {
        u32::try_from(self.attempts.len().saturating_sub(1)).unwrap_or(u32::MAX)
    }
}

/// Why a retried operation did not succeed.
#[derive(Debug, Clone, Error)]
pub enum RetryFailure {
    /// The retry budget ran out.
    #[error("retries exhausted after {attempts} attempts: {error}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Last error.
        error: ExecutionError,
        /// Classification of the last error.
        classification: Classification,
    },
    /// The classifier ruled out another attempt.
    #[error("non-retryable failure: {error}")]
    NotRetryable {
        /// The error.
        error: ExecutionError,
        /// Its classification.
        classification: Classification,
    },
    /// The cancellation token fired.
    #[error("operation cancelled")]
    Cancelled {
        /// Error of the attempt before cancellation, if any.
        last_error: Option<ExecutionError>,
    },
}

impl RetryFailure {
    /// Underlying executor error, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ExecutionError> {
        match self {
            Self::Exhausted { error, .. } | Self::NotRetryable { error, .. } => Some(error),
            Self::Cancelled { last_error } => last_error.as_ref(),
        }
    }

    /// Whether the failure is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result of [`RetryManager::retry_with_backoff`] plus its finalized history.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// Operation result.
    pub result: Result<T, RetryFailure>,
    /// Finalized attempt log.
    pub history: RetryHistory,
}

impl<T> RetryOutcome<T> {
    /// Attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        u32::try_from(self.history.attempts().len()).unwrap_or(u32::MAX)
    }
}

/// Aggregate counters across operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStats {
    /// Finalized operations.
    pub operations: u64,
    /// Operations that succeeded.
    pub succeeded: u64,
    /// Operations that failed.
    pub failed: u64,
    /// Operations that were cancelled.
    pub cancelled: u64,
    /// Attempts beyond the first, summed over all operations.
    pub retries: u64,
}

/// Delay before the attempt following failed attempt `attempt`, without jitter.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn delay_for_attempt(policy: &RetryPolicy, attempt: u32) -> Duration {
    let max = policy.max_delay();
    match policy.strategy {
        BackoffStrategy::Immediate => Duration::ZERO,
        BackoffStrategy::Fixed => policy.initial_delay().min(max),
        BackoffStrategy::Linear => policy
            .initial_delay()
            .checked_mul(attempt.saturating_add(1))
            .map_or(max, |d| d.min(max)),
        BackoffStrategy::Exponential => {
            let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
            let raw_ms = policy.initial_delay_ms as f64 * policy.multiplier.powi(exponent);
            if !raw_ms.is_finite() || raw_ms >= policy.max_delay_ms as f64 {
                max
            } else {
                Duration::from_micros((raw_ms * 1_000.0).round() as u64)
            }
        }
    }
}

/// Perturb `delay` uniformly within ±10%.
#[must_use]
pub fn apply_jitter(delay: Duration) -> Duration {
    if delay.is_zero() {
        return delay;
    }
    let factor = rand::rng().random_range((1.0 - JITTER_FRACTION)..=(1.0 + JITTER_FRACTION));
    delay.mul_f64(factor)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Runs operations under a [`RetryPolicy`] and keeps recent histories.
#[derive(Debug)]
pub struct RetryManager {
    histories: Mutex<VecDeque<RetryHistory>>,
    capacity: usize,
    stats: Mutex<RetryStats>,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new(RetryPolicy::default().history_capacity)
    }
}

impl RetryManager {
    /// Create a manager retaining up to `capacity` finalized histories.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            histories: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Aggregate counters.
    #[must_use]
    pub fn stats(&self) -> RetryStats {
        *self.stats.lock()
    }

    /// Recently finalized histories, oldest first.
    #[must_use]
    pub fn recent_histories(&self) -> Vec<RetryHistory> {
        self.histories.lock().iter().cloned().collect()
    }

    /// Invoke `operation` until it succeeds, fails terminally, or `cancel` fires.
    ///
    /// The closure receives the zero-based attempt number. Cancellation is
    /// checked before every attempt and cuts a backoff sleep short; an attempt
    /// already running is always awaited to completion and recorded.
    pub async fn retry_with_backoff<T, F, Fut>(
        &self,
        name: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, ExecutionError>>,
    {
        let mut history = RetryHistory::new(name);
        let mut attempt: u32 = 0;
        let mut delay_applied = Duration::ZERO;
        let mut last_error: Option<ExecutionError> = None;

        let result = loop {
            if cancel.is_cancelled() {
                break Err(RetryFailure::Cancelled { last_error });
            }

            match operation(attempt).await {
                Ok(value) => {
                    history.record(RetryAttempt {
                        attempt_number: attempt,
                        timestamp_ms: now_ms(),
                        delay_applied_ms: duration_ms(delay_applied),
                        error_category: None,
                        error: None,
                        outcome: AttemptOutcome::Succeeded,
                    });
                    break Ok(value);
                }
                Err(error) => {
                    let classification = ErrorClassifier::classify(&error);
                    history.record(RetryAttempt {
                        attempt_number: attempt,
                        timestamp_ms: now_ms(),
                        delay_applied_ms: duration_ms(delay_applied),
                        error_category: Some(classification.category),
                        error: Some(error.to_string()),
                        outcome: AttemptOutcome::Failed,
                    });

                    if !classification.is_retryable() {
                        break Err(RetryFailure::NotRetryable {
                            error,
                            classification,
                        });
                    }
                    if attempt >= policy.max_retries {
                        warn!(
                            operation = name,
                            attempts = attempt + 1,
                            category = %classification.category,
                            "retries exhausted"
                        );
                        break Err(RetryFailure::Exhausted {
                            attempts: attempt + 1,
                            error,
                            classification,
                        });
                    }

                    let base = delay_for_attempt(policy, attempt);
                    delay_applied = if policy.jitter { apply_jitter(base) } else { base };
                    debug!(
                        operation = name,
                        attempt,
                        delay_ms = duration_ms(delay_applied),
                        category = %classification.category,
                        %error,
                        "attempt failed, backing off"
                    );
                    last_error = Some(error);

                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {}
                        () = tokio::time::sleep(delay_applied) => {}
                    }
                    attempt += 1;
                }
            }
        };

        let outcome = match &result {
            Ok(_) => HistoryOutcome::Succeeded,
            Err(RetryFailure::Cancelled { .. }) => HistoryOutcome::Cancelled,
            Err(_) => HistoryOutcome::Failed,
        };
        history.finalize(outcome);
        self.record(&history);
        RetryOutcome { result, history }
    }

    fn record(&self, history: &RetryHistory) {
        {
            let mut stats = self.stats.lock();
            stats.operations += 1;
            stats.retries += u64::from(history.retries());
            match history.outcome {
                Some(HistoryOutcome::Succeeded) => stats.succeeded += 1,
                Some(HistoryOutcome::Cancelled) => stats.cancelled += 1,
                Some(HistoryOutcome::Failed) | None => stats.failed += 1,
            }
        }
        if self.capacity == 0 {
            return;
        }
        let mut histories = self.histories.lock();
        if histories.len() >= self.capacity {
            histories.pop_front();
        }
        histories.push_back(history.clone());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    fn exponential(initial_delay_ms: u64, max_delay_ms: u64, multiplier: f64) -> RetryPolicy {
        RetryPolicy {
            strategy: BackoffStrategy::Exponential,
            initial_delay_ms,
            max_delay_ms,
            multiplier,
            jitter: false,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_exponential_delay_is_exact() {
        let policy = exponential(100, 10_000, 2.0);
        for attempt in 0..12u32 {
            let expected = (100u64 * 2u64.pow(attempt)).min(10_000);
            assert_eq!(
                delay_for_attempt(&policy, attempt),
                Duration::from_millis(expected),
                "attempt {attempt}"
            );
        }
        assert_eq!(
            delay_for_attempt(&policy, u32::MAX),
            Duration::from_millis(10_000)
        );
    }

    #[test]
    fn test_strategy_delays() {
        let base = RetryPolicy {
            initial_delay_ms: 500,
            max_delay_ms: 1_200,
            jitter: false,
            ..RetryPolicy::default()
        };
        let with = |strategy| RetryPolicy {
            strategy,
            ..base.clone()
        };
        assert_eq!(delay_for_attempt(&with(BackoffStrategy::Immediate), 3), Duration::ZERO);
        assert_eq!(
            delay_for_attempt(&with(BackoffStrategy::Fixed), 3),
            Duration::from_millis(500)
        );
        assert_eq!(
            delay_for_attempt(&with(BackoffStrategy::Linear), 1),
            Duration::from_millis(1_000)
        );
        assert_eq!(
            delay_for_attempt(&with(BackoffStrategy::Linear), 5),
            Duration::from_millis(1_200)
        );
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let delay = Duration::from_millis(1_000);
        for _ in 0..200 {
            let j = apply_jitter(delay);
            assert!(j >= Duration::from_millis(900) && j <= Duration::from_millis(1_100));
        }
        assert_eq!(apply_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_always_failing_makes_max_retries_plus_one_attempts() {
        let manager = RetryManager::new(8);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let outcome: RetryOutcome<()> = manager
            .retry_with_backoff("flaky", &RetryPolicy::immediate(3), &CancellationToken::new(), |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(ExecutionError::Io("disk busy".into())) }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.attempts(), 4);
        assert!(matches!(
            outcome.result,
            Err(RetryFailure::Exhausted { attempts: 4, .. })
        ));
        assert_eq!(outcome.history.outcome, Some(HistoryOutcome::Failed));
        assert!(outcome.history.completed_at_ms.is_some());
        let stats = manager.stats();
        assert_eq!((stats.operations, stats.failed, stats.retries), (1, 1, 3));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let manager = RetryManager::new(8);
        let outcome = manager
            .retry_with_backoff("eventually", &RetryPolicy::immediate(3), &CancellationToken::new(), |attempt| async move {
                if attempt < 2 {
                    Err(ExecutionError::Timeout("slow".into()))
                } else {
                    Ok(attempt)
                }
            })
            .await;
        assert_eq!(outcome.result.unwrap(), 2);
        let attempts = outcome.history.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[0].error_category, Some(ErrorCategory::ExternalTimeout));
        assert_eq!(attempts[2].outcome, AttemptOutcome::Succeeded);
        assert_eq!(manager.stats().succeeded, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let manager = RetryManager::new(8);
        let outcome: RetryOutcome<()> = manager
            .retry_with_backoff("bad-input", &RetryPolicy::immediate(5), &CancellationToken::new(), |_| async {
                Err(ExecutionError::Validation("corrupt raw file".into()))
            })
            .await;
        assert_eq!(outcome.attempts(), 1);
        assert!(matches!(outcome.result, Err(RetryFailure::NotRetryable { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_attempt() {
        let manager = RetryManager::new(8);
        let token = CancellationToken::new();
        token.cancel();
        let outcome: RetryOutcome<()> = manager
            .retry_with_backoff("never", &RetryPolicy::immediate(3), &token, |_| async { Ok(()) })
            .await;
        assert_eq!(outcome.attempts(), 0);
        assert!(outcome.result.as_ref().is_err_and(RetryFailure::is_cancelled));
        assert_eq!(outcome.history.outcome, Some(HistoryOutcome::Cancelled));
        let stats = manager.stats();
        assert_eq!((stats.cancelled, stats.failed), (1, 0));
    }

    #[tokio::test]
    async fn test_cancel_interrupts_backoff_sleep() {
        let manager = RetryManager::new(8);
        let token = CancellationToken::new();
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Fixed,
            initial_delay_ms: 60_000,
            max_delay_ms: 60_000,
            jitter: false,
            ..RetryPolicy::default()
        };
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let outcome: RetryOutcome<()> = tokio::time::timeout(
            Duration::from_secs(5),
            manager.retry_with_backoff("slow-backoff", &policy, &token, |_| async {
                Err(ExecutionError::Io("reset".into()))
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts(), 1);
        match outcome.result {
            Err(RetryFailure::Cancelled { last_error }) => {
                assert_eq!(last_error, Some(ExecutionError::Io("reset".into())));
            }
            other => panic!("expected cancellation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_mid_attempt_waits_for_attempt_boundary() {
        let manager = RetryManager::new(8);
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicU32::new(0));
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let done = Arc::clone(&finished);
        let outcome: RetryOutcome<()> = manager
            .retry_with_backoff("long-attempt", &RetryPolicy::immediate(3), &token, |_| {
                let done = Arc::clone(&done);
                async move {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Err(ExecutionError::Io("connection reset".into()))
                }
            })
            .await;

        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts(), 1);
        let attempt = &outcome.history.attempts()[0];
        assert_eq!(attempt.outcome, AttemptOutcome::Failed);
        assert_eq!(attempt.error_category, Some(ErrorCategory::TransientIo));
        assert!(outcome.result.as_ref().is_err_and(RetryFailure::is_cancelled));
        assert_eq!(outcome.history.outcome, Some(HistoryOutcome::Cancelled));
    }

    #[tokio::test]
    async fn test_attempt_that_succeeds_after_cancel_is_kept() {
        let manager = RetryManager::new(8);
        let token = CancellationToken::new();
        let canceller = token.clone();
        let outcome = manager
            .retry_with_backoff("late-cancel", &RetryPolicy::immediate(3), &token, |attempt| {
                canceller.cancel();
                async move { Ok(attempt) }
            })
            .await;
        assert_eq!(outcome.result.unwrap(), 0);
        assert_eq!(outcome.history.outcome, Some(HistoryOutcome::Succeeded));
    }

    #[tokio::test]
    async fn test_recent_histories_are_bounded() {
        let manager = RetryManager::new(2);
        for name in ["a", "b", "c"] {
            let _ = manager
                .retry_with_backoff(name, &RetryPolicy::immediate(0), &CancellationToken::new(), |_| async { Ok(()) })
                .await;
        }
        let names: Vec<String> = manager.recent_histories().into_iter().map(|h| h.name).collect();
        assert_eq!(names, vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_finalized_history_is_frozen() {
        let mut history = RetryHistory::new("op");
        history.finalize(HistoryOutcome::Succeeded);
        history.record(RetryAttempt {
            attempt_number: 0,
            timestamp_ms: 0,
            delay_applied_ms: 0,
            error_category: None,
            error: None,
            outcome: AttemptOutcome::Succeeded,
        });
        history.finalize(HistoryOutcome::Failed);
        assert!(history.attempts().is_empty());
        assert_eq!(history.outcome, Some(HistoryOutcome::Succeeded));
    }
}
