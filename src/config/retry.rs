//! Retry policy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Function used to compute the delay before the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Retry without waiting.
    #[serde(alias = "IMMEDIATE")]
    Immediate,
    /// Wait `initial_delay` between every attempt.
    #[serde(alias = "FIXED")]
    Fixed,
    /// Wait `initial_delay * (attempt + 1)`.
    #[serde(alias = "LINEAR")]
    Linear,
    /// Wait `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[serde(alias = "EXPONENTIAL")]
    Exponential,
}

/// Retry policy applied to one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    /// Backoff strategy.
    pub strategy: BackoffStrategy,
    /// Base delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Upper bound for any computed delay in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor for exponential backoff.
    pub multiplier: f64,
    /// Perturb delays by up to ±10%.
    pub jitter: bool,
    /// Finalized histories retained for reporting.
    pub history_capacity: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: BackoffStrategy::Exponential,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            jitter: true,
            history_capacity: 256,
        }
    }
}

impl RetryPolicy {
    /// Policy that retries immediately, mostly useful in tests.
    #[must_use]
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            strategy: BackoffStrategy::Immediate,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter: false,
            ..Self::default()
        }
    }

    /// Same policy with a different retry budget.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Base delay.
    #[must_use]
    pub const fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay cap.
    #[must_use]
    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(format!(
                "initial_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.initial_delay_ms, self.max_delay_ms
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(format!("multiplier must be >= 1.0, got {}", self.multiplier));
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".into());
        }
        Ok(())
    }
}
