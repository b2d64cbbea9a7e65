//! Priority formula.
//!
//! A job's priority is a weighted blend of four components, each on the
//! `1..=10` scale, rounded and clipped into `1..=10`:
//!
//! | component | value |
//! |-----------|-------|
//! | quality   | banded quality score, 5 when unknown |
//! | age       | quality baseline + `min(age, max_age_boost_hours) × age_boost_per_hour` |
//! | user      | `user_requested_priority` when requested, else the quality baseline |
//! | context   | context table lookup, `default_context_priority` otherwise |
//!
//! A manual override short-circuits the formula.

use crate::config::PriorityConfig;
use crate::core::SchedulerError;
use crate::util::serde::Priority;

/// Everything the formula looks at for one job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityInput<'a> {
    /// Quality score in `0.0..=5.0`.
    pub quality_score: Option<f64>,
    /// Hours the job has been waiting.
    pub age_hours: f64,
    /// Explicitly requested by a user.
    pub user_requested: bool,
    /// Context tag.
    pub context: &'a str,
    /// Manual priority; clipped into range and returned as-is.
    pub manual_override: Option<i64>,
}

impl Default for PriorityInput<'_> {
    fn default() -> Self {
        Self {
            quality_score: None,
            age_hours: 0.0,
            user_requested: false,
            context: "",
            manual_override: None,
        }
    }
}

/// Deterministic priority calculator.
#[derive(Debug, Clone)]
pub struct PriorityCalculator {
    config: PriorityConfig,
}

impl PriorityCalculator {
    /// Build a calculator, rejecting weights that do not sum to 1.0.
    pub fn new(config: PriorityConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        Ok(Self { config })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &PriorityConfig {
        &self.config
    }

    /// Compute the priority for `input`.
    #[must_use]
    pub fn calculate(&self, input: &PriorityInput<'_>) -> Priority {
        if let Some(manual) = input.manual_override {
            return Priority::new(manual);
        }
        let cfg = &self.config;
        let quality = quality_component(input.quality_score);
        let score = cfg.weight_quality * quality
            + cfg.weight_age * (quality + self.age_boost(input.age_hours))
            + cfg.weight_user * self.user_component(input.user_requested, quality)
            + cfg.weight_context * self.context_component(input.context);
        Priority::from_score(score)
    }

    /// Boost accrued after `age_hours` of waiting; bounded by the accrual cap.
    #[must_use]
    pub fn age_boost(&self, age_hours: f64) -> f64 {
        if !age_hours.is_finite() || age_hours <= 0.0 {
            return 0.0;
        }
        age_hours.min(self.config.max_age_boost_hours) * self.config.age_boost_per_hour
    }

    fn user_component(&self, user_requested: bool, quality: f64) -> f64 {
        if user_requested {
            f64::from(self.config.user_requested_priority)
        } else {
            quality
        }
    }

    /// Context table lookup (case-insensitive); unknown tags use the default.
    #[must_use]
    pub fn context_component(&self, context: &str) -> f64 {
        let tag = context.trim().to_ascii_lowercase();
        let value = self
            .config
            .context_priorities
            .get(&tag)
            .copied()
            .unwrap_or(self.config.default_context_priority);
        f64::from(value)
    }
}

/// Banded quality component. Missing or non-finite scores are neutral (5).
#[must_use]
pub fn quality_component(score: Option<f64>) -> f64 {
    match score {
        Some(s) if s.is_finite() => {
            if s >= 4.5 {
                10.0
            } else if s >= 4.0 {
                8.0
            } else if s >= 3.5 {
                6.0
            } else if s >= 3.0 {
                5.0
            } else if s > 2.0 {
                3.0
            } else {
                1.0
            }
        }
        _ => 5.0,
    }
}
