//! Priority formula configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Tolerance used when checking that the component weights sum to one.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Weights and lookup tables for the priority formula.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Weight of the quality component.
    pub weight_quality: f64,
    /// Weight of the age component.
    pub weight_age: f64,
    /// Weight of the user-request component.
    pub weight_user: f64,
    /// Weight of the context component.
    pub weight_context: f64,
    /// Hours of waiting after which the age boost stops growing.
    pub max_age_boost_hours: f64,
    /// Boost accrued per hour of waiting.
    pub age_boost_per_hour: f64,
    /// Component value for jobs explicitly requested by a user.
    pub user_requested_priority: u8,
    /// Context component for unknown or empty context tags.
    pub default_context_priority: u8,
    /// Context tag to component value.
    pub context_priorities: HashMap<String, u8>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        let context_priorities = [("wedding", 9), ("event", 8), ("portrait", 7)]
            .into_iter()
            .map(|(tag, p)| (tag.to_string(), p))
            .collect();
        Self {
            weight_quality: 0.4,
            weight_age: 0.3,
            weight_user: 0.2,
            weight_context: 0.1,
            max_age_boost_hours: 24.0,
            age_boost_per_hour: 0.1,
            user_requested_priority: 9,
            default_context_priority: 5,
            context_priorities,
        }
    }
}

impl PriorityConfig {
    /// Sum of the four component weights.
    #[must_use]
    pub fn weight_sum(&self) -> f64 {
        self.weight_quality + self.weight_age + self.weight_user + self.weight_context
    }

    /// Validate weights and tables. Nothing is clamped or auto-corrected.
    pub fn validate(&self) -> Result<(), String> {
        let weights = [
            ("weight_quality", self.weight_quality),
            ("weight_age", self.weight_age),
            ("weight_user", self.weight_user),
            ("weight_context", self.weight_context),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(format!("{name} must be a non-negative number, got {w}"));
            }
        }
        let sum = self.weight_sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(format!("priority weights must sum to 1.0, got {sum}"));
        }
        if !self.max_age_boost_hours.is_finite() || self.max_age_boost_hours < 0.0 {
            return Err("max_age_boost_hours must be non-negative".into());
        }
        if !self.age_boost_per_hour.is_finite() || self.age_boost_per_hour < 0.0 {
            return Err("age_boost_per_hour must be non-negative".into());
        }
        check_priority("user_requested_priority", self.user_requested_priority)?;
        check_priority("default_context_priority", self.default_context_priority)?;
        for (tag, p) in &self.context_priorities {
            check_priority(&format!("context_priorities.{tag}"), *p)?;
        }
        Ok(())
    }
}

pub(crate) fn check_priority(name: &str, value: u8) -> Result<(), String> {
    if (1..=10).contains(&value) {
        Ok(())
    } else {
        Err(format!("{name} must be within 1..=10, got {value}"))
    }
}
