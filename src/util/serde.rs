//! Shared serializable identifiers and value types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier of a scheduled job.
pub type JobId = uuid::Uuid;

/// Opaque reference to the unit of work a job processes (e.g. a photo id).
pub type WorkItemId = String;

/// Resource units (e.g. MiB of accelerator memory).
pub type ResourceUnits = u64;

/// Job priority in the inclusive range `1..=10`. Higher runs first.
///
/// Construction always clips into range, so a `Priority` value is valid by
/// construction regardless of where the raw number came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "u8")]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority.
    pub const MIN: Self = Self(1);
    /// Highest priority.
    pub const MAX: Self = Self(10);
    /// Neutral priority used when nothing else is known.
    pub const NEUTRAL: Self = Self(5);

    /// Build a priority, clipping into `1..=10`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn new(value: i64) -> Self {
        Self(value.clamp(1, 10) as u8)
    }

    /// Round and clip a fractional score. Non-finite scores map to `MIN`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_score(score: f64) -> Self {
        if !score.is_finite() {
            return Self::MIN;
        }
        // Nudge so sums like 9.4999999 from float weights still round up.
        let rounded = (score.clamp(1.0, 10.0) + 1e-9).round();
        Self::new(rounded as i64)
    }

    /// Raw value in `1..=10`.
    #[must_use]
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Add `delta`, clipped to `MAX`. Never lowers the priority.
    #[must_use]
    pub fn saturating_boost(self, delta: u8) -> Self {
        Self::new(i64::from(self.0) + i64::from(delta))
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl From<i64> for Priority {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
