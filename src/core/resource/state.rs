//! Discrete pressure states and the classification applied to telemetry.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::Thresholds;

/// Device pressure, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceState {
    /// Plenty of headroom.
    Optimal,
    /// Normal load.
    Normal,
    /// Under pressure; admitted work is scaled down.
    Throttled,
    /// No new work is admitted.
    Critical,
    /// No usable telemetry; treated as critical.
    Unavailable,
}

impl ResourceState {
    /// Fraction of normal dispatch cost permitted in this state.
    #[must_use]
    pub const fn throttle_multiplier(self) -> f64 {
        match self {
            Self::Optimal => 1.0,
            Self::Normal => 0.8,
            Self::Throttled => 0.5,
            Self::Critical | Self::Unavailable => 0.0,
        }
    }

    /// Smallest multiplier under which work is still admitted.
    ///
    /// A job whose cost does not fit the ledger even at this multiplier can
    /// never run.
    #[must_use]
    pub const fn lowest_admitting_multiplier() -> f64 {
        Self::Throttled.throttle_multiplier()
    }

    /// Whether admission is paused entirely.
    #[must_use]
    pub const fn blocks_admission(self) -> bool {
        matches!(self, Self::Critical | Self::Unavailable)
    }

    /// Uppercase name used in logs and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "OPTIMAL",
            Self::Normal => "NORMAL",
            Self::Throttled => "THROTTLED",
            Self::Critical => "CRITICAL",
            Self::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one axis. Non-finite readings are unavailable.
#[must_use]
pub fn classify_axis(value: f64, thresholds: &Thresholds) -> ResourceState {
    if !value.is_finite() {
        ResourceState::Unavailable
    } else if value < thresholds.optimal {
        ResourceState::Optimal
    } else if value < thresholds.normal {
        ResourceState::Normal
    } else if value < thresholds.throttle {
        ResourceState::Throttled
    } else {
        ResourceState::Critical
    }
}

/// Combined state: the worse of the temperature and memory axes.
#[must_use]
pub fn classify(
    temperature_c: f64,
    memory_percent: f64,
    temp_thresholds: &Thresholds,
    memory_thresholds: &Thresholds,
) -> ResourceState {
    classify_axis(temperature_c, temp_thresholds).max(classify_axis(memory_percent, memory_thresholds))
}
