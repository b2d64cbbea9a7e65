//! Resource monitor and capacity ledger configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Boundaries between pressure states on one telemetry axis.
///
/// A value below `optimal` is optimal, below `normal` is normal, below
/// `throttle` is throttled, anything else is critical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Upper bound (exclusive) of the optimal band.
    pub optimal: f64,
    /// Upper bound (exclusive) of the normal band.
    pub normal: f64,
    /// Upper bound (exclusive) of the throttled band.
    pub throttle: f64,
}

impl Thresholds {
    /// Build thresholds from the three boundaries.
    #[must_use]
    pub const fn new(optimal: f64, normal: f64, throttle: f64) -> Self {
        Self {
            optimal,
            normal,
            throttle,
        }
    }

    /// Default temperature boundaries in °C.
    #[must_use]
    pub const fn temperature() -> Self {
        Self::new(65.0, 75.0, 85.0)
    }

    /// Default memory-usage boundaries in percent.
    #[must_use]
    pub const fn memory() -> Self {
        Self::new(70.0, 85.0, 95.0)
    }

    /// Validate ordering. Inverted thresholds are rejected, not reordered.
    pub fn validate(&self, name: &str) -> Result<(), String> {
        if !(self.optimal.is_finite() && self.normal.is_finite() && self.throttle.is_finite()) {
            return Err(format!("{name}: thresholds must be finite"));
        }
        if !(self.optimal < self.normal && self.normal < self.throttle) {
            return Err(format!(
                "{name}: thresholds must satisfy optimal < normal < throttle, got {}/{}/{}",
                self.optimal, self.normal, self.throttle
            ));
        }
        Ok(())
    }
}

/// Resource monitor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Identifier of the monitored device.
    pub device_id: String,
    /// Temperature thresholds in °C.
    pub temp_thresholds: Thresholds,
    /// Memory usage thresholds in percent.
    pub memory_thresholds: Thresholds,
    /// Capacity of the ledger (e.g. MiB of accelerator memory).
    pub memory_limit: u64,
    /// Amount always held back from allocation.
    pub memory_reserve: u64,
    /// Sampling interval in milliseconds.
    pub sample_interval_ms: u64,
    /// Consecutive better samples required before the state improves.
    pub hysteresis_samples: u32,
    /// Missed ticks after which the last snapshot is stale and the state unavailable.
    pub stale_after_missed_ticks: u32,
    /// Snapshots retained for trend queries.
    pub history_capacity: usize,
    /// Absolute slope (units per minute) under which a trend counts as stable.
    pub trend_stable_slope_per_min: f64,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            device_id: "gpu0".into(),
            temp_thresholds: Thresholds::temperature(),
            memory_thresholds: Thresholds::memory(),
            memory_limit: 6_144,
            memory_reserve: 512,
            sample_interval_ms: 3_000,
            hysteresis_samples: 3,
            stale_after_missed_ticks: 3,
            history_capacity: 200,
            trend_stable_slope_per_min: 0.5,
        }
    }
}

impl ResourceConfig {
    /// Sampling interval.
    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Validate thresholds, ledger bounds, and loop timing.
    pub fn validate(&self) -> Result<(), String> {
        self.temp_thresholds.validate("temp_thresholds")?;
        self.memory_thresholds.validate("memory_thresholds")?;
        if self.memory_thresholds.optimal < 0.0 || self.memory_thresholds.throttle > 100.0 {
            return Err("memory_thresholds must lie within 0..=100 percent".into());
        }
        if self.memory_limit == 0 {
            return Err("memory_limit must be greater than 0".into());
        }
        if self.memory_reserve > self.memory_limit {
            return Err(format!(
                "memory_reserve ({}) must not exceed memory_limit ({})",
                self.memory_reserve, self.memory_limit
            ));
        }
        if self.sample_interval_ms == 0 {
            return Err("sample_interval_ms must be greater than 0".into());
        }
        if self.hysteresis_samples == 0 {
            return Err("hysteresis_samples must be greater than 0".into());
        }
        if self.stale_after_missed_ticks == 0 {
            return Err("stale_after_missed_ticks must be greater than 0".into());
        }
        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".into());
        }
        if !self.trend_stable_slope_per_min.is_finite() || self.trend_stable_slope_per_min < 0.0 {
            return Err("trend_stable_slope_per_min must be non-negative".into());
        }
        Ok(())
    }
}
