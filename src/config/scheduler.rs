//! Root scheduler configuration.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use super::priority::{check_priority, PriorityConfig};
use super::resources::ResourceConfig;
use super::retry::RetryPolicy;
use crate::core::AppResult;

/// Environment variable naming a JSON configuration file.
pub const CONFIG_PATH_ENV: &str = "SCHEDULER_CONFIG";
/// Environment variable overriding the dispatcher worker count.
pub const WORKER_COUNT_ENV: &str = "SCHEDULER_WORKER_COUNT";

/// Starvation detection and periodic boosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StarvationConfig {
    /// Pending time after which a job counts as starving.
    pub starvation_threshold_hours: f64,
    /// Priority starving jobs are raised to.
    pub starvation_floor_priority: u8,
    /// Interval between automatic starvation passes in seconds.
    pub check_interval_secs: u64,
}

impl Default for StarvationConfig {
    fn default() -> Self {
        Self {
            starvation_threshold_hours: 12.0,
            starvation_floor_priority: 8,
            check_interval_secs: 30 * 60,
        }
    }
}

impl StarvationConfig {
    /// Interval between automatic starvation passes.
    #[must_use]
    pub const fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Validate starvation settings.
    pub fn validate(&self) -> Result<(), String> {
        if !self.starvation_threshold_hours.is_finite() || self.starvation_threshold_hours <= 0.0 {
            return Err("starvation_threshold_hours must be greater than 0".into());
        }
        check_priority("starvation_floor_priority", self.starvation_floor_priority)?;
        if self.check_interval_secs == 0 {
            return Err("check_interval_secs must be greater than 0".into());
        }
        Ok(())
    }
}

/// Dispatcher worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Number of concurrent dispatch workers.
    pub worker_count: usize,
    /// Pause while the device is critical or unavailable, in milliseconds.
    pub cooldown_ms: u64,
    /// Pause when the queue is empty or nothing could be admitted, in milliseconds.
    pub idle_poll_ms: u64,
    /// Jobs a worker may pull past when the ledger cannot fit them.
    pub max_admission_scan: usize,
    /// Interval between rebalance passes in seconds.
    pub rebalance_interval_secs: u64,
    /// Maximum pending jobs before submissions are rejected.
    pub max_queue_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get().clamp(1, 4),
            cooldown_ms: 5_000,
            idle_poll_ms: 250,
            max_admission_scan: 8,
            rebalance_interval_secs: 60 * 60,
            max_queue_depth: 10_000,
        }
    }
}

impl DispatcherConfig {
    /// Cooldown while admission is blocked.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Pause when idle.
    #[must_use]
    pub const fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Interval between rebalance passes.
    #[must_use]
    pub const fn rebalance_interval(&self) -> Duration {
        Duration::from_secs(self.rebalance_interval_secs)
    }

    /// Validate dispatcher values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_count == 0 {
            return Err("worker_count must be greater than 0".into());
        }
        if self.cooldown_ms == 0 {
            return Err("cooldown_ms must be greater than 0".into());
        }
        if self.idle_poll_ms == 0 {
            return Err("idle_poll_ms must be greater than 0".into());
        }
        if self.max_admission_scan == 0 {
            return Err("max_admission_scan must be greater than 0".into());
        }
        if self.rebalance_interval_secs == 0 {
            return Err("rebalance_interval_secs must be greater than 0".into());
        }
        if self.max_queue_depth == 0 {
            return Err("max_queue_depth must be greater than 0".into());
        }
        Ok(())
    }
}

/// Root scheduler configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Priority formula.
    pub priority: PriorityConfig,
    /// Starvation handling.
    pub starvation: StarvationConfig,
    /// Resource monitor and ledger.
    pub resources: ResourceConfig,
    /// Default retry policy for jobs without their own.
    pub retry_defaults: RetryPolicy,
    /// Dispatcher workers.
    pub dispatcher: DispatcherConfig,
}

impl SchedulerConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.priority
            .validate()
            .map_err(|e| format!("priority invalid: {e}"))?;
        self.starvation
            .validate()
            .map_err(|e| format!("starvation invalid: {e}"))?;
        self.resources
            .validate()
            .map_err(|e| format!("resources invalid: {e}"))?;
        self.retry_defaults
            .validate()
            .map_err(|e| format!("retry_defaults invalid: {e}"))?;
        self.dispatcher
            .validate()
            .map_err(|e| format!("dispatcher invalid: {e}"))?;
        Ok(())
    }

    /// Parse scheduler configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read, parse, and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading scheduler config {}", path.display()))?;
        Self::from_json_str(&raw).map_err(|e| anyhow::anyhow!("{}: {e}", path.display()))
    }

    /// Load configuration from the environment.
    ///
    /// Reads `.env` if present, then the file named by `SCHEDULER_CONFIG`
    /// (defaults otherwise), then applies `SCHEDULER_WORKER_COUNT`.
    pub fn load() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let mut cfg = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_json_file(path)?,
            Err(_) => Self::default(),
        };
        if let Ok(raw) = std::env::var(WORKER_COUNT_ENV) {
            cfg.dispatcher.worker_count = raw
                .trim()
                .parse()
                .with_context(|| format!("{WORKER_COUNT_ENV} must be an integer, got {raw:?}"))?;
        }
        cfg.validate().map_err(anyhow::Error::msg)?;
        tracing::debug!(
            workers = cfg.dispatcher.worker_count,
            memory_limit = cfg.resources.memory_limit,
            "scheduler configuration loaded"
        );
        Ok(cfg)
    }
}
