//! Telemetry sampling loop, hysteresis, snapshot history, and trend queries.
//!
//! Snapshots are immutable `Arc`s published through a `tokio::sync::watch`
//! channel, so readers never wait on the sampler. The history ring buffer and
//! the hysteresis tracker each have their own short-lived lock; neither is
//! held across the telemetry `await`.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ledger::MemoryLedger;
use super::state::{classify, ResourceState};
use crate::config::ResourceConfig;
use crate::core::events::{EventSink, SchedulerEvent};
use crate::core::SchedulerError;
use crate::util::clock::now_ms;

/// Raw values reported by a telemetry source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// Compute utilization in percent.
    pub utilization_pct: f64,
    /// Memory in use.
    pub memory_used: u64,
    /// Total device memory.
    pub memory_total: u64,
    /// Temperature in °C.
    pub temperature_c: f64,
}

impl TelemetryReading {
    /// Memory usage in percent; NaN when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total == 0 {
            f64::NAN
        } else {
            self.memory_used as f64 / self.memory_total as f64 * 100.0
        }
    }
}

/// Source of hardware telemetry, sampled once per monitor tick.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Take one reading.
    async fn sample(&self) -> Result<TelemetryReading, SchedulerError>;
}

/// Immutable view of the device at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Monitored device.
    pub device_id: String,
    /// Compute utilization in percent.
    pub utilization_pct: f64,
    /// Memory in use.
    pub memory_used: u64,
    /// Total device memory.
    pub memory_total: u64,
    /// Temperature in °C.
    pub temperature_c: f64,
    /// Effective state after hysteresis.
    pub state: ResourceState,
    /// State the raw reading classified as.
    pub observed_state: ResourceState,
    /// Multiplier for the effective state.
    pub throttle_multiplier: f64,
    /// When the underlying reading was taken (ms since epoch).
    pub sampled_at_ms: u128,
    /// The reading is older than the staleness limit.
    pub stale: bool,
}

impl ResourceSnapshot {
    /// Placeholder published before any telemetry arrives.
    #[must_use]
    pub fn unavailable(device_id: impl Into<String>, at_ms: u128) -> Self {
        Self {
            device_id: device_id.into(),
            utilization_pct: 0.0,
            memory_used: 0,
            memory_total: 0,
            temperature_c: 0.0,
            state: ResourceState::Unavailable,
            observed_state: ResourceState::Unavailable,
            throttle_multiplier: 0.0,
            sampled_at_ms: at_ms,
            stale: true,
        }
    }

    /// Memory usage in percent; NaN when the total is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn memory_percent(&self) -> f64 {
        if self.memory_total == 0 {
            f64::NAN
        } else {
            self.memory_used as f64 / self.memory_total as f64 * 100.0
        }
    }

    fn degraded(&self) -> Self {
        Self {
            state: ResourceState::Unavailable,
            observed_state: ResourceState::Unavailable,
            throttle_multiplier: 0.0,
            stale: true,
            ..self.clone()
        }
    }
}

/// Metric a trend can be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    /// Temperature in °C.
    Temperature,
    /// Memory usage in percent.
    MemoryPercent,
    /// Compute utilization in percent.
    Utilization,
}

impl TrendMetric {
    fn value(self, snapshot: &ResourceSnapshot) -> f64 {
        match self {
            Self::Temperature => snapshot.temperature_c,
            Self::MemoryPercent => snapshot.memory_percent(),
            Self::Utilization => snapshot.utilization_pct,
        }
    }
}

/// Monotonic direction of a metric over a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// Slope above the stability band.
    Rising,
    /// Slope below the stability band.
    Falling,
    /// Slope within the stability band.
    Stable,
}

/// Statistics for one metric over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    /// Metric summarized.
    pub metric: TrendMetric,
    /// Samples in the window.
    pub samples: usize,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Mean value.
    pub mean: f64,
    /// Least-squares slope in units per minute.
    pub slope_per_min: f64,
    /// Classified direction.
    pub direction: TrendDirection,
}

#[derive(Debug, Default)]
struct StateTracker {
    current: Option<ResourceState>,
    improving_streak: u32,
    improving_worst: Option<ResourceState>,
    missed_ticks: u32,
    last_good: Option<Arc<ResourceSnapshot>>,
}

impl StateTracker {
    /// Feed one observed state and return the effective state.
    ///
    /// Worse (or equal) observations apply at once and reset the streak.
    /// Better ones must repeat `required` times in a row; the worst state seen
    /// during that streak is adopted.
    fn observe(&mut self, observed: ResourceState, required: u32) -> ResourceState {
        match self.current {
            Some(current) if current != ResourceState::Unavailable && observed < current => {
                self.improving_streak += 1;
                let worst = self.improving_worst.map_or(observed, |w| w.max(observed));
                self.improving_worst = Some(worst);
                if self.improving_streak >= required {
                    self.reset_streak();
                    self.current = Some(worst);
                }
            }
            _ => {
                self.reset_streak();
                self.current = Some(observed);
            }
        }
        self.current.unwrap_or(observed)
    }

    fn reset_streak(&mut self) {
        self.improving_streak = 0;
        self.improving_worst = None;
    }
}

/// Samples telemetry, derives pressure state, and owns the capacity ledger.
pub struct ResourceMonitor {
    config: ResourceConfig,
    source: Arc<dyn TelemetrySource>,
    ledger: MemoryLedger,
    latest: watch::Sender<Arc<ResourceSnapshot>>,
    history: Mutex<VecDeque<Arc<ResourceSnapshot>>>,
    tracker: Mutex<StateTracker>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("device_id", &self.config.device_id)
            .field("state", &self.latest().state)
            .field("ledger", &self.ledger)
            .finish_non_exhaustive()
    }
}

impl ResourceMonitor {
    /// Create a monitor. The initial snapshot is unavailable until the first tick.
    pub fn new(
        config: ResourceConfig,
        source: Arc<dyn TelemetrySource>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let ledger = MemoryLedger::new(config.memory_limit, config.memory_reserve)?;
        let initial = Arc::new(ResourceSnapshot::unavailable(&config.device_id, now_ms()));
        let (latest, _) = watch::channel(initial);
        Ok(Self {
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity)),
            config,
            source,
            ledger,
            latest,
            tracker: Mutex::new(StateTracker::default()),
            events,
        })
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ResourceConfig {
        &self.config
    }

    /// Capacity ledger for the monitored resource.
    #[must_use]
    pub const fn ledger(&self) -> &MemoryLedger {
        &self.ledger
    }

    /// Most recently published snapshot.
    #[must_use]
    pub fn latest(&self) -> Arc<ResourceSnapshot> {
        Arc::clone(&self.latest.borrow())
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ResourceSnapshot>> {
        self.latest.subscribe()
    }

    /// Retained snapshots, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Arc<ResourceSnapshot>> {
        self.history.lock().iter().cloned().collect()
    }

    /// Sample once now.
    pub async fn tick(&self) -> Arc<ResourceSnapshot> {
        self.tick_at(now_ms()).await
    }

    /// Sample once, stamping the reading with `at_ms`.
    ///
    /// A source that does not answer within one sample interval counts as a
    /// failed sample.
    pub async fn tick_at(&self, at_ms: u128) -> Arc<ResourceSnapshot> {
        let limit = self.config.sample_interval();
        let reading = match tokio::time::timeout(limit, self.source.sample()).await {
            Ok(reading) => reading,
            Err(_) => Err(SchedulerError::Backend(format!(
                "telemetry sample timed out after {} ms",
                limit.as_millis()
            ))),
        };
        let previous = self.latest();

        let snapshot = {
            let mut tracker = self.tracker.lock();
            match reading {
                Ok(reading) => {
                    tracker.missed_ticks = 0;
                    let observed = classify(
                        reading.temperature_c,
                        reading.memory_percent(),
                        &self.config.temp_thresholds,
                        &self.config.memory_thresholds,
                    );
                    let state = tracker.observe(observed, self.config.hysteresis_samples);
                    let snapshot = Arc::new(ResourceSnapshot {
                        device_id: self.config.device_id.clone(),
                        utilization_pct: reading.utilization_pct,
                        memory_used: reading.memory_used,
                        memory_total: reading.memory_total,
                        temperature_c: reading.temperature_c,
                        state,
                        observed_state: observed,
                        throttle_multiplier: state.throttle_multiplier(),
                        sampled_at_ms: at_ms,
                        stale: false,
                    });
                    tracker.last_good = Some(Arc::clone(&snapshot));
                    snapshot
                }
                Err(err) => {
                    tracker.missed_ticks += 1;
                    warn!(
                        device_id = %self.config.device_id,
                        missed = tracker.missed_ticks,
                        error = %err,
                        "telemetry sample failed"
                    );
                    let exhausted = tracker.missed_ticks >= self.config.stale_after_missed_ticks;
                    match tracker.last_good.clone() {
                        Some(_) if !exhausted => return previous,
                        Some(last) if previous.stale && last.sampled_at_ms == previous.sampled_at_ms => {
                            return previous;
                        }
                        Some(last) => {
                            tracker.reset_streak();
                            tracker.current = Some(ResourceState::Unavailable);
                            Arc::new(last.degraded())
                        }
                        None => {
                            tracker.current = Some(ResourceState::Unavailable);
                            Arc::new(ResourceSnapshot::unavailable(&self.config.device_id, at_ms))
                        }
                    }
                }
            }
        };

        self.publish(&previous, &snapshot);
        snapshot
    }

    fn publish(&self, previous: &ResourceSnapshot, snapshot: &Arc<ResourceSnapshot>) {
        {
            let mut history = self.history.lock();
            if history.len() >= self.config.history_capacity {
                history.pop_front();
            }
            history.push_back(Arc::clone(snapshot));
        }
        self.latest.send_replace(Arc::clone(snapshot));

        if previous.state == snapshot.state {
            debug!(
                state = %snapshot.state,
                temperature = snapshot.temperature_c,
                memory_pct = snapshot.memory_percent(),
                "resource sample"
            );
            return;
        }
        info!(
            device_id = %snapshot.device_id,
            from = %previous.state,
            to = %snapshot.state,
            multiplier = snapshot.throttle_multiplier,
            "resource state changed"
        );
        self.events.publish(SchedulerEvent::ResourceStateChanged {
            device_id: snapshot.device_id.clone(),
            from: previous.state,
            to: snapshot.state,
            throttle_multiplier: snapshot.throttle_multiplier,
            at_ms: snapshot.sampled_at_ms,
        });
    }

    /// Summary of `metric` over the `window` ending at `now_ms`. Stale snapshots are skipped.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn trend(&self, metric: TrendMetric, window: Duration, now_ms: u128) -> Option<TrendSummary> {
        let start = now_ms.saturating_sub(window.as_millis());
        let points: Vec<(f64, f64)> = {
            let history = self.history.lock();
            let in_window: Vec<&Arc<ResourceSnapshot>> = history
                .iter()
                .filter(|s| !s.stale && s.sampled_at_ms >= start && s.sampled_at_ms <= now_ms)
                .collect();
            let origin = in_window.first()?.sampled_at_ms;
            in_window
                .iter()
                .map(|s| ((s.sampled_at_ms - origin) as f64 / 60_000.0, metric.value(s)))
                .filter(|(_, v)| v.is_finite())
                .collect()
        };
        if points.is_empty() {
            return None;
        }

        let n = points.len() as f64;
        let (min, max, sum) = points.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(lo, hi, sum), &(_, v)| (lo.min(v), hi.max(v), sum + v),
        );
        let mean = sum / n;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let (num, den) = points.iter().fold((0.0, 0.0), |(num, den), &(x, y)| {
            let dx = x - mean_x;
            (num + dx * (y - mean), den + dx * dx)
        });
        let slope_per_min = if den > 0.0 { num / den } else { 0.0 };
        let eps = self.config.trend_stable_slope_per_min;
        let direction = if slope_per_min > eps {
            TrendDirection::Rising
        } else if slope_per_min < -eps {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        };
        Some(TrendSummary {
            metric,
            samples: points.len(),
            min,
            max,
            mean,
            slope_per_min,
            direction,
        })
    }

    /// Sampling loop; ticks on the configured interval until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.sample_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            device_id = %self.config.device_id,
            interval_ms = self.config.sample_interval_ms,
            "resource monitor started"
        );
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(device_id = %self.config.device_id, "resource monitor stopped");
    }

    /// Spawn [`run`](Self::run) on the current tokio runtime.
    #[must_use]
    pub fn spawn(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run(shutdown))
    }
}
