//! Settable telemetry reading.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::resource::{TelemetryReading, TelemetrySource};
use crate::core::SchedulerError;

/// Returns whatever reading was last set, or fails while `failing` is on.
#[derive(Debug)]
pub struct StaticTelemetry {
    reading: Mutex<TelemetryReading>,
    failing: Mutex<bool>,
}

impl StaticTelemetry {
    /// Source reporting `reading` until changed.
    #[must_use]
    pub const fn new(reading: TelemetryReading) -> Self {
        Self {
            reading: Mutex::new(reading),
            failing: Mutex::new(false),
        }
    }

    /// A cool, idle device with `memory_total` units.
    #[must_use]
    pub const fn idle(memory_total: u64) -> Self {
        Self::new(TelemetryReading {
            utilization_pct: 0.0,
            memory_used: 0,
            memory_total,
            temperature_c: 40.0,
        })
    }

    /// Replace the reading.
    pub fn set(&self, reading: TelemetryReading) {
        *self.reading.lock() = reading;
    }

    /// Change only the temperature.
    pub fn set_temperature(&self, temperature_c: f64) {
        self.reading.lock().temperature_c = temperature_c;
    }

    /// Toggle failure mode.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl TelemetrySource for StaticTelemetry {
    async fn sample(&self) -> Result<TelemetryReading, SchedulerError> {
        if *self.failing.lock() {
            return Err(SchedulerError::Backend("telemetry unavailable".into()));
        }
        Ok(*self.reading.lock())
    }
}
