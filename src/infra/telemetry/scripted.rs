//! Replays a fixed sequence of readings.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::resource::{TelemetryReading, TelemetrySource};
use crate::core::SchedulerError;

/// Yields each scripted result once, in order, then fails.
#[derive(Debug)]
pub struct ScriptedTelemetry {
    script: Mutex<VecDeque<Result<TelemetryReading, SchedulerError>>>,
}

impl ScriptedTelemetry {
    /// Source replaying `script`.
    #[must_use]
    pub fn new(script: impl IntoIterator<Item = Result<TelemetryReading, SchedulerError>>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
        }
    }

    /// Append one more result.
    pub fn push(&self, next: Result<TelemetryReading, SchedulerError>) {
        self.script.lock().push_back(next);
    }

    /// Results not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }
}

#[async_trait]
impl TelemetrySource for ScriptedTelemetry {
    async fn sample(&self) -> Result<TelemetryReading, SchedulerError> {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(SchedulerError::Backend("telemetry script exhausted".into())))
    }
}
