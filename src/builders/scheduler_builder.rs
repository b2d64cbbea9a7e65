//! Assemble a [`JobScheduler`] from configuration and collaborators.

use std::sync::Arc;

use crate::config::SchedulerConfig;
use crate::core::events::{EventSink, TracingEventSink};
use crate::core::repository::JobRepository;
use crate::core::resource::TelemetrySource;
use crate::core::{JobExecutor, JobScheduler, SchedulerError};
use crate::infra::repository::InMemoryJobRepository;

/// Builder for [`JobScheduler`].
///
/// Only the executor and a telemetry source are required. Defaults are the
/// default configuration, an in-memory repository, and a tracing event sink.
///
/// ```rust,ignore
/// let scheduler = SchedulerBuilder::new(executor)
///     .config(SchedulerConfig::load()?)
///     .telemetry(Arc::new(StaticTelemetry::idle(8_192)))
///     .build()?;
/// scheduler.start();
/// ```
pub struct SchedulerBuilder<E: JobExecutor> {
    executor: E,
    config: SchedulerConfig,
    telemetry: Option<Arc<dyn TelemetrySource>>,
    repository: Option<Arc<dyn JobRepository>>,
    events: Option<Arc<dyn EventSink>>,
}

impl<E: JobExecutor> SchedulerBuilder<E> {
    /// Start a builder around `executor`.
    #[must_use]
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            config: SchedulerConfig::default(),
            telemetry: None,
            repository: None,
            events: None,
        }
    }

    /// Use `config` instead of the defaults.
    #[must_use]
    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the number of dispatch workers.
    #[must_use]
    pub const fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.config.dispatcher.worker_count = worker_count;
        self
    }

    /// Telemetry source sampled by the resource monitor.
    #[must_use]
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySource>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Job repository.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Event sink.
    #[must_use]
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and build the scheduler.
    pub fn build(self) -> Result<JobScheduler<E>, SchedulerError> {
        let telemetry = self
            .telemetry
            .ok_or_else(|| SchedulerError::InvalidConfig("a telemetry source is required".into()))?;
        let repository = self
            .repository
            .unwrap_or_else(|| Arc::new(InMemoryJobRepository::new()));
        let events = self.events.unwrap_or_else(|| Arc::new(TracingEventSink));
        JobScheduler::new(self.config, self.executor, telemetry, repository, events)
    }
}
