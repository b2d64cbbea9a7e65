//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use prometheus_job_scheduler::builders::SchedulerBuilder;
use prometheus_job_scheduler::config::SchedulerConfig;
use prometheus_job_scheduler::core::{
    ExecutionContext, ExecutionError, Job, JobExecutor, SchedulerError,
};
use prometheus_job_scheduler::infra::StaticTelemetry;

#[derive(Clone)]
struct NoopExecutor;

#[async_trait]
impl JobExecutor for NoopExecutor {
    async fn execute(
        &self,
        _job: &Job,
        _ctx: ExecutionContext,
    ) -> Result<serde_json::Value, ExecutionError> {
        Ok(serde_json::Value::Null)
    }
}

#[test]
fn test_builder_requires_telemetry() {
    let err = SchedulerBuilder::new(NoopExecutor).build().unwrap_err();
    assert!(matches!(err, SchedulerError::InvalidConfig(_)));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut cfg = SchedulerConfig::default();
    cfg.resources.memory_limit = 0;
    let err = SchedulerBuilder::new(NoopExecutor)
        .config(cfg)
        .telemetry(Arc::new(StaticTelemetry::idle(8_192)))
        .build()
        .unwrap_err();
    match err {
        SchedulerError::InvalidConfig(msg) => assert!(msg.starts_with("resources invalid:"), "{msg}"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_builder_worker_count_override() {
    let scheduler = SchedulerBuilder::new(NoopExecutor)
        .with_worker_count(6)
        .telemetry(Arc::new(StaticTelemetry::idle(8_192)))
        .build()
        .unwrap();
    assert_eq!(scheduler.config().dispatcher.worker_count, 6);
    assert_eq!(scheduler.get_resource_status().capacity, 6_144 - 512);
}
