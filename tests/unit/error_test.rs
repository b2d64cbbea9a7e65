//! Tests for error types

use prometheus_job_scheduler::core::{ExecutionError, JobStatus, SchedulerError};

#[test]
fn test_queue_full_error() {
    let err = SchedulerError::QueueFull("max depth 10 reached".to_string());
    assert_eq!(format!("{}", err), "queue full: max depth 10 reached");
}

#[test]
fn test_resource_exhausted_error() {
    let err = SchedulerError::ResourceExhausted {
        requested: 1_024,
        available: 512,
    };
    assert_eq!(
        format!("{}", err),
        "resource exhausted: requested 1024, available 512"
    );
}

#[test]
fn test_invalid_transition_error() {
    let id = uuid::Uuid::nil();
    let err = SchedulerError::InvalidTransition {
        job_id: id,
        from: JobStatus::Completed,
        to: JobStatus::Running,
    };
    assert_eq!(
        format!("{}", err),
        format!("invalid transition for job {id}: Completed -> Running")
    );
}

#[test]
fn test_backend_error() {
    let err = SchedulerError::Backend("nvml unavailable".to_string());
    assert_eq!(format!("{}", err), "backend error: nvml unavailable");
}

#[test]
fn test_execution_error_messages() {
    assert_eq!(
        ExecutionError::ResourceExhausted("vram".into()).to_string(),
        "resource exhausted: vram"
    );
    assert_eq!(ExecutionError::Io("disk busy".into()).to_string(), "io error: disk busy");
    assert_eq!(ExecutionError::Timeout("30s".into()).to_string(), "timeout: 30s");
    assert_eq!(
        ExecutionError::Validation("bad header".into()).to_string(),
        "validation failed: bad header"
    );
    assert_eq!(
        ExecutionError::Config("no model".into()).to_string(),
        "configuration error: no model"
    );
    assert_eq!(ExecutionError::Other("boom".into()).to_string(), "boom");
}

#[test]
fn test_execution_error_serializes() {
    let err = ExecutionError::Timeout("inference took too long".into());
    let json = serde_json::to_string(&err).unwrap();
    let back: ExecutionError = serde_json::from_str(&json).unwrap();
    assert_eq!(back, err);
}
