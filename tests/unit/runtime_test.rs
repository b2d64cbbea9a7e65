//! Tests for API request/response models

use std::collections::BTreeMap;

use prometheus_job_scheduler::config::{BackoffStrategy, RetryPolicy};
use prometheus_job_scheduler::core::{
    DispatchStats, Job, JobStatus, QueueDistribution, QueueStatus,
};
use prometheus_job_scheduler::runtime::{JobStatusResponse, JobSubmission, QueueStatusResponse};

#[test]
fn test_submission_defaults() {
    let req: JobSubmission = serde_json::from_str(r#"{"work_item_id": "IMG_0001.CR3"}"#).unwrap();
    let job = req.into_job(1_000, &RetryPolicy::default().with_max_retries(4));
    assert_eq!(job.work_item_id, "IMG_0001.CR3");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.max_retries, 4);
    assert_eq!(job.created_at_ms, 1_000);
    assert!(job.retry_policy.is_none());
    assert!(job.session_id.is_none());
}

#[test]
fn test_submission_overrides() {
    let req: JobSubmission = serde_json::from_str(
        r#"{
            "work_item_id": "IMG_0002.CR3",
            "quality_score": 4.5,
            "user_requested": true,
            "context": "portrait",
            "session_id": "shoot-3",
            "priority": 7,
            "estimated_resource_cost": 900,
            "max_retries": 1,
            "retry_policy": {"strategy": "fixed", "max_retries": 6, "initial_delay_ms": 10}
        }"#,
    )
    .unwrap();
    let job = req.into_job(0, &RetryPolicy::default());
    assert_eq!(job.session_id.as_deref(), Some("shoot-3"));
    assert_eq!(job.estimated_resource_cost, 900);
    assert_eq!(job.max_retries, 1);
    let policy = job.retry_policy.as_ref().unwrap();
    assert_eq!(policy.strategy, BackoffStrategy::Fixed);
    assert_eq!(policy.max_retries, 6);
}

#[test]
fn test_job_status_response() {
    let mut job = Job::new("IMG_0003.CR3", 0);
    job.last_error = Some("io error: disk busy".into());
    job.retry_count = 2;
    let resp = JobStatusResponse::from(&job);
    assert_eq!(resp.job_id, job.id);
    assert_eq!(resp.retry_count, 2);
    assert_eq!(resp.reason.as_deref(), Some("io error: disk busy"));

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["status"], "pending");
}

#[test]
fn test_queue_status_response() {
    let mut by_priority = BTreeMap::new();
    by_priority.insert(9, 2);
    by_priority.insert(4, 1);
    let status = QueueStatus {
        distribution: QueueDistribution {
            pending: 3,
            in_flight: 1,
            by_priority: by_priority.clone(),
            average_priority: 22.0 / 3.0,
            oldest_pending_age_hours: Some(1.5),
        },
        dispatch: DispatchStats {
            completed: 7,
            failed: 2,
            ..DispatchStats::default()
        },
    };
    let resp = QueueStatusResponse::from(status);
    assert_eq!(resp.pending, 3);
    assert_eq!(resp.in_flight, 1);
    assert_eq!(resp.by_priority, by_priority);
    assert_eq!(resp.completed, 7);
    assert_eq!(resp.failed, 2);
    assert_eq!(resp.oldest_pending_age_hours, Some(1.5));
}
