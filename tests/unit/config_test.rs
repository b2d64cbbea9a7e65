//! Tests for configuration validation

use prometheus_job_scheduler::config::{
    BackoffStrategy, PriorityConfig, ResourceConfig, RetryPolicy, SchedulerConfig, Thresholds,
};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.starvation.starvation_floor_priority, 8);
    assert!((cfg.starvation.starvation_threshold_hours - 12.0).abs() < f64::EPSILON);
    assert_eq!(cfg.resources.memory_limit, 6_144);
    assert_eq!(cfg.resources.memory_reserve, 512);
    assert_eq!(cfg.retry_defaults.max_retries, 3);
    assert_eq!(cfg.retry_defaults.strategy, BackoffStrategy::Exponential);
}

#[test]
fn test_priority_weights_must_sum_to_one() {
    let mut cfg = PriorityConfig::default();
    cfg.weight_quality = 0.5;
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("sum to 1.0"), "{err}");

    let mut cfg = PriorityConfig::default();
    cfg.weight_age = -0.1;
    cfg.weight_quality = 0.8;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_context_priority_out_of_range() {
    let mut cfg = PriorityConfig::default();
    cfg.context_priorities.insert("birthday".into(), 11);
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("context_priorities.birthday"), "{err}");
}

#[test]
fn test_inverted_thresholds_rejected() {
    let mut cfg = ResourceConfig::default();
    cfg.temp_thresholds = Thresholds::new(80.0, 75.0, 85.0);
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("temp_thresholds"), "{err}");
}

#[test]
fn test_reserve_must_not_exceed_limit() {
    let mut cfg = ResourceConfig::default();
    cfg.memory_limit = 1_024;
    cfg.memory_reserve = 2_048;
    assert!(cfg.validate().is_err());

    cfg.memory_reserve = 1_024;
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_retry_policy_validation() {
    let mut policy = RetryPolicy::default();
    policy.initial_delay_ms = 120_000;
    assert!(policy.validate().is_err());

    let mut policy = RetryPolicy::default();
    policy.multiplier = 0.5;
    assert!(policy.validate().is_err());

    assert!(RetryPolicy::immediate(0).validate().is_ok());
}

#[test]
fn test_scheduler_config_prefixes_section() {
    let mut cfg = SchedulerConfig::default();
    cfg.dispatcher.worker_count = 0;
    let err = cfg.validate().unwrap_err();
    assert!(err.starts_with("dispatcher invalid:"), "{err}");
}

#[test]
fn test_from_json_str_partial_document() {
    let cfg = SchedulerConfig::from_json_str(
        r#"{
            "resources": { "memory_limit": 8192, "device_id": "gpu1" },
            "retry_defaults": { "strategy": "LINEAR", "max_retries": 5 },
            "dispatcher": { "worker_count": 3 }
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.resources.memory_limit, 8_192);
    assert_eq!(cfg.resources.device_id, "gpu1");
    assert_eq!(cfg.resources.memory_reserve, 512);
    assert_eq!(cfg.retry_defaults.strategy, BackoffStrategy::Linear);
    assert_eq!(cfg.retry_defaults.max_retries, 5);
    assert_eq!(cfg.dispatcher.worker_count, 3);
}

#[test]
fn test_from_json_str_rejects_invalid() {
    let err = SchedulerConfig::from_json_str(r#"{"priority": {"weight_user": 0.9}}"#).unwrap_err();
    assert!(err.starts_with("priority invalid:"), "{err}");

    let err = SchedulerConfig::from_json_str("not json").unwrap_err();
    assert!(err.starts_with("parse error:"), "{err}");
}

#[test]
fn test_from_json_file_missing() {
    let err = SchedulerConfig::from_json_file("/nonexistent/scheduler.json").unwrap_err();
    assert!(err.to_string().contains("reading scheduler config"));
}
