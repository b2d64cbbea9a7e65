//! Tests for utility functions

use prometheus_job_scheduler::util::{hours_between, hours_to_ms, Priority, MS_PER_HOUR};

#[test]
fn test_priority_ordering() {
    assert!(Priority::MAX > Priority::NEUTRAL);
    assert!(Priority::NEUTRAL > Priority::MIN);
    assert_eq!(Priority::default(), Priority::NEUTRAL);
}

#[test]
fn test_priority_clips() {
    assert_eq!(Priority::new(0).value(), 1);
    assert_eq!(Priority::new(-7).value(), 1);
    assert_eq!(Priority::new(42).value(), 10);
    assert_eq!(Priority::from(6).value(), 6);
}

#[test]
fn test_priority_from_score() {
    assert_eq!(Priority::from_score(9.5).value(), 10);
    assert_eq!(Priority::from_score(1.4).value(), 1);
    assert_eq!(Priority::from_score(5.49).value(), 5);
    assert_eq!(Priority::from_score(f64::NAN), Priority::MIN);
    assert_eq!(Priority::from_score(f64::INFINITY), Priority::MIN);
}

#[test]
fn test_priority_boost_saturates() {
    assert_eq!(Priority::new(5).saturating_boost(3).value(), 8);
    assert_eq!(Priority::new(9).saturating_boost(5), Priority::MAX);
}

#[test]
fn test_priority_serde_clips() {
    let p: Priority = serde_json::from_str("15").unwrap();
    assert_eq!(p, Priority::MAX);
    assert_eq!(serde_json::to_string(&Priority::new(7)).unwrap(), "7");
}

#[test]
fn test_clock_helpers() {
    assert!((hours_between(MS_PER_HOUR, MS_PER_HOUR * 13) - 12.0).abs() < 1e-12);
    assert_eq!(hours_to_ms(0.5), MS_PER_HOUR / 2);
}
