//! Wall-clock helpers. Timestamps are milliseconds since the Unix epoch.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds in one hour.
pub const MS_PER_HOUR: u128 = 3_600_000;

/// Current time in milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}

/// Fractional hours elapsed between `since_ms` and `now_ms`; zero if `now_ms` is earlier.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn hours_between(since_ms: u128, now_ms: u128) -> f64 {
    now_ms.saturating_sub(since_ms) as f64 / MS_PER_HOUR as f64
}

/// Convert fractional hours to milliseconds, saturating at zero for negative input.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hours_to_ms(hours: f64) -> u128 {
    if hours.is_finite() && hours > 0.0 {
        (hours * 3_600_000.0) as u128
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hours_between() {
        assert!((hours_between(0, MS_PER_HOUR * 3) - 3.0).abs() < f64::EPSILON);
        assert!((hours_between(0, MS_PER_HOUR / 2) - 0.5).abs() < f64::EPSILON);
        assert_eq!(hours_between(10, 5), 0.0);
    }

    #[test]
    fn test_hours_to_ms() {
        assert_eq!(hours_to_ms(2.0), 7_200_000);
        assert_eq!(hours_to_ms(-1.0), 0);
        assert_eq!(hours_to_ms(f64::NAN), 0);
    }

    #[test]
    fn test_now_ms_is_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 0);
        assert!(b >= a);
    }
}
