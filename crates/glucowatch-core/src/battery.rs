//! Battery level estimation.
//!
//! Sensors without battery telemetry get a placeholder estimate based on
//! wear time: every full day since activation costs a fixed number of
//! percentage points.

use time::OffsetDateTime;

use glucowatch_types::SensorStatus;

use crate::traits::BatteryEstimator;

/// Default drain in percentage points per day of wear.
pub const DEFAULT_DRAIN_PER_DAY: u8 = 6;

/// Linear wear-time model: `max(0, 100 - drain_per_day * days_since_activation)`.
///
/// # Example
///
/// ```
/// use glucowatch_core::battery::WearTimeEstimator;
/// use glucowatch_core::traits::BatteryEstimator;
/// use glucowatch_types::SensorStatus;
/// use time::{Duration, OffsetDateTime};
///
/// let start = OffsetDateTime::UNIX_EPOCH;
/// let status = SensorStatus::activated("SN-1", None, start, Duration::days(14));
///
/// let estimator = WearTimeEstimator::default();
/// assert_eq!(estimator.estimate(&status, start + Duration::days(10)), Some(40));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct WearTimeEstimator {
    drain_per_day: u8,
}

impl WearTimeEstimator {
    /// Create an estimator with a custom daily drain.
    pub fn new(drain_per_day: u8) -> Self {
        Self { drain_per_day }
    }

    /// The daily drain in percentage points.
    pub fn drain_per_day(&self) -> u8 {
        self.drain_per_day
    }
}

impl Default for WearTimeEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_DRAIN_PER_DAY)
    }
}

impl BatteryEstimator for WearTimeEstimator {
    fn estimate(&self, status: &SensorStatus, now: OffsetDateTime) -> Option<u8> {
        let days = status.days_since_activation(now)?;
        let drained = days.saturating_mul(i64::from(self.drain_per_day));
        Some((100 - drained).clamp(0, 100) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_estimate_drains_linearly() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let status = SensorStatus::activated("SN-1", None, start, Duration::days(14));
        let estimator = WearTimeEstimator::default();

        assert_eq!(estimator.estimate(&status, start), Some(100));
        assert_eq!(estimator.estimate(&status, start + Duration::hours(23)), Some(100));
        assert_eq!(estimator.estimate(&status, start + Duration::days(1)), Some(94));
        assert_eq!(estimator.estimate(&status, start + Duration::days(14)), Some(16));
        assert_eq!(estimator.estimate(&status, start + Duration::days(15)), Some(10));
    }

    #[test]
    fn test_estimate_floors_at_zero() {
        let start = OffsetDateTime::UNIX_EPOCH;
        let status = SensorStatus::activated("SN-1", None, start, Duration::days(14));
        let estimator = WearTimeEstimator::default();
        assert_eq!(estimator.estimate(&status, start + Duration::days(40)), Some(0));
    }

    #[test]
    fn test_estimate_without_activation() {
        let estimator = WearTimeEstimator::new(10);
        assert_eq!(estimator.drain_per_day(), 10);
        assert_eq!(
            estimator.estimate(&SensorStatus::default(), OffsetDateTime::UNIX_EPOCH),
            None
        );
    }
}
