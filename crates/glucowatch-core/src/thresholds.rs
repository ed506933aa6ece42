//! Glucose safety thresholds and classification.
//!
//! This module provides configurable thresholds for classifying glucose
//! readings into alert categories.
//!
//! # Example
//!
//! ```
//! use glucowatch_core::{GlucoseThresholds, ThresholdConfig};
//! use glucowatch_types::GlucoseAlertType;
//!
//! // Use default thresholds (70-180 mg/dL)
//! let thresholds = GlucoseThresholds::default();
//!
//! assert_eq!(thresholds.evaluate(250.0), Some(GlucoseAlertType::High));
//! assert_eq!(thresholds.evaluate(120.0), None);
//! assert_eq!(thresholds.evaluate(65.0), Some(GlucoseAlertType::Low));
//! ```

use serde::{Deserialize, Serialize};

use glucowatch_types::{GlucoseAlertType, GlucoseReading};

use crate::error::{Error, Result};

/// Configuration for glucose thresholds in mg/dL.
///
/// Both bounds are exclusive: a reading equal to a bound is in range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Readings strictly above this value are HIGH.
    pub high: f64,
    /// Readings strictly below this value are LOW.
    pub low: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            high: 180.0,
            low: 70.0,
        }
    }
}

impl ThresholdConfig {
    /// Validate the configuration.
    ///
    /// Checks that both bounds are finite and positive and that `low < high`.
    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(Error::invalid_config("glucose thresholds must be finite"));
        }
        if self.low <= 0.0 {
            return Err(Error::invalid_config("low threshold must be > 0"));
        }
        if self.low >= self.high {
            return Err(Error::invalid_config(
                "low threshold must be below high threshold",
            ));
        }
        Ok(())
    }
}

/// Threshold evaluator for glucose readings.
#[derive(Debug, Clone, Default)]
pub struct GlucoseThresholds {
    config: ThresholdConfig,
}

impl GlucoseThresholds {
    /// Create a new threshold evaluator with the given configuration.
    pub fn new(config: ThresholdConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Classify a glucose value.
    ///
    /// Non-finite values are not classified.
    pub fn evaluate(&self, value: f64) -> Option<GlucoseAlertType> {
        if !value.is_finite() {
            None
        } else if value > self.config.high {
            Some(GlucoseAlertType::High)
        } else if value < self.config.low {
            Some(GlucoseAlertType::Low)
        } else {
            None
        }
    }

    /// Classify a reading, ignoring malformed values.
    pub fn classify(&self, reading: &GlucoseReading) -> Option<GlucoseAlertType> {
        if !reading.has_valid_value() {
            return None;
        }
        self.evaluate(reading.value)
    }

    /// Whether `value` lies within the safe range.
    pub fn in_range(&self, value: f64) -> bool {
        value.is_finite() && self.evaluate(value).is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn reading(value: f64) -> GlucoseReading {
        GlucoseReading::new("u1", value, OffsetDateTime::UNIX_EPOCH)
    }

    #[test]
    fn test_boundary_values() {
        let t = GlucoseThresholds::default();
        assert_eq!(t.classify(&reading(69.0)), Some(GlucoseAlertType::Low));
        assert_eq!(t.classify(&reading(70.0)), None);
        assert_eq!(t.classify(&reading(180.0)), None);
        assert_eq!(t.classify(&reading(181.0)), Some(GlucoseAlertType::High));
    }

    #[test]
    fn test_fractional_boundaries() {
        let t = GlucoseThresholds::default();
        assert_eq!(t.evaluate(180.1), Some(GlucoseAlertType::High));
        assert_eq!(t.evaluate(69.9), Some(GlucoseAlertType::Low));
    }

    #[test]
    fn test_malformed_values_are_ignored() {
        let t = GlucoseThresholds::default();
        assert_eq!(t.classify(&reading(f64::NAN)), None);
        assert_eq!(t.classify(&reading(f64::INFINITY)), None);
        assert!(!t.in_range(f64::NAN));
    }

    #[test]
    fn test_zero_and_negative_values_are_low() {
        let t = GlucoseThresholds::default();
        assert_eq!(t.classify(&reading(0.0)), Some(GlucoseAlertType::Low));
        assert_eq!(t.classify(&reading(-5.0)), Some(GlucoseAlertType::Low));
        assert!(!t.in_range(0.0));
    }

    #[test]
    fn test_custom_thresholds() {
        let t = GlucoseThresholds::new(ThresholdConfig {
            high: 250.0,
            low: 55.0,
        });
        assert_eq!(t.evaluate(200.0), None);
        assert_eq!(t.evaluate(60.0), None);
        assert_eq!(t.evaluate(251.0), Some(GlucoseAlertType::High));
        assert!(t.in_range(120.0));
    }

    #[test]
    fn test_config_validation() {
        assert!(ThresholdConfig::default().validate().is_ok());
        assert!(ThresholdConfig { high: 70.0, low: 70.0 }.validate().is_err());
        assert!(ThresholdConfig { high: 180.0, low: 0.0 }.validate().is_err());
        assert!(
            ThresholdConfig {
                high: f64::NAN,
                low: 70.0
            }
            .validate()
            .is_err()
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn classification_partitions_valid_values(value in 1.0f64..600.0) {
                let t = GlucoseThresholds::default();
                match t.evaluate(value) {
                    Some(GlucoseAlertType::High) => prop_assert!(value > 180.0),
                    Some(GlucoseAlertType::Low) => prop_assert!(value < 70.0),
                    None => prop_assert!((70.0..=180.0).contains(&value)),
                }
                prop_assert_eq!(t.in_range(value), t.evaluate(value).is_none());
            }
        }
    }
}
