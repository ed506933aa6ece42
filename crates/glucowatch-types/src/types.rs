//! Core types for glucose monitor state, readings and alerts.

use core::fmt;
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ParseError;

/// Prefix used for readings that were captured while offline and never persisted.
pub const OFFLINE_ID_PREFIX: &str = "offline_";

/// Snapshot of the wearable sensor's operational state.
///
/// The derived flags (`is_expired`, `is_expiring_soon`, `has_low_battery`) are
/// private and can only be changed through [`SensorStatus::refresh`], which
/// computes them from `expiration_date`, `battery_level` and the current time.
///
/// # Example
///
/// ```
/// use glucowatch_types::SensorStatus;
/// use time::{Duration, OffsetDateTime};
///
/// let now = OffsetDateTime::UNIX_EPOCH + Duration::days(365);
/// let mut status = SensorStatus::activated("SN-1", Some("u1"), now, Duration::days(14));
/// status.refresh(now + Duration::days(13) + Duration::hours(1), Duration::hours(24), 15);
///
/// assert!(status.is_expiring_soon());
/// assert!(!status.is_expired());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorStatus {
    /// Serial number of the active sensor.
    pub serial_number: Option<String>,
    /// User the sensor is registered to.
    pub user_id: Option<String>,
    /// Whether the sensor is currently reachable.
    pub is_connected: bool,
    /// Battery level percentage (0-100), if known.
    pub battery_level: Option<u8>,
    /// When the sensor was activated.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub activation_date: Option<OffsetDateTime>,
    /// When the sensor stops being usable.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub expiration_date: Option<OffsetDateTime>,
    /// Last time the sensor was scanned or reconnected.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_scan_time: Option<OffsetDateTime>,
    is_expired: bool,
    is_expiring_soon: bool,
    has_low_battery: bool,
}

impl SensorStatus {
    /// Build the status of a freshly activated sensor.
    ///
    /// The sensor is connected, scanned at `now`, and expires after `wear_duration`.
    /// Derived flags start cleared; call [`refresh`](Self::refresh) to evaluate them.
    pub fn activated(
        serial_number: impl Into<String>,
        user_id: Option<&str>,
        now: OffsetDateTime,
        wear_duration: Duration,
    ) -> Self {
        Self {
            serial_number: Some(serial_number.into()),
            user_id: user_id.map(str::to_string),
            is_connected: true,
            battery_level: None,
            activation_date: Some(now),
            expiration_date: Some(now + wear_duration),
            last_scan_time: Some(now),
            is_expired: false,
            is_expiring_soon: false,
            has_low_battery: false,
        }
    }

    /// Recompute the derived flags against `now`.
    ///
    /// - `is_expired` is true iff `now > expiration_date`
    /// - `is_expiring_soon` is true iff not expired and the remaining time is
    ///   strictly less than `expiring_soon_window`
    /// - `has_low_battery` is true iff a battery level is known and is below
    ///   `low_battery_threshold`
    pub fn refresh(
        &mut self,
        now: OffsetDateTime,
        expiring_soon_window: Duration,
        low_battery_threshold: u8,
    ) {
        match self.expiration_date {
            Some(expiration) => {
                self.is_expired = now > expiration;
                self.is_expiring_soon = !self.is_expired && (expiration - now) < expiring_soon_window;
            }
            None => {
                self.is_expired = false;
                self.is_expiring_soon = false;
            }
        }
        self.has_low_battery = self
            .battery_level
            .is_some_and(|level| level < low_battery_threshold);
    }

    /// Whether the sensor had passed its expiration date at the last refresh.
    pub fn is_expired(&self) -> bool {
        self.is_expired
    }

    /// Whether the sensor expires within the warning window (and has not expired).
    pub fn is_expiring_soon(&self) -> bool {
        self.is_expiring_soon
    }

    /// Whether the battery was below the low threshold at the last refresh.
    pub fn has_low_battery(&self) -> bool {
        self.has_low_battery
    }

    /// Whether a sensor has been activated (serial number and activation date set).
    pub fn is_activated(&self) -> bool {
        self.serial_number.is_some() && self.activation_date.is_some()
    }

    /// Whether an activated sensor is present and not expired.
    pub fn has_active_sensor(&self) -> bool {
        self.is_activated() && !self.is_expired
    }

    /// Time left until expiration, or `None` if no expiration date is known.
    ///
    /// Negative once the sensor has expired.
    pub fn time_remaining(&self, now: OffsetDateTime) -> Option<Duration> {
        self.expiration_date.map(|expiration| expiration - now)
    }

    /// Whole days elapsed since activation.
    pub fn days_since_activation(&self, now: OffsetDateTime) -> Option<i64> {
        self.activation_date
            .map(|activated| (now - activated).whole_days().max(0))
    }
}

/// Kind of sensor-health alert.
///
/// Serialized in upper snake case (`"LOW_BATTERY"`), displayed as a short
/// human-readable label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum SensorAlertType {
    /// Sensor is not connected.
    Disconnected,
    /// Sensor battery is below the low threshold.
    LowBattery,
    /// Sensor expires within the warning window.
    ExpiringSoon,
    /// Sensor has expired.
    Expired,
}

impl SensorAlertType {
    /// The stable wire name of this alert type.
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorAlertType::Disconnected => "DISCONNECTED",
            SensorAlertType::LowBattery => "LOW_BATTERY",
            SensorAlertType::ExpiringSoon => "EXPIRING_SOON",
            SensorAlertType::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for SensorAlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorAlertType::Disconnected => write!(f, "Disconnected"),
            SensorAlertType::LowBattery => write!(f, "Low battery"),
            SensorAlertType::ExpiringSoon => write!(f, "Expiring soon"),
            SensorAlertType::Expired => write!(f, "Expired"),
        }
    }
}

impl FromStr for SensorAlertType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DISCONNECTED" => Ok(SensorAlertType::Disconnected),
            "LOW_BATTERY" => Ok(SensorAlertType::LowBattery),
            "EXPIRING_SOON" => Ok(SensorAlertType::ExpiringSoon),
            "EXPIRED" => Ok(SensorAlertType::Expired),
            _ => Err(ParseError::UnknownAlertType(s.to_string())),
        }
    }
}

/// A sensor-health alert recorded in the alert ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SensorAlert {
    /// Identifier derived from the alert type and creation instant.
    pub id: String,
    /// Alert kind.
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub alert_type: SensorAlertType,
    /// Human-readable message.
    pub message: String,
    /// When the alert was created.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Whether the user has seen the alert.
    pub is_read: bool,
}

impl SensorAlert {
    /// Create an unread alert stamped at `timestamp`.
    pub fn new(
        alert_type: SensorAlertType,
        message: impl Into<String>,
        timestamp: OffsetDateTime,
    ) -> Self {
        Self {
            id: Self::derive_id(alert_type, timestamp),
            alert_type,
            message: message.into(),
            timestamp,
            is_read: false,
        }
    }

    /// Alert identity: `<TYPE>-<unix nanoseconds>`.
    ///
    /// ```
    /// use glucowatch_types::{SensorAlert, SensorAlertType};
    /// use time::OffsetDateTime;
    ///
    /// let id = SensorAlert::derive_id(SensorAlertType::Expired, OffsetDateTime::UNIX_EPOCH);
    /// assert_eq!(id, "EXPIRED-0");
    /// ```
    pub fn derive_id(alert_type: SensorAlertType, timestamp: OffsetDateTime) -> String {
        format!("{}-{}", alert_type.as_str(), timestamp.unix_timestamp_nanos())
    }
}

/// Where a glucose reading came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ReadingSource {
    /// Captured by the wearable sensor.
    #[default]
    Sensor,
    /// Entered by hand.
    Manual,
}

/// One glucose measurement sample.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlucoseReading {
    /// Persisted identifier. Absent or `offline_`-prefixed for unsaved readings.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: Option<String>,
    /// Glucose concentration in mg/dL.
    pub value: f64,
    /// When the sample was taken.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Owner of the reading.
    pub user_id: String,
    /// Free-form note.
    #[cfg_attr(feature = "serde", serde(default))]
    pub comment: Option<String>,
    /// Whether this reading raised an alert.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_alert: Option<bool>,
    /// Provenance of the reading.
    #[cfg_attr(feature = "serde", serde(default))]
    pub source: ReadingSource,
}

impl GlucoseReading {
    /// Create an unsaved sensor reading.
    pub fn new(user_id: impl Into<String>, value: f64, timestamp: OffsetDateTime) -> Self {
        Self {
            id: None,
            value,
            timestamp,
            user_id: user_id.into(),
            comment: None,
            is_alert: None,
            source: ReadingSource::Sensor,
        }
    }

    /// Set the persisted identifier.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach a comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Set the reading source.
    pub fn with_source(mut self, source: ReadingSource) -> Self {
        self.source = source;
        self
    }

    /// Whether this reading has not been persisted yet.
    ///
    /// ```
    /// use glucowatch_types::GlucoseReading;
    /// use time::OffsetDateTime;
    ///
    /// let now = OffsetDateTime::UNIX_EPOCH;
    /// assert!(GlucoseReading::new("u1", 120.0, now).is_offline());
    /// assert!(GlucoseReading::new("u1", 120.0, now).with_id("offline_42").is_offline());
    /// assert!(!GlucoseReading::new("u1", 120.0, now).with_id("r-42").is_offline());
    /// ```
    pub fn is_offline(&self) -> bool {
        match &self.id {
            None => true,
            Some(id) => id.is_empty() || id.starts_with(OFFLINE_ID_PREFIX),
        }
    }

    /// Whether the value is numeric (not NaN or infinite).
    ///
    /// Zero and negative values are numeric and count as valid; they fall
    /// below any low threshold.
    pub fn has_valid_value(&self) -> bool {
        self.value.is_finite()
    }
}

/// Direction of a glucose threshold breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum GlucoseAlertType {
    /// Above the high threshold.
    High,
    /// Below the low threshold.
    Low,
}

impl fmt::Display for GlucoseAlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GlucoseAlertType::High => write!(f, "High"),
            GlucoseAlertType::Low => write!(f, "Low"),
        }
    }
}

impl FromStr for GlucoseAlertType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HIGH" => Ok(GlucoseAlertType::High),
            "LOW" => Ok(GlucoseAlertType::Low),
            _ => Err(ParseError::UnknownGlucoseAlertType(s.to_string())),
        }
    }
}

/// An alert raised by a reading that breached a glucose threshold.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GlucoseAlert {
    /// Unique alert identifier.
    pub id: Uuid,
    /// The breaching reading.
    pub reading: GlucoseReading,
    /// Direction of the breach.
    pub alert_type: GlucoseAlertType,
    /// When the alert was raised.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub timestamp: OffsetDateTime,
    /// Whether the user has acknowledged the alert.
    pub acknowledged: bool,
}

impl GlucoseAlert {
    /// Create an unacknowledged alert.
    pub fn new(reading: GlucoseReading, alert_type: GlucoseAlertType, timestamp: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            reading,
            alert_type,
            timestamp,
            acknowledged: false,
        }
    }

    /// Short title suitable for a prompt or notification.
    pub fn title(&self) -> &'static str {
        match self.alert_type {
            GlucoseAlertType::High => "High glucose",
            GlucoseAlertType::Low => "Low glucose",
        }
    }

    /// Body text describing the breaching value.
    pub fn message(&self) -> String {
        match self.alert_type {
            GlucoseAlertType::High => format!(
                "Glucose is high at {:.0} mg/dL",
                self.reading.value
            ),
            GlucoseAlertType::Low => format!(
                "Glucose is low at {:.0} mg/dL",
                self.reading.value
            ),
        }
    }
}
