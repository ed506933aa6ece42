//! Platform-agnostic types for continuous glucose monitoring.
//!
//! This crate provides the shared data model used by the status and alert
//! engines (glucowatch-core), the local store (glucowatch-store) and the
//! service binary.
//!
//! # Features
//!
//! - Sensor status snapshot with derived expiration/battery flags
//! - Sensor-health alerts with type-and-instant derived identity
//! - Glucose readings and threshold-breach alerts
//! - Error types for parsing
//!
//! # Example
//!
//! ```
//! use glucowatch_types::{GlucoseReading, SensorAlertType};
//! use time::OffsetDateTime;
//!
//! let reading = GlucoseReading::new("u1", 250.0, OffsetDateTime::UNIX_EPOCH);
//! assert!(reading.is_offline());
//! assert_eq!("EXPIRED".parse::<SensorAlertType>(), Ok(SensorAlertType::Expired));
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    GlucoseAlert, GlucoseAlertType, GlucoseReading, OFFLINE_ID_PREFIX, ReadingSource,
    SensorAlert, SensorAlertType, SensorStatus,
};
