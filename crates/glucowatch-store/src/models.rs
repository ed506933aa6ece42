//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use glucowatch_types::{GlucoseReading, ReadingSource};

/// A glucose reading stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredReading {
    /// Record identifier.
    pub id: String,
    /// Owner of the reading.
    pub user_id: String,
    /// Glucose concentration in mg/dL.
    pub value: f64,
    /// When the sample was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// Free-form note.
    pub comment: Option<String>,
    /// Whether this reading raised an alert.
    pub is_alert: bool,
    /// Provenance of the reading.
    pub source: ReadingSource,
    /// When the record was written.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredReading {
    /// Convert to the shared reading type.
    pub fn to_reading(&self) -> GlucoseReading {
        GlucoseReading {
            id: Some(self.id.clone()),
            value: self.value,
            timestamp: self.timestamp,
            user_id: self.user_id.clone(),
            comment: self.comment.clone(),
            is_alert: Some(self.is_alert),
            source: self.source,
        }
    }
}

impl From<StoredReading> for GlucoseReading {
    fn from(stored: StoredReading) -> Self {
        GlucoseReading {
            id: Some(stored.id),
            value: stored.value,
            timestamp: stored.timestamp,
            user_id: stored.user_id,
            comment: stored.comment,
            is_alert: Some(stored.is_alert),
            source: stored.source,
        }
    }
}

pub(crate) fn source_to_str(source: ReadingSource) -> &'static str {
    match source {
        ReadingSource::Sensor => "sensor",
        ReadingSource::Manual => "manual",
    }
}

pub(crate) fn parse_source(s: &str) -> ReadingSource {
    match s {
        "manual" => ReadingSource::Manual,
        _ => ReadingSource::Sensor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_reading_conversion() {
        let stored = StoredReading {
            id: "r-1".to_string(),
            user_id: "u1".to_string(),
            value: 142.0,
            timestamp: OffsetDateTime::UNIX_EPOCH,
            comment: Some("fasting".to_string()),
            is_alert: false,
            source: ReadingSource::Manual,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };

        let reading = stored.to_reading();
        assert_eq!(reading.id.as_deref(), Some("r-1"));
        assert!(!reading.is_offline());
        assert_eq!(reading.is_alert, Some(false));
        assert_eq!(GlucoseReading::from(stored), reading);
    }

    #[test]
    fn test_source_names() {
        for source in [ReadingSource::Sensor, ReadingSource::Manual] {
            assert_eq!(parse_source(source_to_str(source)), source);
        }
        assert_eq!(parse_source("unknown"), ReadingSource::Sensor);
    }
}
