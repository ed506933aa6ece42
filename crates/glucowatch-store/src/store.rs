//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use glucowatch_types::GlucoseReading;

use crate::error::{Error, Result};
use crate::models::{StoredReading, parse_source, source_to_str};
use crate::queries::ReadingQuery;
use crate::schema;

/// SQLite-based store for sensor snapshots and glucose readings.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Snapshot operations
impl Store {
    /// Read the blob stored under `key`.
    pub fn get_snapshot(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM snapshots WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Store `value` under `key`, replacing any previous blob.
    pub fn put_snapshot(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn.execute(
            "INSERT INTO snapshots (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = ?3",
            rusqlite::params![key, value, now],
        )?;
        debug!("Stored snapshot {} ({} bytes)", key, value.len());
        Ok(())
    }

    /// Read and decode a JSON snapshot.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_snapshot(key)? {
            Some(blob) => Ok(Some(serde_json::from_slice(&blob)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a JSON snapshot.
    pub fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let blob = serde_json::to_vec(value)?;
        self.put_snapshot(key, &blob)
    }
}

// Reading operations
impl Store {
    /// Insert a reading for `user_id` and return its record id.
    ///
    /// Persisted ids are kept; offline placeholders get a fresh id.
    pub fn insert_reading(&self, user_id: &str, reading: &GlucoseReading) -> Result<String> {
        let id = match reading.id.as_deref() {
            Some(id) if !reading.is_offline() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        };
        let now = OffsetDateTime::now_utc().unix_timestamp();

        self.conn.execute(
            "INSERT INTO readings (id, user_id, value, timestamp, comment, is_alert, source, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                id,
                user_id,
                reading.value,
                reading.timestamp.unix_timestamp(),
                reading.comment,
                reading.is_alert.unwrap_or(false),
                source_to_str(reading.source),
                now,
            ],
        )?;

        debug!("Inserted reading {} for {}", id, user_id);
        Ok(id)
    }

    /// Update the alert flag and (if given) the comment of a reading.
    ///
    /// Returns [`Error::ReadingNotFound`] if no such reading exists for `user_id`.
    pub fn update_reading(
        &self,
        user_id: &str,
        id: &str,
        is_alert: bool,
        comment: Option<&str>,
    ) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE readings SET is_alert = ?3, comment = COALESCE(?4, comment)
             WHERE user_id = ?1 AND id = ?2",
            rusqlite::params![user_id, id, is_alert, comment],
        )?;

        if changed == 0 {
            return Err(Error::ReadingNotFound(id.to_string()));
        }
        debug!("Updated reading {} for {}", id, user_id);
        Ok(())
    }

    /// Get a reading by id.
    pub fn get_reading(&self, user_id: &str, id: &str) -> Result<Option<StoredReading>> {
        let reading = self
            .conn
            .query_row(
                "SELECT id, user_id, value, timestamp, comment, is_alert, source, created_at
                 FROM readings WHERE user_id = ?1 AND id = ?2",
                [user_id, id],
                reading_from_row,
            )
            .optional()?;
        Ok(reading)
    }

    /// Query readings with filters.
    pub fn query_readings(&self, query: &ReadingQuery) -> Result<Vec<StoredReading>> {
        let sql = query.build_sql();
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql)?;
        let readings = stmt
            .query_map(params_ref.as_slice(), reading_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(readings)
    }

    /// Get the latest reading for a user.
    pub fn get_latest_reading(&self, user_id: &str) -> Result<Option<StoredReading>> {
        let query = ReadingQuery::new().user(user_id).limit(1);
        let mut readings = self.query_readings(&query)?;
        Ok(readings.pop())
    }

    /// Count readings, optionally for a single user.
    pub fn count_readings(&self, user_id: Option<&str>) -> Result<u64> {
        let count: i64 = match user_id {
            Some(id) => self.conn.query_row(
                "SELECT COUNT(*) FROM readings WHERE user_id = ?",
                [id],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?,
        };

        Ok(count as u64)
    }
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<OffsetDateTime> {
    let secs: i64 = row.get(idx)?;
    OffsetDateTime::from_unix_timestamp(secs)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

fn reading_from_row(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    Ok(StoredReading {
        id: row.get(0)?,
        user_id: row.get(1)?,
        value: row.get(2)?,
        timestamp: timestamp_at(row, 3)?,
        comment: row.get(4)?,
        is_alert: row.get(5)?,
        source: parse_source(&row.get::<_, String>(6)?),
        created_at: timestamp_at(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glucowatch_types::{ReadingSource, SensorStatus};
    use time::Duration;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000 + secs).unwrap()
    }

    fn reading(value: f64, secs: i64) -> GlucoseReading {
        GlucoseReading::new("u1", value, at(secs))
    }

    #[test]
    fn test_open_in_memory() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.count_readings(None).unwrap(), 0);
        assert_eq!(store.get_snapshot("missing").unwrap(), None);
    }

    #[test]
    fn test_snapshot_upsert() {
        let store = Store::open_in_memory().unwrap();
        store.put_snapshot("sensor_status", b"one").unwrap();
        store.put_snapshot("sensor_status", b"two").unwrap();
        assert_eq!(
            store.get_snapshot("sensor_status").unwrap(),
            Some(b"two".to_vec())
        );
    }

    #[test]
    fn test_json_snapshot() {
        let store = Store::open_in_memory().unwrap();
        let status = SensorStatus::activated("SN-1", Some("u1"), at(0), Duration::days(14));
        store.put_json("sensor_status", &status).unwrap();

        let loaded: Option<SensorStatus> = store.get_json("sensor_status").unwrap();
        assert_eq!(loaded, Some(status));

        store.put_snapshot("garbage", b"{not json").unwrap();
        assert!(matches!(
            store.get_json::<SensorStatus>("garbage"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_insert_and_get_reading() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .insert_reading(
                "u1",
                &reading(142.0, 0)
                    .with_comment("after lunch")
                    .with_source(ReadingSource::Manual),
            )
            .unwrap();

        let stored = store.get_reading("u1", &id).unwrap().unwrap();
        assert_eq!(stored.value, 142.0);
        assert_eq!(stored.timestamp, at(0));
        assert_eq!(stored.comment.as_deref(), Some("after lunch"));
        assert!(!stored.is_alert);
        assert_eq!(stored.source, ReadingSource::Manual);

        assert!(store.get_reading("u2", &id).unwrap().is_none());
    }

    #[test]
    fn test_insert_keeps_persisted_id_and_replaces_offline_id() {
        let store = Store::open_in_memory().unwrap();

        let kept = store
            .insert_reading("u1", &reading(100.0, 0).with_id("r-7"))
            .unwrap();
        assert_eq!(kept, "r-7");

        let fresh = store
            .insert_reading("u1", &reading(100.0, 1).with_id("offline_9"))
            .unwrap();
        assert!(!fresh.starts_with("offline_"));
        assert_eq!(store.count_readings(Some("u1")).unwrap(), 2);
    }

    #[test]
    fn test_update_reading() {
        let store = Store::open_in_memory().unwrap();
        let id = store
            .insert_reading("u1", &reading(250.0, 0).with_comment("keep"))
            .unwrap();

        store.update_reading("u1", &id, true, None).unwrap();
        let stored = store.get_reading("u1", &id).unwrap().unwrap();
        assert!(stored.is_alert);
        assert_eq!(stored.comment.as_deref(), Some("keep"));

        store
            .update_reading("u1", &id, true, Some("High glucose alert: 250 mg/dL"))
            .unwrap();
        let stored = store.get_reading("u1", &id).unwrap().unwrap();
        assert_eq!(
            stored.comment.as_deref(),
            Some("High glucose alert: 250 mg/dL")
        );
    }

    #[test]
    fn test_update_missing_reading() {
        let store = Store::open_in_memory().unwrap();
        let err = store.update_reading("u1", "nope", true, None).unwrap_err();
        assert!(matches!(err, Error::ReadingNotFound(id) if id == "nope"));
    }

    #[test]
    fn test_query_filters_and_order() {
        let store = Store::open_in_memory().unwrap();
        for (i, value) in [120.0, 250.0, 60.0, 130.0].into_iter().enumerate() {
            let mut r = reading(value, i as i64 * 60);
            r.is_alert = Some(!(70.0..=180.0).contains(&value));
            store.insert_reading("u1", &r).unwrap();
        }
        store
            .insert_reading("u2", &GlucoseReading::new("u2", 300.0, at(0)))
            .unwrap();

        let all = store.query_readings(&ReadingQuery::new().user("u1")).unwrap();
        let values: Vec<f64> = all.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![130.0, 60.0, 250.0, 120.0]);

        let alerts = store
            .query_readings(&ReadingQuery::new().user("u1").alerts_only().oldest_first())
            .unwrap();
        let values: Vec<f64> = alerts.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![250.0, 60.0]);

        let ranged = store
            .query_readings(&ReadingQuery::new().user("u1").since(at(60)).until(at(120)))
            .unwrap();
        assert_eq!(ranged.len(), 2);

        let page = store
            .query_readings(&ReadingQuery::new().user("u1").limit(2).offset(1))
            .unwrap();
        let values: Vec<f64> = page.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![60.0, 250.0]);

        assert_eq!(
            store.get_latest_reading("u1").unwrap().map(|r| r.value),
            Some(130.0)
        );
        assert_eq!(store.count_readings(None).unwrap(), 5);
    }

    #[test]
    fn test_open_file_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.db");

        {
            let store = Store::open(&path).unwrap();
            store.put_snapshot("k", b"v").unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_snapshot("k").unwrap(), Some(b"v".to_vec()));
    }
}
