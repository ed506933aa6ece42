//! Collaborator abstractions consumed by the engines.
//!
//! The engines own no I/O. Durable storage, remote replication, history
//! persistence, audio, vibration and the native prompt are all reached
//! through these traits so that real adapters (SQLite, HTTP, terminal) and
//! the mocks in [`crate::mock`] are interchangeable.

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

use glucowatch_types::{GlucoseAlert, GlucoseReading, SensorStatus};

use crate::error::Result;

/// Durable key/value store holding the last sensor-status snapshot.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `blob` under `key`, replacing any previous value.
    async fn set(&self, key: &str, blob: &[u8]) -> Result<()>;
}

/// Best-effort remote replica of the sensor status.
#[async_trait]
pub trait RemoteMirror: Send + Sync {
    /// Read a record from `collection`.
    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>>;

    /// Merge `fields` into the record `id` of `collection`.
    async fn update_record(&self, collection: &str, id: &str, fields: Value) -> Result<()>;
}

/// Partial update applied to a persisted glucose reading.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingUpdate {
    /// New alert flag.
    pub is_alert: bool,
    /// New comment.
    pub comment: Option<String>,
}

/// Persisted glucose reading history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Insert a reading and return its new identifier.
    async fn insert(&self, user_id: &str, reading: &GlucoseReading) -> Result<String>;

    /// Apply a partial update to an existing reading.
    ///
    /// Implementations return [`Error::RecordNotFound`](crate::Error::RecordNotFound)
    /// when `id` does not exist.
    async fn update(&self, user_id: &str, id: &str, update: &ReadingUpdate) -> Result<()>;
}

/// A loaded, playable audio resource.
pub trait AudioPlayback: Send {
    /// Start playback, optionally looping forever.
    fn play(&mut self, looped: bool) -> Result<()>;

    /// Stop playback. Must be safe to call more than once.
    fn stop(&mut self);

    /// Set output volume in `0.0..=1.0`.
    fn set_volume(&mut self, level: f32);
}

/// Loads audio resources for alert sounds.
pub trait AudioLoader: Send + Sync {
    /// Load `resource` into a playable handle.
    fn load(&self, resource: &str) -> Result<Box<dyn AudioPlayback>>;
}

/// Drives the device's vibration motor.
pub trait Vibrator: Send + Sync {
    /// Play one run of `pattern` (alternating off/on durations in milliseconds).
    fn vibrate(&self, pattern: &[u64]) -> Result<()>;

    /// Stop any vibration in progress.
    fn cancel(&self);
}

/// Blocking, non-dismissible prompt whose only affordance is "Acknowledge".
#[async_trait]
pub trait AlertPrompt: Send + Sync {
    /// Show the prompt and resolve once the user acknowledges.
    async fn confirm(&self, alert: &GlucoseAlert) -> Result<()>;
}

/// Supplies a battery level for the active sensor.
///
/// The default implementation is a wear-time model
/// ([`WearTimeEstimator`](crate::battery::WearTimeEstimator)); a telemetry
/// reader can replace it without changing the engine.
pub trait BatteryEstimator: Send + Sync {
    /// Estimate the battery level (0-100) for `status` at `now`.
    fn estimate(&self, status: &SensorStatus, now: OffsetDateTime) -> Option<u8>;
}
