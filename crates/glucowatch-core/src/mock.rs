//! Mock collaborators for testing.
//!
//! In-memory implementations of every trait in [`crate::traits`], usable
//! without a database, network, audio device or terminal.
//!
//! # Features
//!
//! - **Failure injection**: make a collaborator fail every call, or only the
//!   next N calls
//! - **Call counting**: observe how often the engines reached a collaborator
//! - **Latency simulation**: delay the prompt to mimic a user taking time, or
//!   the mirror to mimic a slow network

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use glucowatch_types::{GlucoseAlert, GlucoseReading};

use crate::error::{Error, Result};
use crate::traits::{
    AlertPrompt, AudioLoader, AudioPlayback, HistoryStore, ReadingUpdate, RemoteMirror,
    SnapshotStore, Vibrator,
};

/// In-memory snapshot store.
#[derive(Debug, Default)]
pub struct MockSnapshotStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    should_fail: AtomicBool,
    set_count: AtomicU32,
}

impl MockSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes.
    pub fn set_count(&self) -> u32 {
        self.set_count.load(Ordering::SeqCst)
    }

    fn check_fail(&self) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::snapshot("mock failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MockSnapshotStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_fail()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.check_fail()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), blob.to_vec());
        self.set_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory remote mirror. Updates merge top-level fields.
#[derive(Debug, Default)]
pub struct MockRemoteMirror {
    records: RwLock<HashMap<(String, String), Value>>,
    should_fail: AtomicBool,
    update_count: AtomicU32,
    latency_ms: AtomicU64,
}

impl MockRemoteMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every update by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make every call fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of update attempts, including failed ones.
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::SeqCst)
    }

    /// Read a record without failure injection.
    pub async fn record(&self, collection: &str, id: &str) -> Option<Value> {
        self.records
            .read()
            .await
            .get(&(collection.to_string(), id.to_string()))
            .cloned()
    }
}

#[async_trait]
impl RemoteMirror for MockRemoteMirror {
    async fn read_record(&self, collection: &str, id: &str) -> Result<Option<Value>> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::mirror("mock failure"));
        }
        Ok(self.record(collection, id).await)
    }

    async fn update_record(&self, collection: &str, id: &str, fields: Value) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.update_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::mirror("mock failure"));
        }

        let mut records = self.records.write().await;
        let record = records
            .entry((collection.to_string(), id.to_string()))
            .or_insert_with(|| Value::Object(Default::default()));
        match (record, fields) {
            (Value::Object(existing), Value::Object(fields)) => existing.extend(fields),
            (record, fields) => *record = fields,
        }
        Ok(())
    }
}

/// In-memory reading history keyed by `(user_id, id)`.
#[derive(Debug, Default)]
pub struct MockHistoryStore {
    records: RwLock<HashMap<(String, String), GlucoseReading>>,
    next_id: AtomicU64,
    should_fail: AtomicBool,
    insert_count: AtomicU32,
    update_count: AtomicU32,
}

impl MockHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Store a reading directly, bypassing counters. Returns its id.
    pub async fn seed(&self, user_id: &str, reading: GlucoseReading) -> String {
        let id = self.allocate_id();
        let reading = reading.with_id(&id);
        self.records
            .write()
            .await
            .insert((user_id.to_string(), id.clone()), reading);
        id
    }

    /// Look up a stored reading.
    pub async fn get(&self, user_id: &str, id: &str) -> Option<GlucoseReading> {
        self.records
            .read()
            .await
            .get(&(user_id.to_string(), id.to_string()))
            .cloned()
    }

    /// All readings stored for `user_id`.
    pub async fn readings(&self, user_id: &str) -> Vec<GlucoseReading> {
        self.records
            .read()
            .await
            .iter()
            .filter(|((user, _), _)| user == user_id)
            .map(|(_, reading)| reading.clone())
            .collect()
    }

    /// Number of insert attempts.
    pub fn insert_count(&self) -> u32 {
        self.insert_count.load(Ordering::SeqCst)
    }

    /// Number of update attempts.
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::SeqCst)
    }

    fn allocate_id(&self) -> String {
        format!("reading-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl HistoryStore for MockHistoryStore {
    async fn insert(&self, user_id: &str, reading: &GlucoseReading) -> Result<String> {
        self.insert_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::history("mock failure"));
        }
        Ok(self.seed(user_id, reading.clone()).await)
    }

    async fn update(&self, user_id: &str, id: &str, update: &ReadingUpdate) -> Result<()> {
        self.update_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::history("mock failure"));
        }

        let mut records = self.records.write().await;
        let reading = records
            .get_mut(&(user_id.to_string(), id.to_string()))
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        reading.is_alert = Some(update.is_alert);
        if update.comment.is_some() {
            reading.comment = update.comment.clone();
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct AudioState {
    playing: AtomicBool,
    volume: Mutex<Option<f32>>,
}

/// Audio loader whose playbacks only flip a shared flag.
#[derive(Debug, Default)]
pub struct MockAudioLoader {
    state: Arc<AudioState>,
    load_count: AtomicU32,
    remaining_failures: AtomicU32,
}

impl MockAudioLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` loads.
    pub fn set_transient_failures(&self, count: u32) {
        self.remaining_failures.store(count, Ordering::SeqCst);
    }

    /// Number of load attempts.
    pub fn load_count(&self) -> u32 {
        self.load_count.load(Ordering::SeqCst)
    }

    /// Whether a playback is currently playing.
    pub fn is_playing(&self) -> bool {
        self.state.playing.load(Ordering::SeqCst)
    }

    /// Volume most recently set on a playback.
    pub fn last_volume(&self) -> Option<f32> {
        *self
            .state
            .volume
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioLoader for MockAudioLoader {
    fn load(&self, resource: &str) -> Result<Box<dyn AudioPlayback>> {
        self.load_count.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::audio(format!("cannot load {}", resource)));
        }
        Ok(Box::new(MockPlayback {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockPlayback {
    state: Arc<AudioState>,
}

impl AudioPlayback for MockPlayback {
    fn play(&mut self, _looped: bool) -> Result<()> {
        self.state.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) {
        self.state.playing.store(false, Ordering::SeqCst);
    }

    fn set_volume(&mut self, level: f32) {
        *self
            .state
            .volume
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(level);
    }
}

/// Vibrator that counts calls.
#[derive(Debug, Default)]
pub struct MockVibrator {
    vibrate_count: AtomicUsize,
    cancel_count: AtomicUsize,
    should_fail: AtomicBool,
}

impl MockVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every vibrate call fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Number of vibrate calls, including failed ones.
    pub fn vibrate_count(&self) -> usize {
        self.vibrate_count.load(Ordering::SeqCst)
    }

    /// Number of cancel calls.
    pub fn cancel_count(&self) -> usize {
        self.cancel_count.load(Ordering::SeqCst)
    }
}

impl Vibrator for MockVibrator {
    fn vibrate(&self, _pattern: &[u64]) -> Result<()> {
        self.vibrate_count.fetch_add(1, Ordering::SeqCst);
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Vibration("mock failure".to_string()));
        }
        Ok(())
    }

    fn cancel(&self) {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Prompt that acknowledges automatically, optionally after a delay.
#[derive(Debug, Default)]
pub struct MockPrompt {
    confirm_count: AtomicU32,
    should_fail: AtomicBool,
    /// Simulated user response time in milliseconds (0 = immediate).
    latency_ms: AtomicU64,
}

impl MockPrompt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every prompt fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool) {
        self.should_fail.store(fail, Ordering::SeqCst);
    }

    /// Delay before the simulated user acknowledges.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of prompts shown.
    pub fn confirm_count(&self) -> u32 {
        self.confirm_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlertPrompt for MockPrompt {
    async fn confirm(&self, _alert: &GlucoseAlert) -> Result<()> {
        self.confirm_count.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(Error::Prompt("mock failure".to_string()));
        }
        Ok(())
    }
}
