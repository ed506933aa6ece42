//! SQLite-backed collaborators for the engines.

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use glucowatch_core::{Error, GlucoseReading, HistoryStore, ReadingUpdate, Result, SnapshotStore};
use glucowatch_store::Store;

/// Serves the snapshot and history traits from one SQLite database.
pub struct SqliteBackend {
    store: Mutex<Store>,
}

impl SqliteBackend {
    /// Wrap an open store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Lock the underlying store for direct queries.
    pub async fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().await
    }
}

#[async_trait]
impl SnapshotStore for SqliteBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.store
            .lock()
            .await
            .get_snapshot(key)
            .map_err(|e| Error::snapshot(e.to_string()))
    }

    async fn set(&self, key: &str, blob: &[u8]) -> Result<()> {
        self.store
            .lock()
            .await
            .put_snapshot(key, blob)
            .map_err(|e| Error::snapshot(e.to_string()))
    }
}

#[async_trait]
impl HistoryStore for SqliteBackend {
    async fn insert(&self, user_id: &str, reading: &GlucoseReading) -> Result<String> {
        self.store
            .lock()
            .await
            .insert_reading(user_id, reading)
            .map_err(|e| Error::history(e.to_string()))
    }

    async fn update(&self, user_id: &str, id: &str, update: &ReadingUpdate) -> Result<()> {
        self.store
            .lock()
            .await
            .update_reading(user_id, id, update.is_alert, update.comment.as_deref())
            .map_err(|e| match e {
                glucowatch_store::Error::ReadingNotFound(id) => Error::RecordNotFound(id),
                other => Error::history(other.to_string()),
            })
    }
}
