//! Error types for glucowatch-store.

use std::path::PathBuf;

/// Result type for glucowatch-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in glucowatch-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Reading not found for the given user.
    #[error("Reading not found: {0}")]
    ReadingNotFound(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
