//! Error types for glucowatch-core.
//!
//! The engines in this crate never surface collaborator failures to their
//! callers: snapshot, mirror and history errors are logged and swallowed,
//! audio failures degrade to vibration-only. These types exist so that
//! collaborator implementations have a common error vocabulary and so the
//! engines can log structured causes.
//!
//! | Error | Source | Engine behavior |
//! |-------|--------|-----------------|
//! | [`Error::Snapshot`] | Snapshot store read/write | Logged, in-memory state kept |
//! | [`Error::Mirror`] | Remote mirror read/write | Logged, never rolls back local state |
//! | [`Error::History`] | History insert/update | Update falls back to insert; insert failure logged |
//! | [`Error::Audio`] | Audio resource load/play | One reload-and-retry, then vibration-only |
//! | [`Error::Prompt`] | Native acknowledge prompt | Logged, alert stays active |
//! | [`Error::InvalidConfig`] | Policy/threshold validation | Returned at construction time |

use thiserror::Error;

/// Errors that can occur in collaborators of the glucowatch engines.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Snapshot store failure.
    #[error("Snapshot store error: {0}")]
    Snapshot(String),

    /// Remote mirror failure.
    #[error("Remote mirror error: {0}")]
    Mirror(String),

    /// History store failure.
    #[error("History store error: {0}")]
    History(String),

    /// A history record to update does not exist.
    #[error("History record not found: {0}")]
    RecordNotFound(String),

    /// Audio resource could not be loaded or played.
    #[error("Audio unavailable: {0}")]
    Audio(String),

    /// Vibration hardware failure.
    #[error("Vibration failed: {0}")]
    Vibration(String),

    /// Native prompt could not be shown.
    #[error("Prompt failed: {0}")]
    Prompt(String),

    /// Snapshot (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a snapshot store error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot(message.into())
    }

    /// Create a remote mirror error.
    pub fn mirror(message: impl Into<String>) -> Self {
        Self::Mirror(message.into())
    }

    /// Create a history store error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History(message.into())
    }

    /// Create an audio error.
    pub fn audio(message: impl Into<String>) -> Self {
        Self::Audio(message.into())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using glucowatch-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
