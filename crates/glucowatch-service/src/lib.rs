//! Command-line service for glucowatch.
//!
//! This crate wires the engines in `glucowatch-core` to real collaborators:
//! - SQLite for the status snapshot and reading history
//! - An optional HTTP mirror for the sensor status
//! - The terminal for alert sound, vibration and the acknowledge prompt
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/glucowatch/config.toml`:
//!
//! ```toml
//! [storage]
//! path = "~/.local/share/glucowatch/data.db"
//!
//! [sensor]
//! user_id = "u1"
//! tick_interval_secs = 60
//! wear_days = 14
//!
//! [alerts]
//! high_threshold = 180.0
//! low_threshold = 70.0
//! audio = true
//!
//! [mirror]
//! url = "https://mirror.example.com/api"
//! ```

pub mod backend;
pub mod config;
pub mod mirror;
pub mod notify;
pub mod ticker;

use std::sync::Arc;

use glucowatch_core::{AlertPrompt, Monitor, Result};

pub use backend::SqliteBackend;
pub use config::{Config, ConfigError, ValidationError};
pub use mirror::HttpMirror;
pub use notify::{BellAudioLoader, LogVibrator, TerminalPrompt};
pub use ticker::Ticker;

/// Build a monitor from configuration over a SQLite backend.
///
/// Must be called within a Tokio runtime.
pub fn build_monitor(
    config: &Config,
    backend: Arc<SqliteBackend>,
    prompt: Option<Arc<dyn AlertPrompt>>,
) -> Result<Monitor> {
    let mut builder = Monitor::builder()
        .policy(config.sensor.policy())
        .thresholds(config.alerts.thresholds())
        .dispatcher_config(config.alerts.dispatcher())
        .snapshot_store(backend.clone())
        .history_store(backend)
        .audio_loader(Arc::new(BellAudioLoader))
        .vibrator(Arc::new(LogVibrator));

    if let Some(mirror) = HttpMirror::from_config(&config.mirror)? {
        builder = builder.remote_mirror(Arc::new(mirror));
    }
    if let Some(prompt) = prompt {
        builder = builder.prompt(prompt);
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glucowatch_store::Store;

    #[tokio::test]
    async fn test_build_monitor_from_default_config() {
        let backend = Arc::new(SqliteBackend::new(Store::open_in_memory().unwrap()));
        let monitor = build_monitor(&Config::default(), backend.clone(), None).unwrap();

        let status = monitor.status().activate("SN-1", Some("u1")).await;
        assert!(status.is_connected);
        monitor.status().flush().await;

        let stored = backend
            .store()
            .await
            .get_snapshot(glucowatch_core::status::STATUS_KEY)
            .unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn test_build_monitor_rejects_invalid_thresholds() {
        let backend = Arc::new(SqliteBackend::new(Store::open_in_memory().unwrap()));
        let mut config = Config::default();
        config.alerts.low_threshold = 200.0;

        assert!(build_monitor(&config, backend, None).is_err());
    }
}
