//! Sensor status and glucose alert engines for continuous glucose monitors.
//!
//! This crate tracks the operational state of a wearable glucose sensor and
//! the readings it produces, and raises de-duplicated alerts when the sensor
//! degrades or a reading crosses a safety threshold.
//!
//! # Features
//!
//! - **Sensor status**: expiration, connectivity and battery flags recomputed against the clock
//! - **Alert ledger**: sensor-health alerts with read state and a de-duplication window
//! - **Glucose alerts**: threshold classification with a notification loop that runs until acknowledged
//! - **History reconciliation**: acknowledged alerts are folded into reading history
//! - **Event bus**: a typed broadcast channel plus an in-process alert callback
//! - **Mocks**: in-memory collaborators with failure injection for tests
//!
//! # Sensor alerts
//!
//! | Alert | Condition |
//! |-------|-----------|
//! | `DISCONNECTED` | Sensor activated but not connected |
//! | `LOW_BATTERY` | Battery level below 15% |
//! | `EXPIRED` | Past the expiration date (14 days after activation) |
//! | `EXPIRING_SOON` | Less than 24 hours remaining |
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use glucowatch_core::mock::{MockHistoryStore, MockSnapshotStore, MockVibrator};
//! use glucowatch_core::{GlucoseReading, Monitor};
//! use time::OffsetDateTime;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Monitor::builder()
//!         .snapshot_store(Arc::new(MockSnapshotStore::new()))
//!         .history_store(Arc::new(MockHistoryStore::new()))
//!         .vibrator(Arc::new(MockVibrator::new()))
//!         .build()?;
//!
//!     let status = monitor.status().activate("SN-1", Some("u1")).await;
//!     assert!(status.is_connected);
//!
//!     let reading = GlucoseReading::new("u1", 250.0, OffsetDateTime::now_utc());
//!     if let Some(alert) = monitor.process_reading(reading) {
//!         monitor.acknowledge(&alert).await;
//!     }
//!     Ok(())
//! }
//! ```

pub mod battery;
pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod history;
pub mod ledger;
pub mod mock;
pub mod monitor;
pub mod reading_alerts;
pub mod status;
pub mod thresholds;
pub mod traits;

pub use battery::WearTimeEstimator;
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchState, DispatcherConfig, NotificationDispatcher};
pub use error::{Error, Result};
pub use events::{AlertCallback, EventBus, EventReceiver, EventSender, MonitorEvent};
pub use history::{HistoryReconciler, ReconcileOutcome};
pub use ledger::AlertLedger;
pub use monitor::{Monitor, MonitorBuilder};
pub use reading_alerts::ReadingAlertEngine;
pub use status::{ScanOutcome, SensorPolicy, SensorScan, SensorStatusEngine};
pub use thresholds::{GlucoseThresholds, ThresholdConfig};
pub use traits::{
    AlertPrompt, AudioLoader, AudioPlayback, BatteryEstimator, HistoryStore, ReadingUpdate,
    RemoteMirror, SnapshotStore, Vibrator,
};

// Re-export from glucowatch-types
pub use glucowatch_types::{
    GlucoseAlert, GlucoseAlertType, GlucoseReading, ReadingSource, SensorAlert, SensorAlertType,
    SensorStatus,
};
