//! The monitor service object.
//!
//! [`Monitor`] wires the engines together around one [`EventBus`] and one
//! [`Clock`]. It is built once at startup with [`MonitorBuilder`] and shared
//! by handle; there are no global singletons.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use glucowatch_core::mock::{MockHistoryStore, MockSnapshotStore, MockVibrator};
//! use glucowatch_core::Monitor;
//!
//! #[tokio::main]
//! async fn main() {
//!     let monitor = Monitor::builder()
//!         .snapshot_store(Arc::new(MockSnapshotStore::new()))
//!         .history_store(Arc::new(MockHistoryStore::new()))
//!         .vibrator(Arc::new(MockVibrator::new()))
//!         .build()
//!         .unwrap();
//!
//!     monitor.status().activate("SN-1", Some("u1")).await;
//!     assert!(monitor.status().has_active_sensor().await);
//! }
//! ```

use std::sync::Arc;

use glucowatch_types::{GlucoseAlert, GlucoseReading};

use crate::clock::{Clock, SystemClock};
use crate::dispatcher::{DispatcherConfig, NotificationDispatcher};
use crate::error::{Error, Result};
use crate::events::{AlertCallback, DEFAULT_EVENT_CAPACITY, EventBus, EventReceiver};
use crate::history::{HistoryReconciler, ReconcileOutcome};
use crate::ledger::AlertLedger;
use crate::reading_alerts::ReadingAlertEngine;
use crate::status::{SensorPolicy, SensorStatusEngine};
use crate::thresholds::{GlucoseThresholds, ThresholdConfig};
use crate::traits::{
    AlertPrompt, AudioLoader, BatteryEstimator, HistoryStore, RemoteMirror, SnapshotStore,
    Vibrator,
};

/// Sensor and glucose monitoring service.
#[derive(Debug, Clone)]
pub struct Monitor {
    events: EventBus,
    ledger: Arc<AlertLedger>,
    status: Arc<SensorStatusEngine>,
    dispatcher: Arc<NotificationDispatcher>,
    readings: Arc<ReadingAlertEngine>,
}

impl Monitor {
    /// Start building a monitor.
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::new()
    }

    /// The event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to monitor events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The sensor-health alert ledger.
    pub fn ledger(&self) -> &Arc<AlertLedger> {
        &self.ledger
    }

    /// The sensor status engine.
    pub fn status(&self) -> &Arc<SensorStatusEngine> {
        &self.status
    }

    /// The notification dispatcher.
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// The reading alert engine.
    pub fn readings(&self) -> &Arc<ReadingAlertEngine> {
        &self.readings
    }

    /// Classify a reading and raise an alert on breach.
    pub fn process_reading(&self, reading: GlucoseReading) -> Option<GlucoseAlert> {
        self.readings.process_reading(reading)
    }

    /// Acknowledge the active glucose alert.
    pub async fn acknowledge(&self, alert: &GlucoseAlert) -> Option<ReconcileOutcome> {
        self.readings.acknowledge(alert).await
    }

    /// Register the in-process alert presentation callback.
    pub fn register_alert_callback(&self, callback: AlertCallback) {
        self.events.register_alert_callback(callback);
    }

    /// Remove the alert presentation callback.
    pub fn unregister_alert_callback(&self) {
        self.events.unregister_alert_callback();
    }
}

/// Builder for [`Monitor`].
///
/// A snapshot store, a history store and a vibrator are required; every other
/// collaborator is optional.
pub struct MonitorBuilder {
    policy: SensorPolicy,
    thresholds: ThresholdConfig,
    dispatcher: DispatcherConfig,
    event_capacity: usize,
    clock: Arc<dyn Clock>,
    snapshot_store: Option<Arc<dyn SnapshotStore>>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    history: Option<Arc<dyn HistoryStore>>,
    audio: Option<Arc<dyn AudioLoader>>,
    vibrator: Option<Arc<dyn Vibrator>>,
    prompt: Option<Arc<dyn AlertPrompt>>,
    estimator: Option<Arc<dyn BatteryEstimator>>,
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self {
            policy: SensorPolicy::default(),
            thresholds: ThresholdConfig::default(),
            dispatcher: DispatcherConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            clock: Arc::new(SystemClock),
            snapshot_store: None,
            mirror: None,
            history: None,
            audio: None,
            vibrator: None,
            prompt: None,
            estimator: None,
        }
    }

    pub fn policy(mut self, policy: SensorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn thresholds(mut self, thresholds: ThresholdConfig) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn dispatcher_config(mut self, config: DispatcherConfig) -> Self {
        self.dispatcher = config;
        self
    }

    /// Broadcast buffer size for the event bus.
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshot_store = Some(store);
        self
    }

    pub fn remote_mirror(mut self, mirror: Arc<dyn RemoteMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn history_store(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn audio_loader(mut self, audio: Arc<dyn AudioLoader>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = Some(vibrator);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn AlertPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Replace the wear-time battery estimator.
    pub fn battery_estimator(mut self, estimator: Arc<dyn BatteryEstimator>) -> Self {
        self.estimator = Some(estimator);
        self
    }

    /// Validate the configuration and wire the engines.
    ///
    /// Spawns background tasks, so this must be called within a Tokio runtime.
    pub fn build(self) -> Result<Monitor> {
        self.policy.validate()?;
        self.thresholds.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event capacity must be > 0"));
        }
        let store = self
            .snapshot_store
            .ok_or_else(|| Error::invalid_config("a snapshot store is required"))?;
        let history = self
            .history
            .ok_or_else(|| Error::invalid_config("a history store is required"))?;
        let vibrator = self
            .vibrator
            .ok_or_else(|| Error::invalid_config("a vibrator is required"))?;

        let events = EventBus::new(self.event_capacity);
        let ledger = Arc::new(AlertLedger::with_dedup_window(
            events.clone(),
            self.policy.dedup_window(),
        ));

        let mut status = SensorStatusEngine::new(
            self.policy,
            Arc::clone(&self.clock),
            Arc::clone(&ledger),
            events.clone(),
            store,
            self.mirror,
        );
        if let Some(estimator) = self.estimator {
            status = status.with_estimator(estimator);
        }

        let dispatcher = Arc::new(NotificationDispatcher::new(
            self.dispatcher,
            self.audio,
            vibrator,
        ));

        let mut readings = ReadingAlertEngine::new(
            GlucoseThresholds::new(self.thresholds),
            Arc::clone(&dispatcher),
            HistoryReconciler::new(history),
            events.clone(),
            self.clock,
        );
        if let Some(prompt) = self.prompt {
            readings = readings.with_prompt(prompt);
        }

        Ok(Monitor {
            events,
            ledger,
            status: Arc::new(status),
            dispatcher,
            readings: Arc::new(readings),
        })
    }
}
