//! Monitor event bus.
//!
//! Engines announce state changes on a single typed broadcast channel. The
//! presentation layer subscribes to [`MonitorEvent`]s; it can also register a
//! synchronous callback that receives glucose alerts in-process (the alert
//! modal), in which case the native prompt fallback is not used.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use glucowatch_types::{GlucoseAlert, SensorAlert, SensorStatus};

/// Events announced by the monitor engines.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum MonitorEvent {
    /// A sensor-health alert was recorded in the ledger.
    SensorAlert { alert: SensorAlert },
    /// A sensor was activated.
    SensorActivated { status: SensorStatus },
    /// The sensor connected or disconnected.
    ConnectionStatusChanged { connected: bool },
    /// A ledger alert was marked as read.
    AlertRead { id: String },
    /// The ledger was emptied.
    AlertsCleared,
    /// A glucose reading breached a threshold.
    GlucoseAlert { alert: GlucoseAlert },
    /// A glucose alert was acknowledged and notification stopped.
    GlucoseAlertAcknowledged { id: Uuid },
    /// An acknowledged glucose alert was written to history.
    ///
    /// `record_id` is `None` when the write failed.
    GlucoseAlertCommitted { id: Uuid, record_id: Option<String> },
}

/// Sender for monitor events.
pub type EventSender = broadcast::Sender<MonitorEvent>;

/// Receiver for monitor events.
pub type EventReceiver = broadcast::Receiver<MonitorEvent>;

/// Callback invoked synchronously when a glucose alert must be presented.
pub type AlertCallback = Arc<dyn Fn(&GlucoseAlert) + Send + Sync>;

/// Default broadcast buffer size.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// Event bus connecting the engines to each other and to subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: EventSender,
    alert_callback: Arc<RwLock<Option<AlertCallback>>>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            alert_callback: Arc::new(RwLock::new(None)),
        }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: MonitorEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Register the alert-modal callback, replacing any previous one.
    pub fn register_alert_callback(&self, callback: AlertCallback) {
        *self
            .alert_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    /// Remove the alert-modal callback.
    pub fn unregister_alert_callback(&self) {
        *self
            .alert_callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether an alert-modal callback is registered.
    pub fn has_alert_callback(&self) -> bool {
        self.alert_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver an alert through the registered callback.
    ///
    /// Returns `false` without doing anything if no callback is registered.
    pub fn deliver_alert(&self, alert: &GlucoseAlert) -> bool {
        // Clone out of the lock so the callback may (un)register itself.
        let callback = self
            .alert_callback
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match callback {
            Some(callback) => {
                callback(alert);
                true
            }
            None => false,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("receivers", &self.receiver_count())
            .field("has_alert_callback", &self.has_alert_callback())
            .finish()
    }
}
