//! Reading alert engine.
//!
//! Classifies incoming glucose readings, raises a [`GlucoseAlert`] on a
//! breach, and keeps the notification running until the alert is
//! acknowledged. Exactly one alert is active at a time: a new breach replaces
//! the active alert rather than queuing behind it. The replaced alert's
//! reading is still written to history as an alert, without notification.
//!
//! Presentation goes through the event bus's alert callback when one is
//! registered. Otherwise the engine falls back to the native
//! [`AlertPrompt`], which acknowledges the alert once the user confirms.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, warn};

use glucowatch_types::{GlucoseAlert, GlucoseAlertType, GlucoseReading};

use crate::clock::Clock;
use crate::dispatcher::NotificationDispatcher;
use crate::events::{EventBus, MonitorEvent};
use crate::history::{HistoryReconciler, ReconcileOutcome};
use crate::thresholds::GlucoseThresholds;
use crate::traits::AlertPrompt;

/// Classifies readings and owns the active glucose alert.
pub struct ReadingAlertEngine {
    thresholds: GlucoseThresholds,
    dispatcher: Arc<NotificationDispatcher>,
    reconciler: HistoryReconciler,
    prompt: Option<Arc<dyn AlertPrompt>>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    active: Mutex<Option<GlucoseAlert>>,
}

impl ReadingAlertEngine {
    pub fn new(
        thresholds: GlucoseThresholds,
        dispatcher: Arc<NotificationDispatcher>,
        reconciler: HistoryReconciler,
        events: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            thresholds,
            dispatcher,
            reconciler,
            prompt: None,
            events,
            clock,
            active: Mutex::new(None),
        }
    }

    /// Set the native prompt used when no alert callback is registered.
    pub fn with_prompt(mut self, prompt: Arc<dyn AlertPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// The thresholds in use.
    pub fn thresholds(&self) -> &GlucoseThresholds {
        &self.thresholds
    }

    /// Classify a reading. Malformed readings yield `None`.
    pub fn classify(&self, reading: &GlucoseReading) -> Option<GlucoseAlertType> {
        self.thresholds.classify(reading)
    }

    /// The alert currently driving notification, if any.
    pub fn active_alert(&self) -> Option<GlucoseAlert> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Process one reading.
    ///
    /// Returns the raised alert on a breach. Must be called within a Tokio
    /// runtime.
    pub fn process_reading(self: &Arc<Self>, reading: GlucoseReading) -> Option<GlucoseAlert> {
        if !reading.has_valid_value() {
            debug!("Ignoring malformed glucose reading ({})", reading.value);
            return None;
        }
        let alert_type = self.classify(&reading)?;
        let alert = GlucoseAlert::new(reading, alert_type, self.clock.now());

        let replaced = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(alert.clone());
        if let Some(previous) = replaced {
            info!("Glucose alert {} replaced by {}", previous.id, alert.id);
            self.spawn_commit(previous);
        }

        warn!("{}: {}", alert.title(), alert.message());
        self.dispatcher.trigger();
        self.events.send(MonitorEvent::GlucoseAlert {
            alert: alert.clone(),
        });

        if !self.events.deliver_alert(&alert) {
            self.spawn_prompt(&alert);
        }
        Some(alert)
    }

    fn spawn_commit(&self, superseded: GlucoseAlert) {
        let reconciler = self.reconciler.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = reconciler.commit(&superseded).await;
            events.send(MonitorEvent::GlucoseAlertCommitted {
                id: superseded.id,
                record_id: outcome.id().map(str::to_string),
            });
        });
    }

    fn spawn_prompt(self: &Arc<Self>, alert: &GlucoseAlert) {
        let Some(prompt) = self.prompt.clone() else {
            warn!("No alert callback or prompt available; alert {} awaits acknowledgment", alert.id);
            return;
        };

        let engine = Arc::clone(self);
        let alert = alert.clone();
        tokio::spawn(async move {
            match prompt.confirm(&alert).await {
                Ok(()) => {
                    engine.acknowledge(&alert).await;
                }
                Err(e) => error!("Alert prompt failed for {}: {}", alert.id, e),
            }
        });
    }

    /// Acknowledge the active alert.
    ///
    /// Stops notification and commits the reading to history. Acknowledging
    /// an alert that is not the active one (including a second acknowledgment
    /// of the same alert) does nothing and returns `None`.
    pub async fn acknowledge(&self, alert: &GlucoseAlert) -> Option<ReconcileOutcome> {
        let taken = {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            match active.as_ref() {
                Some(current) if current.id == alert.id => active.take(),
                _ => None,
            }
        };
        let Some(mut acknowledged) = taken else {
            debug!("Ignoring acknowledgment of inactive alert {}", alert.id);
            return None;
        };

        acknowledged.acknowledged = true;
        self.dispatcher.stop();
        info!("Glucose alert {} acknowledged", acknowledged.id);
        self.events.send(MonitorEvent::GlucoseAlertAcknowledged {
            id: acknowledged.id,
        });

        let outcome = self.reconciler.commit(&acknowledged).await;
        self.events.send(MonitorEvent::GlucoseAlertCommitted {
            id: acknowledged.id,
            record_id: outcome.id().map(str::to_string),
        });
        Some(outcome)
    }
}

impl fmt::Debug for ReadingAlertEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadingAlertEngine")
            .field("thresholds", &self.thresholds)
            .field("has_prompt", &self.prompt.is_some())
            .field("active", &self.active_alert().map(|alert| alert.id))
            .finish()
    }
}
