//! Alert ledger.
//!
//! Append-only, in-memory record of sensor-health alerts with read/unread
//! state. Recording applies a de-duplication gate: an alert is dropped if an
//! unread alert of the same type was created within the window preceding it.
//!
//! # De-duplication window
//!
//! For a new alert stamped `t`, an existing alert of the same type blocks it
//! when it is unread and its timestamp lies in `[t - window, t)`. The upper
//! bound is exclusive, so an alert of the same type stamped at exactly the
//! same instant is not a duplicate. Such an alert has the same identity
//! (type + instant), and the later call replaces the earlier entry.

use time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use glucowatch_types::{SensorAlert, SensorAlertType};

use crate::events::{EventBus, MonitorEvent};

/// Default de-duplication window.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::hours(1);

/// In-memory ledger of sensor alerts.
#[derive(Debug)]
pub struct AlertLedger {
    alerts: RwLock<Vec<SensorAlert>>,
    dedup_window: Duration,
    events: EventBus,
}

impl AlertLedger {
    /// Create an empty ledger announcing on `events`.
    pub fn new(events: EventBus) -> Self {
        Self::with_dedup_window(events, DEFAULT_DEDUP_WINDOW)
    }

    /// Create an empty ledger with a custom de-duplication window.
    pub fn with_dedup_window(events: EventBus, dedup_window: Duration) -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
            dedup_window,
            events,
        }
    }

    /// The de-duplication window.
    pub fn dedup_window(&self) -> Duration {
        self.dedup_window
    }

    /// Record an alert unless it duplicates a recent unread one.
    ///
    /// Returns `true` if the alert was recorded (and announced).
    pub async fn record(&self, alert: SensorAlert) -> bool {
        {
            let mut alerts = self.alerts.write().await;

            if self.is_duplicate(&alerts, &alert) {
                debug!(
                    "Suppressing duplicate {} alert within {} window",
                    alert.alert_type.as_str(),
                    self.dedup_window
                );
                return false;
            }

            match alerts.iter_mut().find(|existing| existing.id == alert.id) {
                Some(existing) => *existing = alert.clone(),
                None => alerts.push(alert.clone()),
            }
        }

        info!("Sensor alert: {} - {}", alert.alert_type, alert.message);
        self.events.send(MonitorEvent::SensorAlert { alert });
        true
    }

    fn is_duplicate(&self, alerts: &[SensorAlert], alert: &SensorAlert) -> bool {
        let window_start = alert.timestamp - self.dedup_window;
        alerts.iter().any(|existing| {
            existing.alert_type == alert.alert_type
                && !existing.is_read
                && existing.timestamp >= window_start
                && existing.timestamp < alert.timestamp
        })
    }

    /// Unread alerts in insertion order.
    pub async fn unread(&self) -> Vec<SensorAlert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|alert| !alert.is_read)
            .cloned()
            .collect()
    }

    /// All alerts in insertion order.
    pub async fn all(&self) -> Vec<SensorAlert> {
        self.alerts.read().await.clone()
    }

    /// Number of unread alerts.
    pub async fn unread_count(&self) -> usize {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|alert| !alert.is_read)
            .count()
    }

    /// Number of alerts of `alert_type` in the ledger.
    pub async fn count_of(&self, alert_type: SensorAlertType) -> usize {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|alert| alert.alert_type == alert_type)
            .count()
    }

    /// Total number of alerts.
    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    /// Whether the ledger is empty.
    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }

    /// Mark an alert as read.
    ///
    /// Unknown ids are ignored. Returns `true` if an unread alert was flipped.
    pub async fn mark_read(&self, id: &str) -> bool {
        let flipped = {
            let mut alerts = self.alerts.write().await;
            match alerts.iter_mut().find(|alert| alert.id == id) {
                Some(alert) if !alert.is_read => {
                    alert.is_read = true;
                    true
                }
                _ => false,
            }
        };

        if flipped {
            self.events.send(MonitorEvent::AlertRead { id: id.to_string() });
        }
        flipped
    }

    /// Remove every alert. This cannot be undone.
    ///
    /// Returns the number of alerts removed.
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut alerts = self.alerts.write().await;
            let removed = alerts.len();
            alerts.clear();
            removed
        };

        info!("Cleared {} sensor alert(s)", removed);
        self.events.send(MonitorEvent::AlertsCleared);
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn t0() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)
    }

    fn alert(alert_type: SensorAlertType, at: OffsetDateTime) -> SensorAlert {
        SensorAlert::new(alert_type, "test", at)
    }

    #[tokio::test]
    async fn test_duplicate_within_window_is_dropped() {
        let ledger = AlertLedger::new(EventBus::default());

        assert!(ledger.record(alert(SensorAlertType::LowBattery, t0())).await);
        assert!(
            !ledger
                .record(alert(SensorAlertType::LowBattery, t0() + Duration::minutes(59)))
                .await
        );
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_window_lower_bound_is_inclusive() {
        let ledger = AlertLedger::new(EventBus::default());

        ledger.record(alert(SensorAlertType::Disconnected, t0())).await;
        assert!(
            !ledger
                .record(alert(SensorAlertType::Disconnected, t0() + Duration::hours(1)))
                .await
        );
        assert!(
            ledger
                .record(alert(
                    SensorAlertType::Disconnected,
                    t0() + Duration::hours(1) + Duration::nanoseconds(1)
                ))
                .await
        );
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_same_instant_replaces_entry() {
        let ledger = AlertLedger::new(EventBus::default());

        ledger.record(alert(SensorAlertType::Expired, t0())).await;
        let mut later = alert(SensorAlertType::Expired, t0());
        later.message = "later".to_string();

        assert!(ledger.record(later).await);
        let all = ledger.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "later");
    }

    #[tokio::test]
    async fn test_read_alert_does_not_block() {
        let ledger = AlertLedger::new(EventBus::default());

        let first = alert(SensorAlertType::LowBattery, t0());
        let id = first.id.clone();
        ledger.record(first).await;
        assert!(ledger.mark_read(&id).await);

        assert!(
            ledger
                .record(alert(SensorAlertType::LowBattery, t0() + Duration::minutes(5)))
                .await
        );
        assert_eq!(ledger.len().await, 2);
        assert_eq!(ledger.unread_count().await, 1);
    }

    #[tokio::test]
    async fn test_different_types_are_independent() {
        let ledger = AlertLedger::new(EventBus::default());

        ledger.record(alert(SensorAlertType::LowBattery, t0())).await;
        ledger.record(alert(SensorAlertType::Disconnected, t0())).await;
        assert_eq!(ledger.unread().await.len(), 2);
        assert_eq!(ledger.count_of(SensorAlertType::LowBattery).await, 1);
    }

    #[tokio::test]
    async fn test_unread_preserves_insertion_order() {
        let ledger = AlertLedger::new(EventBus::default());

        ledger.record(alert(SensorAlertType::Disconnected, t0())).await;
        ledger
            .record(alert(SensorAlertType::LowBattery, t0() + Duration::seconds(1)))
            .await;
        ledger
            .record(alert(SensorAlertType::Expired, t0() + Duration::seconds(2)))
            .await;

        let types: Vec<_> = ledger.unread().await.iter().map(|a| a.alert_type).collect();
        assert_eq!(
            types,
            vec![
                SensorAlertType::Disconnected,
                SensorAlertType::LowBattery,
                SensorAlertType::Expired
            ]
        );
    }

    #[tokio::test]
    async fn test_mark_read_is_idempotent_and_announces_once() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let ledger = AlertLedger::new(events);

        let a = alert(SensorAlertType::Expired, t0());
        let id = a.id.clone();
        ledger.record(a).await;

        assert!(ledger.mark_read(&id).await);
        assert!(!ledger.mark_read(&id).await);
        assert!(!ledger.mark_read("missing").await);

        assert!(matches!(rx.recv().await.unwrap(), MonitorEvent::SensorAlert { .. }));
        match rx.recv().await.unwrap() {
            MonitorEvent::AlertRead { id: read } => assert_eq!(read, id),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_clear_empties_and_announces() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let ledger = AlertLedger::new(events);

        ledger.record(alert(SensorAlertType::Expired, t0())).await;
        ledger.record(alert(SensorAlertType::LowBattery, t0())).await;

        assert_eq!(ledger.clear().await, 2);
        assert!(ledger.is_empty().await);

        let mut saw_cleared = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, MonitorEvent::AlertsCleared) {
                saw_cleared = true;
            }
        }
        assert!(saw_cleared);
    }

    #[tokio::test]
    async fn test_custom_window() {
        let ledger = AlertLedger::with_dedup_window(EventBus::default(), Duration::minutes(10));
        assert_eq!(ledger.dedup_window(), Duration::minutes(10));

        ledger.record(alert(SensorAlertType::Disconnected, t0())).await;
        assert!(
            ledger
                .record(alert(SensorAlertType::Disconnected, t0() + Duration::minutes(11)))
                .await
        );
    }
}
