//! Sensor status engine.
//!
//! [`SensorStatusEngine`] owns the canonical in-memory [`SensorStatus`]. Every
//! mutation and every read goes through a single write lock, so a recompute
//! followed by a read is atomic with respect to other writers.
//!
//! Recomputation refreshes the derived flags against the clock, then
//! evaluates alert conditions in a fixed order (disconnected, low battery,
//! expired, expiring soon) and routes each through the [`AlertLedger`]. At
//! most one of expired/expiring-soon fires per pass.
//!
//! Persistence and mirroring are handled by a background writer task. The
//! engine queues the new snapshot and announces events immediately; it never
//! waits for durability. Use [`SensorStatusEngine::flush`] to wait for queued
//! writes at shutdown.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, info, warn};

use glucowatch_types::{SensorAlert, SensorAlertType, SensorStatus};

use crate::battery::{DEFAULT_DRAIN_PER_DAY, WearTimeEstimator};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::events::{EventBus, MonitorEvent};
use crate::ledger::AlertLedger;
use crate::traits::{BatteryEstimator, RemoteMirror, SnapshotStore};

/// Snapshot store key holding the serialized status.
pub const STATUS_KEY: &str = "sensor_status";

/// Remote mirror collection holding per-user status records.
pub const STATUS_COLLECTION: &str = "sensor_status";

/// Wear-life and alerting policy for a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorPolicy {
    /// Days a sensor can be worn after activation.
    pub wear_days: u32,
    /// Remaining time (hours) below which a sensor is expiring soon.
    pub expiring_soon_hours: u32,
    /// Battery percentage below which the battery is low.
    pub low_battery_threshold: u8,
    /// Window (minutes) in which repeat alerts of one kind are suppressed.
    pub dedup_window_mins: u32,
    /// Placeholder battery drain in percentage points per day of wear.
    pub battery_drain_per_day: u8,
}

impl Default for SensorPolicy {
    fn default() -> Self {
        Self {
            wear_days: 14,
            expiring_soon_hours: 24,
            low_battery_threshold: 15,
            dedup_window_mins: 60,
            battery_drain_per_day: DEFAULT_DRAIN_PER_DAY,
        }
    }
}

impl SensorPolicy {
    /// How long a sensor lasts after activation.
    pub fn wear_duration(&self) -> Duration {
        Duration::days(i64::from(self.wear_days))
    }

    /// Window before expiration in which the sensor is expiring soon.
    pub fn expiring_soon_window(&self) -> Duration {
        Duration::hours(i64::from(self.expiring_soon_hours))
    }

    /// Alert de-duplication window.
    pub fn dedup_window(&self) -> Duration {
        Duration::minutes(i64::from(self.dedup_window_mins))
    }

    /// Validate the policy.
    pub fn validate(&self) -> Result<()> {
        if self.wear_days == 0 {
            return Err(Error::invalid_config("wear_days must be > 0"));
        }
        if self.expiring_soon_window() >= self.wear_duration() {
            return Err(Error::invalid_config(
                "expiring_soon_hours must be shorter than the wear duration",
            ));
        }
        if !(1..=100).contains(&self.low_battery_threshold) {
            return Err(Error::invalid_config(
                "low_battery_threshold must be between 1 and 100",
            ));
        }
        if self.battery_drain_per_day > 100 {
            return Err(Error::invalid_config(
                "battery_drain_per_day must be at most 100",
            ));
        }
        Ok(())
    }
}

/// A successful read from the sensor reader.
///
/// The telemetry bytes are opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorScan {
    /// Serial number reported by the sensor.
    pub serial_number: String,
    /// Raw tag payload, never parsed here.
    pub raw_telemetry: Vec<u8>,
}

impl SensorScan {
    /// A scan carrying only a serial number.
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            raw_telemetry: Vec::new(),
        }
    }
}

/// What a scan did to the engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    /// A new sensor was activated.
    Activated,
    /// The active sensor reconnected.
    Reconnected,
    /// The active sensor was already connected; only the scan time moved.
    Refreshed,
}

#[derive(Debug, Default)]
struct EngineState {
    status: SensorStatus,
    /// Real battery telemetry has been reported since the last activation.
    telemetry_reported: bool,
}

enum WriteCommand {
    Persist(SensorStatus),
    Flush(oneshot::Sender<()>),
}

/// Handle to the background snapshot writers.
///
/// Local snapshot writes and mirror updates run on separate queues, so a
/// slow mirror never holds back the local snapshot. Each queue keeps its
/// own write order.
struct SnapshotWriter {
    local: mpsc::UnboundedSender<WriteCommand>,
    mirror: Option<mpsc::UnboundedSender<WriteCommand>>,
}

impl SnapshotWriter {
    fn spawn(store: Arc<dyn SnapshotStore>, mirror: Option<Arc<dyn RemoteMirror>>) -> Self {
        let (local, mut local_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(command) = local_rx.recv().await {
                match command {
                    WriteCommand::Persist(status) => write_local(store.as_ref(), &status).await,
                    WriteCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Snapshot writer stopped");
        });

        let mirror = mirror.map(|mirror| {
            let (tx, mut rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(command) = rx.recv().await {
                    match command {
                        WriteCommand::Persist(status) => {
                            write_mirror(mirror.as_ref(), &status).await
                        }
                        WriteCommand::Flush(done) => {
                            let _ = done.send(());
                        }
                    }
                }
                debug!("Mirror writer stopped");
            });
            tx
        });

        Self { local, mirror }
    }

    fn persist(&self, status: SensorStatus) {
        if let Some(mirror) = &self.mirror
            && mirror.send(WriteCommand::Persist(status.clone())).is_err()
        {
            warn!("Mirror writer is gone, status not mirrored");
        }
        if self.local.send(WriteCommand::Persist(status)).is_err() {
            warn!("Snapshot writer is gone, status not persisted");
        }
    }

    /// Wait for the local queue, then the mirror queue, to drain.
    async fn flush(&self) {
        for queue in std::iter::once(&self.local).chain(self.mirror.as_ref()) {
            let (done_tx, done_rx) = oneshot::channel();
            if queue.send(WriteCommand::Flush(done_tx)).is_ok() {
                let _ = done_rx.await;
            }
        }
    }
}

async fn write_local(store: &dyn SnapshotStore, status: &SensorStatus) {
    match serde_json::to_vec(status) {
        Ok(blob) => {
            if let Err(e) = store.set(STATUS_KEY, &blob).await {
                warn!("Failed to persist sensor status: {}", e);
            }
        }
        Err(e) => warn!("Failed to serialize sensor status: {}", e),
    }
}

async fn write_mirror(mirror: &dyn RemoteMirror, status: &SensorStatus) {
    let Some(user_id) = status.user_id.as_deref() else {
        return;
    };
    let fields = match serde_json::to_value(status) {
        Ok(fields) => fields,
        Err(e) => {
            warn!("Failed to serialize sensor status for mirror: {}", e);
            return;
        }
    };
    if let Err(e) = mirror.update_record(STATUS_COLLECTION, user_id, fields).await {
        warn!("Failed to mirror sensor status for {}: {}", user_id, e);
    }
}

/// Owner of the sensor status and sole producer of sensor-health alerts.
pub struct SensorStatusEngine {
    state: RwLock<EngineState>,
    policy: SensorPolicy,
    clock: Arc<dyn Clock>,
    estimator: Arc<dyn BatteryEstimator>,
    ledger: Arc<AlertLedger>,
    events: EventBus,
    store: Arc<dyn SnapshotStore>,
    mirror: Option<Arc<dyn RemoteMirror>>,
    writer: SnapshotWriter,
}

impl SensorStatusEngine {
    /// Create an engine with default (empty) status.
    ///
    /// Spawns the snapshot writer, so this must be called within a Tokio runtime.
    pub fn new(
        policy: SensorPolicy,
        clock: Arc<dyn Clock>,
        ledger: Arc<AlertLedger>,
        events: EventBus,
        store: Arc<dyn SnapshotStore>,
        mirror: Option<Arc<dyn RemoteMirror>>,
    ) -> Self {
        let writer = SnapshotWriter::spawn(Arc::clone(&store), mirror.clone());
        Self {
            state: RwLock::new(EngineState::default()),
            policy,
            clock,
            estimator: Arc::new(WearTimeEstimator::new(policy.battery_drain_per_day)),
            ledger,
            events,
            store,
            mirror,
            writer,
        }
    }

    /// Replace the placeholder battery estimator.
    pub fn with_estimator(mut self, estimator: Arc<dyn BatteryEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &SensorPolicy {
        &self.policy
    }

    /// The alert ledger fed by this engine.
    pub fn ledger(&self) -> &Arc<AlertLedger> {
        &self.ledger
    }

    /// Load the last known status.
    ///
    /// Tries the snapshot store first, then the remote mirror record for
    /// `user_id`. Returns `true` if a snapshot was restored. Failures are
    /// logged and leave the engine at its defaults.
    pub async fn restore(&self, user_id: Option<&str>) -> bool {
        let restored = match self.load_local().await {
            Some(status) => Some(status),
            None => match user_id {
                Some(user_id) => self.load_remote(user_id).await,
                None => None,
            },
        };

        let Some(status) = restored else {
            debug!("No sensor status to restore");
            return false;
        };

        let mut state = self.state.write().await;
        info!(
            "Restored sensor status (serial: {})",
            status.serial_number.as_deref().unwrap_or("none")
        );
        state.status = status;
        state.telemetry_reported = false;
        true
    }

    async fn load_local(&self) -> Option<SensorStatus> {
        match self.store.get(STATUS_KEY).await {
            Ok(Some(blob)) => match serde_json::from_slice(&blob) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Discarding undecodable sensor status snapshot: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read sensor status snapshot: {}", e);
                None
            }
        }
    }

    async fn load_remote(&self, user_id: &str) -> Option<SensorStatus> {
        let mirror = self.mirror.as_ref()?;
        match mirror.read_record(STATUS_COLLECTION, user_id).await {
            Ok(Some(record)) => match serde_json::from_value(record) {
                Ok(status) => Some(status),
                Err(e) => {
                    warn!("Discarding undecodable mirrored sensor status: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read mirrored sensor status: {}", e);
                None
            }
        }
    }

    /// Activate a new sensor.
    ///
    /// Replaces any previous sensor. When `user_id` is `None` the previously
    /// registered user is kept.
    pub async fn activate(&self, serial_number: &str, user_id: Option<&str>) -> SensorStatus {
        let now = self.clock.now();
        let snapshot = {
            let mut state = self.state.write().await;
            let user_id = user_id
                .map(str::to_string)
                .or_else(|| state.status.user_id.clone());

            let mut status = SensorStatus::activated(
                serial_number,
                user_id.as_deref(),
                now,
                self.policy.wear_duration(),
            );
            status.battery_level = self.estimator.estimate(&status, now);
            status.refresh(
                now,
                self.policy.expiring_soon_window(),
                self.policy.low_battery_threshold,
            );

            state.status = status;
            state.telemetry_reported = false;
            self.writer.persist(state.status.clone());
            state.status.clone()
        };

        info!("Activated sensor {}", serial_number);
        self.events.send(MonitorEvent::SensorActivated {
            status: snapshot.clone(),
        });
        snapshot
    }

    /// Record a connection change.
    ///
    /// Does nothing if the state is unchanged. `last_scan_time` moves only on
    /// reconnect.
    pub async fn update_connection_status(&self, connected: bool) {
        let now = self.clock.now();
        {
            let mut state = self.state.write().await;
            if state.status.is_connected == connected {
                return;
            }

            state.status.is_connected = connected;
            if connected {
                state.status.last_scan_time = Some(now);
            }
            self.recompute(&mut state, now).await;
            self.writer.persist(state.status.clone());
        }

        info!(
            "Sensor {}",
            if connected { "connected" } else { "disconnected" }
        );
        self.events
            .send(MonitorEvent::ConnectionStatusChanged { connected });
    }

    /// Handle a successful scan from the sensor reader.
    ///
    /// A different serial, or no activated sensor, activates. Scanning the
    /// activated serial marks it connected and moves its scan time to now,
    /// even once it has expired: only a new serial starts a new wear period.
    pub async fn record_scan(&self, scan: &SensorScan, user_id: Option<&str>) -> ScanOutcome {
        let now = self.clock.now();
        let reconnected = {
            let mut state = self.state.write().await;
            self.recompute(&mut state, now).await;

            let same_sensor = state.status.is_activated()
                && state.status.serial_number.as_deref() == Some(scan.serial_number.as_str());
            if !same_sensor {
                None
            } else {
                let reconnected = !state.status.is_connected;
                state.status.is_connected = true;
                state.status.last_scan_time = Some(now);
                self.recompute(&mut state, now).await;
                self.writer.persist(state.status.clone());
                Some(reconnected)
            }
        };

        match reconnected {
            None => {
                self.activate(&scan.serial_number, user_id).await;
                ScanOutcome::Activated
            }
            Some(true) => {
                self.events
                    .send(MonitorEvent::ConnectionStatusChanged { connected: true });
                ScanOutcome::Reconnected
            }
            Some(false) => ScanOutcome::Refreshed,
        }
    }

    /// Record a real battery reading, clamped to 100.
    ///
    /// The placeholder estimator is not consulted again until the next
    /// activation.
    pub async fn report_battery(&self, level: u8) -> SensorStatus {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        state.status.battery_level = Some(level.min(100));
        state.telemetry_reported = true;
        self.recompute(&mut state, now).await;
        self.writer.persist(state.status.clone());
        state.status.clone()
    }

    /// Current status with derived flags recomputed against now.
    pub async fn get_status(&self) -> SensorStatus {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let before = state.status.clone();
        self.recompute(&mut state, now).await;
        if state.status != before {
            self.writer.persist(state.status.clone());
        }
        state.status.clone()
    }

    /// Whether an activated, unexpired sensor is present.
    pub async fn has_active_sensor(&self) -> bool {
        self.get_status().await.has_active_sensor()
    }

    /// Run a recompute pass and return the number of alerts recorded.
    pub async fn tick(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.write().await;
        let before = state.status.clone();
        let recorded = self.recompute(&mut state, now).await;
        if state.status != before {
            self.writer.persist(state.status.clone());
        }
        recorded
    }

    /// Wait until every queued snapshot write has completed.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    /// Refresh derived flags and record any alerts. Returns alerts recorded.
    async fn recompute(&self, state: &mut EngineState, now: OffsetDateTime) -> usize {
        let status = &mut state.status;
        if !state.telemetry_reported && status.is_activated() {
            status.battery_level = self.estimator.estimate(status, now);
        }
        status.refresh(
            now,
            self.policy.expiring_soon_window(),
            self.policy.low_battery_threshold,
        );

        let mut recorded = 0;
        for alert in self.pending_alerts(status, now) {
            if self.ledger.record(alert).await {
                recorded += 1;
            }
        }
        recorded
    }

    fn pending_alerts(&self, status: &SensorStatus, now: OffsetDateTime) -> Vec<SensorAlert> {
        if !status.is_activated() {
            return Vec::new();
        }
        let serial = status.serial_number.as_deref().unwrap_or("unknown");
        let mut alerts = Vec::new();

        if !status.is_connected {
            alerts.push(SensorAlert::new(
                SensorAlertType::Disconnected,
                format!("Sensor {} is disconnected", serial),
                now,
            ));
        }
        if status.has_low_battery() {
            alerts.push(SensorAlert::new(
                SensorAlertType::LowBattery,
                format!(
                    "Sensor battery is low ({}%)",
                    status.battery_level.unwrap_or_default()
                ),
                now,
            ));
        }
        if status.is_expired() {
            alerts.push(SensorAlert::new(
                SensorAlertType::Expired,
                format!("Sensor {} has expired and must be replaced", serial),
                now,
            ));
        } else if status.is_expiring_soon() {
            let hours = status
                .time_remaining(now)
                .map(|remaining| remaining.whole_hours())
                .unwrap_or_default();
            alerts.push(SensorAlert::new(
                SensorAlertType::ExpiringSoon,
                format!("Sensor {} expires in {} hours", serial, hours),
                now,
            ));
        }
        alerts
    }
}

impl fmt::Debug for SensorStatusEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorStatusEngine")
            .field("policy", &self.policy)
            .field("has_mirror", &self.mirror.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::mock::{MockRemoteMirror, MockSnapshotStore};

    struct Harness {
        clock: Arc<ManualClock>,
        store: Arc<MockSnapshotStore>,
        mirror: Arc<MockRemoteMirror>,
        events: EventBus,
        engine: SensorStatusEngine,
    }

    fn t0() -> OffsetDateTime {
        OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)
    }

    fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(MockSnapshotStore::new());
        let mirror = Arc::new(MockRemoteMirror::new());
        let events = EventBus::default();
        let policy = SensorPolicy::default();
        let ledger = Arc::new(AlertLedger::with_dedup_window(
            events.clone(),
            policy.dedup_window(),
        ));
        let engine = SensorStatusEngine::new(
            policy,
            clock.clone(),
            ledger,
            events.clone(),
            store.clone(),
            Some(mirror.clone()),
        );
        Harness {
            clock,
            store,
            mirror,
            events,
            engine,
        }
    }

    #[test]
    fn test_policy_defaults_and_validation() {
        let policy = SensorPolicy::default();
        assert_eq!(policy.wear_duration(), Duration::days(14));
        assert_eq!(policy.expiring_soon_window(), Duration::hours(24));
        assert_eq!(policy.dedup_window(), Duration::hours(1));
        assert!(policy.validate().is_ok());

        let zero_wear = SensorPolicy {
            wear_days: 0,
            ..SensorPolicy::default()
        };
        assert!(zero_wear.validate().is_err());

        let bad_battery = SensorPolicy {
            low_battery_threshold: 0,
            ..SensorPolicy::default()
        };
        assert!(bad_battery.validate().is_err());

        let window_too_long = SensorPolicy {
            wear_days: 1,
            expiring_soon_hours: 24,
            ..SensorPolicy::default()
        };
        assert!(window_too_long.validate().is_err());
    }

    #[tokio::test]
    async fn test_activate_then_get_status() {
        let h = harness();
        let mut rx = h.events.subscribe();

        h.engine.activate("SN-1", Some("u1")).await;
        let status = h.engine.get_status().await;

        assert!(status.is_connected);
        assert!(!status.is_expired());
        assert!(!status.is_expiring_soon());
        assert_eq!(status.expiration_date, Some(t0() + Duration::days(14)));
        assert_eq!(status.last_scan_time, Some(t0()));
        assert_eq!(status.battery_level, Some(100));
        assert!(h.engine.has_active_sensor().await);

        match rx.recv().await.unwrap() {
            MonitorEvent::SensorActivated { status } => {
                assert_eq!(status.serial_number.as_deref(), Some("SN-1"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_activate_persists_and_mirrors() {
        let h = harness();
        h.engine.activate("SN-1", Some("u1")).await;
        h.engine.flush().await;

        let blob = h.store.get(STATUS_KEY).await.unwrap().unwrap();
        let persisted: SensorStatus = serde_json::from_slice(&blob).unwrap();
        assert_eq!(persisted.serial_number.as_deref(), Some("SN-1"));

        let mirrored = h.mirror.record(STATUS_COLLECTION, "u1").await.unwrap();
        assert_eq!(mirrored["serial_number"], "SN-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_mirror_does_not_delay_local_snapshot() {
        let h = harness();
        h.mirror.set_latency(std::time::Duration::from_secs(60));

        h.engine.activate("SN-1", Some("u1")).await;
        h.engine.update_connection_status(false).await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;

        assert_eq!(h.store.set_count(), 2);
        assert_eq!(h.mirror.update_count(), 0);

        h.engine.flush().await;
        assert_eq!(h.mirror.update_count(), 2);
        let mirrored = h.mirror.record(STATUS_COLLECTION, "u1").await.unwrap();
        assert_eq!(mirrored["is_connected"], false);
    }

    #[tokio::test]
    async fn test_mirror_failure_does_not_roll_back() {
        let h = harness();
        h.mirror.set_should_fail(true);
        h.store.set_should_fail(true);

        let status = h.engine.activate("SN-1", Some("u1")).await;
        h.engine.flush().await;

        assert!(status.is_connected);
        assert_eq!(
            h.engine.get_status().await.serial_number.as_deref(),
            Some("SN-1")
        );
    }

    #[tokio::test]
    async fn test_expiring_soon_scenario() {
        let h = harness();
        h.engine.activate("SN-1", None).await;

        h.clock.advance(Duration::days(13) + Duration::hours(1));
        let status = h.engine.get_status().await;

        assert!(status.is_expiring_soon());
        assert!(!status.is_expired());
        assert_eq!(
            h.engine
                .ledger()
                .count_of(SensorAlertType::ExpiringSoon)
                .await,
            1
        );
    }

    #[tokio::test]
    async fn test_expired_takes_precedence() {
        let h = harness();
        h.engine.activate("SN-1", None).await;

        h.clock.advance(Duration::days(15));
        let status = h.engine.get_status().await;

        assert!(status.is_expired());
        assert!(!status.is_expiring_soon());
        assert!(!status.has_active_sensor());
        let ledger = h.engine.ledger();
        assert_eq!(ledger.count_of(SensorAlertType::Expired).await, 1);
        assert_eq!(ledger.count_of(SensorAlertType::ExpiringSoon).await, 0);
        // 100 - 6 * 15 = 10
        assert_eq!(ledger.count_of(SensorAlertType::LowBattery).await, 1);
    }

    #[tokio::test]
    async fn test_update_connection_status_is_idempotent() {
        let h = harness();
        h.engine.activate("SN-1", None).await;
        let mut rx = h.events.subscribe();

        h.engine.update_connection_status(true).await;
        assert!(rx.try_recv().is_err());

        h.clock.advance(Duration::minutes(5));
        h.engine.update_connection_status(false).await;
        let status = h.engine.get_status().await;
        assert!(!status.is_connected);
        assert_eq!(status.last_scan_time, Some(t0()));
        assert_eq!(
            h.engine
                .ledger()
                .count_of(SensorAlertType::Disconnected)
                .await,
            1
        );

        h.clock.advance(Duration::minutes(5));
        h.engine.update_connection_status(true).await;
        let status = h.engine.get_status().await;
        assert_eq!(status.last_scan_time, Some(t0() + Duration::minutes(10)));
    }

    #[tokio::test]
    async fn test_no_alerts_without_sensor() {
        let h = harness();
        assert_eq!(h.engine.tick().await, 0);
        assert!(h.engine.ledger().is_empty().await);
        assert!(!h.engine.has_active_sensor().await);
    }

    #[tokio::test]
    async fn test_tick_deduplicates_repeat_alerts() {
        let h = harness();
        h.engine.activate("SN-1", None).await;
        h.engine.update_connection_status(false).await;

        h.clock.advance(Duration::minutes(10));
        assert_eq!(h.engine.tick().await, 0);
        h.clock.advance(Duration::minutes(51));
        assert_eq!(h.engine.tick().await, 1);
        assert_eq!(
            h.engine
                .ledger()
                .count_of(SensorAlertType::Disconnected)
                .await,
            2
        );
    }

    #[tokio::test]
    async fn test_report_battery_overrides_estimate() {
        let h = harness();
        h.engine.activate("SN-1", None).await;

        let status = h.engine.report_battery(10).await;
        assert_eq!(status.battery_level, Some(10));
        assert!(status.has_low_battery());

        h.clock.advance(Duration::days(1));
        assert_eq!(h.engine.get_status().await.battery_level, Some(10));

        h.engine.activate("SN-2", None).await;
        assert_eq!(h.engine.get_status().await.battery_level, Some(100));

        h.clock.advance(Duration::days(1));
        assert_eq!(h.engine.get_status().await.battery_level, Some(94));
    }

    #[tokio::test]
    async fn test_report_battery_clamps() {
        let h = harness();
        h.engine.activate("SN-1", None).await;
        assert_eq!(h.engine.report_battery(250).await.battery_level, Some(100));
    }

    #[tokio::test]
    async fn test_record_scan_outcomes() {
        let h = harness();
        let scan = SensorScan::new("SN-1");

        assert_eq!(
            h.engine.record_scan(&scan, Some("u1")).await,
            ScanOutcome::Activated
        );

        h.clock.advance(Duration::hours(1));
        assert_eq!(
            h.engine.record_scan(&scan, None).await,
            ScanOutcome::Refreshed
        );
        assert_eq!(
            h.engine.get_status().await.last_scan_time,
            Some(t0() + Duration::hours(1))
        );

        h.engine.update_connection_status(false).await;
        assert_eq!(
            h.engine.record_scan(&scan, None).await,
            ScanOutcome::Reconnected
        );
        assert!(h.engine.get_status().await.is_connected);

        let status = h.engine.get_status().await;
        assert_eq!(status.user_id.as_deref(), Some("u1"));
        assert_eq!(
            h.engine
                .record_scan(&SensorScan::new("SN-2"), None)
                .await,
            ScanOutcome::Activated
        );
        let status = h.engine.get_status().await;
        assert_eq!(status.serial_number.as_deref(), Some("SN-2"));
        assert_eq!(status.user_id.as_deref(), Some("u1"));
    }

    #[tokio::test]
    async fn test_scan_of_expired_sensor_keeps_it_expired() {
        let h = harness();
        let scan = SensorScan::new("SN-1");
        h.engine.record_scan(&scan, Some("u1")).await;
        h.engine.update_connection_status(false).await;

        h.clock.advance(Duration::days(20));
        assert_eq!(
            h.engine.record_scan(&scan, None).await,
            ScanOutcome::Reconnected
        );

        let status = h.engine.get_status().await;
        assert!(status.is_expired());
        assert!(!status.has_active_sensor());
        assert!(status.is_connected);
        assert_eq!(status.activation_date, Some(t0()));
        assert_eq!(status.expiration_date, Some(t0() + Duration::days(14)));
        assert_eq!(status.last_scan_time, Some(t0() + Duration::days(20)));
        assert_eq!(
            h.engine.ledger().count_of(SensorAlertType::Expired).await,
            1
        );
    }

    #[tokio::test]
    async fn test_restore_prefers_local_snapshot() {
        let h = harness();
        let local = SensorStatus::activated("LOCAL", Some("u1"), t0(), Duration::days(14));
        h.store
            .set(STATUS_KEY, &serde_json::to_vec(&local).unwrap())
            .await
            .unwrap();
        let remote = SensorStatus::activated("REMOTE", Some("u1"), t0(), Duration::days(14));
        h.mirror
            .update_record(STATUS_COLLECTION, "u1", serde_json::to_value(&remote).unwrap())
            .await
            .unwrap();

        assert!(h.engine.restore(Some("u1")).await);
        assert_eq!(
            h.engine.get_status().await.serial_number.as_deref(),
            Some("LOCAL")
        );
    }

    #[tokio::test]
    async fn test_restore_falls_back_to_mirror() {
        let h = harness();
        h.store.set(STATUS_KEY, b"not json").await.unwrap();
        let remote = SensorStatus::activated("REMOTE", Some("u1"), t0(), Duration::days(14));
        h.mirror
            .update_record(STATUS_COLLECTION, "u1", serde_json::to_value(&remote).unwrap())
            .await
            .unwrap();

        assert!(h.engine.restore(Some("u1")).await);
        assert_eq!(
            h.engine.get_status().await.serial_number.as_deref(),
            Some("REMOTE")
        );
    }

    #[tokio::test]
    async fn test_restore_with_nothing_stored() {
        let h = harness();
        assert!(!h.engine.restore(Some("u1")).await);
        assert!(!h.engine.restore(None).await);
        assert_eq!(h.engine.get_status().await, SensorStatus::default());
    }

    #[tokio::test]
    async fn test_get_status_persists_only_on_change() {
        let h = harness();
        h.engine.activate("SN-1", None).await;
        h.engine.flush().await;
        let writes = h.store.set_count();

        h.engine.get_status().await;
        h.engine.flush().await;
        assert_eq!(h.store.set_count(), writes);

        h.clock.advance(Duration::days(1));
        h.engine.get_status().await;
        h.engine.flush().await;
        assert_eq!(h.store.set_count(), writes + 1);
    }
}
