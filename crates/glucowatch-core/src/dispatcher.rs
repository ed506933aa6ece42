//! Notification dispatcher.
//!
//! Drives a repeating vibration pattern and looped alert audio while a glucose
//! alert is unacknowledged.
//!
//! ```text
//! Idle --trigger--> Playing --stop--> Idle
//! ```
//!
//! A trigger while `Playing` is a no-op. There is no timeout: only
//! [`NotificationDispatcher::stop`] leaves `Playing`. `stop` is synchronous
//! and returns only once the vibration loop can no longer fire, so a new
//! alert may be triggered immediately afterwards.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::traits::{AudioLoader, AudioPlayback, Vibrator};

/// Default alert sound.
pub const DEFAULT_AUDIO_RESOURCE: &str = "alarm.mp3";

/// Default vibration pattern: alternating off/on durations in milliseconds.
pub const DEFAULT_VIBRATION_PATTERN: [u64; 4] = [0, 500, 200, 500];

/// Lower bound on the pause between vibration runs.
const MIN_VIBRATION_PERIOD: Duration = Duration::from_millis(100);

/// Load attempts per alert: the first try plus one reload-and-retry.
const AUDIO_ATTEMPTS: u32 = 2;

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Audio resource to loop, or `None` for vibration only.
    pub audio_resource: Option<String>,
    /// Playback volume in `0.0..=1.0`.
    pub volume: f32,
    /// Vibration pattern repeated until stopped.
    pub vibration_pattern: Vec<u64>,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            audio_resource: Some(DEFAULT_AUDIO_RESOURCE.to_string()),
            volume: 1.0,
            vibration_pattern: DEFAULT_VIBRATION_PATTERN.to_vec(),
        }
    }
}

impl DispatcherConfig {
    fn vibration_period(&self) -> Duration {
        let total: u64 = self.vibration_pattern.iter().sum();
        Duration::from_millis(total).max(MIN_VIBRATION_PERIOD)
    }
}

/// Dispatcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// No alert is being signalled.
    Idle,
    /// An alert is being signalled.
    Playing,
}

struct ActiveLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    audio: Option<Box<dyn AudioPlayback>>,
}

/// Drives audio and vibration while an alert is active.
pub struct NotificationDispatcher {
    config: DispatcherConfig,
    audio: Option<Arc<dyn AudioLoader>>,
    vibrator: Arc<dyn Vibrator>,
    active: Mutex<Option<ActiveLoop>>,
    /// Held around every vibrate call so `stop` can wait out one in flight.
    fire_gate: Arc<Mutex<()>>,
}

impl NotificationDispatcher {
    /// Create an idle dispatcher.
    pub fn new(
        config: DispatcherConfig,
        audio: Option<Arc<dyn AudioLoader>>,
        vibrator: Arc<dyn Vibrator>,
    ) -> Self {
        Self {
            config,
            audio,
            vibrator,
            active: Mutex::new(None),
            fire_gate: Arc::new(Mutex::new(())),
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Current state.
    pub fn state(&self) -> DispatchState {
        if self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            DispatchState::Playing
        } else {
            DispatchState::Idle
        }
    }

    /// Whether an alert is being signalled.
    pub fn is_playing(&self) -> bool {
        self.state() == DispatchState::Playing
    }

    /// Start signalling. Returns `false` if already playing.
    ///
    /// Must be called within a Tokio runtime.
    pub fn trigger(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            debug!("Alert notification already playing");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(vibration_loop(
            Arc::clone(&self.vibrator),
            self.config.vibration_pattern.clone(),
            self.config.vibration_period(),
            cancel.clone(),
            Arc::clone(&self.fire_gate),
        ));
        let audio = self.start_audio();

        info!(
            "Alert notification started ({})",
            if audio.is_some() {
                "audio and vibration"
            } else {
                "vibration only"
            }
        );
        *active = Some(ActiveLoop {
            cancel,
            task,
            audio,
        });
        true
    }

    /// Stop signalling. Returns `false` if already idle.
    ///
    /// On return the vibration loop is guaranteed not to fire again.
    pub fn stop(&self) -> bool {
        let taken = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut active) = taken else {
            return false;
        };

        active.cancel.cancel();
        // Wait for an in-flight vibrate call to finish.
        drop(self.fire_gate.lock().unwrap_or_else(PoisonError::into_inner));
        active.task.abort();
        self.vibrator.cancel();
        if let Some(audio) = active.audio.as_mut() {
            audio.stop();
        }

        info!("Alert notification stopped");
        true
    }

    fn start_audio(&self) -> Option<Box<dyn AudioPlayback>> {
        let loader = self.audio.as_ref()?;
        let resource = self.config.audio_resource.as_deref()?;

        for attempt in 1..=AUDIO_ATTEMPTS {
            match self.play_resource(loader.as_ref(), resource) {
                Ok(playback) => return Some(playback),
                Err(e) => warn!(
                    "Alert audio {} failed (attempt {}/{}): {}",
                    resource, attempt, AUDIO_ATTEMPTS, e
                ),
            }
        }
        warn!("Alert audio unavailable, continuing with vibration only");
        None
    }

    fn play_resource(
        &self,
        loader: &dyn AudioLoader,
        resource: &str,
    ) -> Result<Box<dyn AudioPlayback>> {
        let mut playback = loader.load(resource)?;
        playback.set_volume(self.config.volume.clamp(0.0, 1.0));
        playback.play(true)?;
        Ok(playback)
    }
}

async fn vibration_loop(
    vibrator: Arc<dyn Vibrator>,
    pattern: Vec<u64>,
    period: Duration,
    cancel: CancellationToken,
    fire_gate: Arc<Mutex<()>>,
) {
    loop {
        {
            let _gate = fire_gate.lock().unwrap_or_else(PoisonError::into_inner);
            if cancel.is_cancelled() {
                break;
            }
            if let Err(e) = vibrator.vibrate(&pattern) {
                warn!("Vibration failed: {}", e);
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
    }
    debug!("Vibration loop finished");
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("config", &self.config)
            .field("state", &self.state())
            .field("has_audio", &self.audio.is_some())
            .finish()
    }
}
