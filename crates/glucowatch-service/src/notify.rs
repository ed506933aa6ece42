//! Terminal notification adapters.
//!
//! A terminal has no speaker or motor, so the alert sound is the ASCII bell
//! and vibration runs are logged. The acknowledge prompt is a single-item
//! dialoguer menu that cannot be dismissed without choosing "Acknowledge".

use std::io::{IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dialoguer::{Select, theme::ColorfulTheme};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use glucowatch_core::{
    AlertPrompt, AudioLoader, AudioPlayback, Error, GlucoseAlert, Result, Vibrator,
};

/// Label of the only prompt choice.
pub const ACKNOWLEDGE_LABEL: &str = "Acknowledge";

/// Pause between bells while looping.
pub const BELL_PERIOD: Duration = Duration::from_secs(2);

/// Loads the terminal bell as the alert sound.
///
/// Loading fails when stderr is not a terminal, which leaves the dispatcher
/// in vibration-only mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct BellAudioLoader;

impl AudioLoader for BellAudioLoader {
    fn load(&self, resource: &str) -> Result<Box<dyn AudioPlayback>> {
        if !std::io::stderr().is_terminal() {
            return Err(Error::audio(format!(
                "cannot play {}: stderr is not a terminal",
                resource
            )));
        }
        Ok(Box::new(BellPlayback::new(resource, BELL_PERIOD)))
    }
}

/// Terminal bell playback. Looped playback rings every period until stopped.
struct BellPlayback {
    resource: String,
    volume: f32,
    period: Duration,
    rings: Arc<AtomicUsize>,
    looping: Option<CancellationToken>,
}

impl BellPlayback {
    fn new(resource: &str, period: Duration) -> Self {
        Self {
            resource: resource.to_string(),
            volume: 1.0,
            period,
            rings: Arc::new(AtomicUsize::new(0)),
            looping: None,
        }
    }

    fn stop_loop(&mut self) -> bool {
        match self.looping.take() {
            Some(cancel) => {
                cancel.cancel();
                true
            }
            None => false,
        }
    }
}

fn ring(rings: &AtomicUsize) -> std::io::Result<()> {
    rings.fetch_add(1, Ordering::SeqCst);
    let mut stderr = std::io::stderr();
    // ASCII BEL character
    write!(stderr, "\x07")?;
    stderr.flush()
}

async fn bell_loop(period: Duration, rings: Arc<AtomicUsize>, cancel: CancellationToken) {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; play() already rang.
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = ring(&rings) {
                    warn!("Alert bell failed: {}", e);
                    break;
                }
            }
        }
    }
    debug!("Bell loop finished");
}

impl AudioPlayback for BellPlayback {
    fn play(&mut self, looped: bool) -> Result<()> {
        self.stop_loop();
        info!(
            "Playing {} (looped: {}, volume: {:.1})",
            self.resource, looped, self.volume
        );
        if self.volume <= 0.0 {
            return Ok(());
        }

        ring(&self.rings).map_err(|e| Error::audio(e.to_string()))?;
        if looped {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|e| Error::audio(format!("cannot loop {}: {}", self.resource, e)))?;
            let cancel = CancellationToken::new();
            runtime.spawn(bell_loop(
                self.period,
                Arc::clone(&self.rings),
                cancel.clone(),
            ));
            self.looping = Some(cancel);
        }
        Ok(())
    }

    fn stop(&mut self) {
        if self.stop_loop() {
            debug!("Stopped {}", self.resource);
        }
    }

    fn set_volume(&mut self, level: f32) {
        self.volume = level.clamp(0.0, 1.0);
    }
}

impl Drop for BellPlayback {
    fn drop(&mut self) {
        self.stop_loop();
    }
}

/// Logs each vibration run.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVibrator;

impl Vibrator for LogVibrator {
    fn vibrate(&self, pattern: &[u64]) -> Result<()> {
        debug!("Vibrate {:?}", pattern);
        Ok(())
    }

    fn cancel(&self) {
        debug!("Vibration cancelled");
    }
}

/// Blocking terminal prompt for glucose alerts.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalPrompt;

#[async_trait]
impl AlertPrompt for TerminalPrompt {
    async fn confirm(&self, alert: &GlucoseAlert) -> Result<()> {
        let title = alert.title();
        let message = alert.message();

        tokio::task::spawn_blocking(move || {
            if !std::io::stdin().is_terminal() || !std::io::stderr().is_terminal() {
                return Err(Error::Prompt("no interactive terminal".to_string()));
            }

            eprintln!();
            eprintln!("{}", message);
            Select::with_theme(&ColorfulTheme::default())
                .with_prompt(title)
                .items(&[ACKNOWLEDGE_LABEL])
                .default(0)
                .interact()
                .map(|_| ())
                .map_err(|e| Error::Prompt(e.to_string()))
        })
        .await
        .map_err(|e| Error::Prompt(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_vibrator_never_fails() {
        let vibrator = LogVibrator;
        assert!(vibrator.vibrate(&[0, 500, 200, 500]).is_ok());
        vibrator.cancel();
    }

    #[test]
    fn test_bell_playback_clamps_volume() {
        let mut playback = BellPlayback::new("alarm.mp3", BELL_PERIOD);
        playback.set_volume(3.0);
        assert_eq!(playback.volume, 1.0);
        playback.set_volume(-1.0);
        assert_eq!(playback.volume, 0.0);

        // Muted playback neither rings nor loops.
        assert!(playback.play(true).is_ok());
        assert_eq!(playback.rings.load(Ordering::SeqCst), 0);
        assert!(playback.looping.is_none());
        playback.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_looped_bell_rings_until_stopped() {
        let mut playback = BellPlayback::new("alarm.mp3", Duration::from_secs(1));
        let rings = Arc::clone(&playback.rings);

        playback.play(true).unwrap();
        assert_eq!(rings.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        let rung = rings.load(Ordering::SeqCst);
        assert!(rung >= 3, "expected repeated bells, got {}", rung);

        playback.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rings.load(Ordering::SeqCst), rung);
    }

    #[tokio::test]
    async fn test_single_play_does_not_loop() {
        let mut playback = BellPlayback::new("alarm.mp3", Duration::from_millis(10));
        playback.play(false).unwrap();
        assert!(playback.looping.is_none());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(playback.rings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bell_loader_requires_terminal() {
        if std::io::stderr().is_terminal() {
            return;
        }
        let err = BellAudioLoader.load("alarm.mp3").err().unwrap();
        assert!(matches!(err, Error::Audio(_)));
    }
}
