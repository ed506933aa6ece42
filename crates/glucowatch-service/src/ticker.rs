//! Periodic sensor status recomputation.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use glucowatch_core::Monitor;

/// Background task that re-evaluates the sensor status on an interval so
/// that expiration and low-battery alerts fire without new scans.
pub struct Ticker {
    monitor: Monitor,
    period: Duration,
}

impl Ticker {
    /// Create a ticker. A zero period disables it.
    pub fn new(monitor: Monitor, period: Duration) -> Self {
        Self { monitor, period }
    }

    /// Start ticking until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run(cancel).await;
        })
    }

    async fn run(self, cancel: CancellationToken) {
        if self.period.is_zero() {
            info!("Status ticker disabled");
            return;
        }

        info!("Starting status ticker (interval: {}s)", self.period.as_secs());
        let mut timer = interval(self.period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let raised = self.monitor.status().tick().await;
                    if raised > 0 {
                        debug!("Status tick raised {} alert(s)", raised);
                    }
                }
            }
        }

        self.monitor.status().flush().await;
        info!("Status ticker stopped");
    }
}
