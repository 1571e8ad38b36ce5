//! Idle reaper: evicts trackers of sessions that have ended.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;

use crate::error::BandwidthError;
use crate::registry::TrackerStore;

pub struct IdleReaper<S> {
    store: Arc<S>,
    threshold: Duration,
}

impl<S: TrackerStore> IdleReaper<S> {
    pub fn new(store: Arc<S>, threshold: Duration) -> Self {
        Self { store, threshold }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Remove idle trackers once. Returns how many were removed.
    pub fn sweep(&self) -> Result<usize, BandwidthError> {
        let before = self.store.sample()?.len();
        let removed = self.store.evict_idle(self.threshold)?;
        let after = self.store.sample()?.len();

        if removed > 0 {
            tracing::info!(
                before,
                removed,
                after,
                threshold_secs = self.threshold.as_secs(),
                "reaped idle sessions"
            );
        } else {
            tracing::debug!(sessions = after, "no idle sessions to reap");
        }
        Ok(removed)
    }
}

/// Sweep every `interval` until `shutdown` fires. The first sweep happens
/// one full interval after start.
pub async fn run_reaper_loop<S: TrackerStore>(
    reaper: Arc<IdleReaper<S>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reaper.sweep() {
                    tracing::error!(error = %e, "idle session sweep failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("reaper loop stopped");
                return;
            }
        }
    }
}
