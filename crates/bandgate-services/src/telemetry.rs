//! Telemetry publisher: samples the tracker store and multicasts changes.
//!
//! Every tick records a history sample on each tracker, reads the stats and
//! compares them with the last published ones. Only a change is published,
//! and what goes out is the whole buffer of recent frames rather than the
//! newest frame alone, so a dashboard that just connected has context.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::MissedTickBehavior;

use bandgate_core::config::TelemetryConfig;
use bandgate_core::{SessionStatsDto, StatsFrame};

use crate::error::BandwidthError;
use crate::registry::TrackerStore;
use crate::stats::{to_frame, SessionStats};

/// Buffered frames, oldest first.
pub type TelemetryEvent = Arc<Vec<StatsFrame>>;

#[derive(Default)]
struct PublisherState {
    previous: HashMap<String, SessionStats>,
    history: VecDeque<StatsFrame>,
    latest: Option<TelemetryEvent>,
}

pub struct TelemetryPublisher<S> {
    store: Arc<S>,
    state: Mutex<PublisherState>,
    sender: broadcast::Sender<TelemetryEvent>,
    history_len: usize,
}

impl<S: TrackerStore> TelemetryPublisher<S> {
    pub fn new(store: Arc<S>, config: &TelemetryConfig) -> Self {
        Self::with_capacity(store, config.history_len, config.channel_capacity)
    }

    pub fn with_capacity(store: Arc<S>, history_len: usize, channel_capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(channel_capacity.max(1));
        Self {
            store,
            state: Mutex::new(PublisherState::default()),
            sender,
            history_len: history_len.max(1),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Sample once. Returns true when the sample differed from the last one
    /// and was published.
    pub fn tick(&self) -> Result<bool, BandwidthError> {
        self.store.record_history()?;
        let stats = self.store.sample()?;

        let mut state = self.lock_state();
        if stats == state.previous {
            return Ok(false);
        }

        let sessions = stats.len();
        state.history.push_back(to_frame(&stats));
        while state.history.len() > self.history_len {
            state.history.pop_front();
        }
        state.previous = stats;

        let event: TelemetryEvent = Arc::new(state.history.iter().cloned().collect());
        state.latest = Some(Arc::clone(&event));
        // Err only means nobody is listening.
        let receivers = self.sender.send(event).unwrap_or(0);

        tracing::trace!(sessions, receivers, "telemetry published");
        Ok(true)
    }

    /// Subscribe to published events. The current buffer, if any, is
    /// delivered first.
    pub fn subscribe(&self) -> TelemetrySubscription {
        // Publication happens under the same lock, so the replayed buffer and
        // the live receiver neither overlap nor leave a gap.
        let state = self.lock_state();
        TelemetrySubscription {
            pending: state.latest.clone(),
            rx: self.sender.subscribe(),
        }
    }

    pub fn latest(&self) -> Option<TelemetryEvent> {
        self.lock_state().latest.clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn active_sessions(&self) -> Result<Vec<SessionStatsDto>, BandwidthError> {
        Ok(to_frame(&self.store.sample()?))
    }

    /// Drop a session's accounting. Unknown ids are a no-op.
    pub fn clear_session(&self, session_id: &str) -> Result<bool, BandwidthError> {
        let cleared = self.store.evict(session_id)?;
        tracing::info!(session = %session_id, cleared, "session cleared");
        Ok(cleared)
    }

    fn lock_state(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A dashboard's view of the published events.
#[derive(Debug)]
pub struct TelemetrySubscription {
    pending: Option<TelemetryEvent>,
    rx: broadcast::Receiver<TelemetryEvent>,
}

impl TelemetrySubscription {
    /// Next event, or `None` once the publisher is gone. Events missed by a
    /// slow subscriber are skipped.
    pub async fn recv(&mut self) -> Option<TelemetryEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "telemetry subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`.
    pub fn try_recv(&mut self) -> Option<TelemetryEvent> {
        if let Some(event) = self.pending.take() {
            return Some(event);
        }
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "telemetry subscriber lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }
}

/// Tick `publisher` every `interval` until `shutdown` fires.
pub async fn run_telemetry_loop<S: TrackerStore>(
    publisher: Arc<TelemetryPublisher<S>>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = publisher.tick() {
                    tracing::error!(error = %e, "telemetry tick failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::debug!("telemetry loop stopped");
                return;
            }
        }
    }
}
