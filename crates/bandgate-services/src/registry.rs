//! Session registry: one tracker per session, shared by all its downloads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::error::BandwidthError;
use crate::stats::SessionStats;
use crate::tracker::SessionTracker;

/// Concurrent map of session id to tracker.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    trackers: DashMap<String, Arc<SessionTracker>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session's tracker, creating it on first use.
    ///
    /// Concurrent callers for the same id always get the same tracker. The
    /// limit is applied to existing trackers too, so a config change takes
    /// effect on the next download.
    pub fn get_tracker(&self, session_id: &str, max_bytes_per_second: u64) -> Arc<SessionTracker> {
        let tracker = Arc::clone(
            self.trackers
                .entry(session_id.to_string())
                .or_insert_with(|| {
                    tracing::debug!(session = %session_id, max_bytes_per_second, "tracker created");
                    Arc::new(SessionTracker::new(session_id, max_bytes_per_second))
                })
                .value(),
        );
        // Outside the shard lock.
        tracker.update_limit(max_bytes_per_second);
        tracker
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionTracker>> {
        self.trackers.get(session_id).map(|t| Arc::clone(t.value()))
    }

    /// Returns whether a tracker was removed.
    pub fn remove_tracker(&self, session_id: &str) -> bool {
        let removed = self.trackers.remove(session_id).is_some();
        if removed {
            tracing::debug!(session = %session_id, "tracker removed");
        }
        removed
    }

    /// Snapshot every tracker.
    pub fn get_stats(&self) -> HashMap<String, SessionStats> {
        self.trackers()
            .into_iter()
            .map(|t| (t.session_id().to_string(), t.snapshot()))
            .collect()
    }

    pub fn record_all_bandwidth_snapshots(&self) {
        for tracker in self.trackers() {
            tracker.record_bandwidth_snapshot();
        }
    }

    /// Drop trackers with no active downloads that have been idle longer
    /// than `threshold`. Returns the number removed.
    pub fn cleanup_inactive_trackers(&self, threshold: Duration) -> usize {
        let mut removed = 0;
        self.trackers.retain(|id, tracker| {
            if tracker.is_reapable(threshold) {
                tracing::debug!(session = %id, idle_secs = tracker.idle_for().as_secs(), "reaping idle tracker");
                removed += 1;
                false
            } else {
                true
            }
        });
        removed
    }

    /// Wake every blocked throttle in every session.
    pub fn interrupt_all(&self) {
        for tracker in self.trackers() {
            tracker.interrupt();
        }
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    // Clone the Arcs first so no shard lock is held while trackers are read.
    fn trackers(&self) -> Vec<Arc<SessionTracker>> {
        self.trackers.iter().map(|e| Arc::clone(e.value())).collect()
    }
}

/// The registry operations the telemetry publisher and idle reaper rely on.
///
/// Fallible so that a store failure in one sweep is reported to the caller
/// instead of tearing down the loop that runs it.
pub trait TrackerStore: Send + Sync + 'static {
    fn record_history(&self) -> Result<(), BandwidthError>;
    fn sample(&self) -> Result<HashMap<String, SessionStats>, BandwidthError>;
    fn evict(&self, session_id: &str) -> Result<bool, BandwidthError>;
    fn evict_idle(&self, threshold: Duration) -> Result<usize, BandwidthError>;
}

impl TrackerStore for SessionRegistry {
    fn record_history(&self) -> Result<(), BandwidthError> {
        self.record_all_bandwidth_snapshots();
        Ok(())
    }

    fn sample(&self) -> Result<HashMap<String, SessionStats>, BandwidthError> {
        Ok(self.get_stats())
    }

    fn evict(&self, session_id: &str) -> Result<bool, BandwidthError> {
        Ok(self.remove_tracker(session_id))
    }

    fn evict_idle(&self, threshold: Duration) -> Result<usize, BandwidthError> {
        Ok(self.cleanup_inactive_trackers(threshold))
    }
}
