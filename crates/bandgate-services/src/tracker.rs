//! Per-session bandwidth tracker.
//!
//! One tracker is shared by every concurrent download of a session. It owns
//! the session's rate limiter, its lifetime byte counter, the set of games
//! currently streaming and a short throughput history for the dashboard.
//!
//! Throughput is measured over a 10 second window. When a window expires the
//! next write rotates it: the old window's rate is kept as the previous rate
//! and a window younger than one second is blended with it, so the reading
//! ramps instead of spiking or collapsing to zero right after a rotation.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use bandgate_core::GameId;

use crate::error::BandwidthError;
use crate::qos::TokenBucket;
use crate::stats::SessionStats;

/// Length of one throughput measurement window.
pub const MONITORING_WINDOW: Duration = Duration::from_secs(10);
/// Windows younger than this are blended with the previous window.
const BLEND_WINDOW: Duration = Duration::from_secs(1);
/// Samples kept in `bandwidth_history`.
pub const MAX_BANDWIDTH_HISTORY: usize = 30;
/// Placeholder principal name that never replaces a real username.
pub const ANONYMOUS_USER: &str = "anonymousUser";
pub const UNKNOWN_REMOTE_IP: &str = "unknown";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Who is downloading and what.
#[derive(Debug)]
struct SessionMeta {
    username: Option<String>,
    remote_ip: String,
    active_game_ids: HashSet<GameId>,
    /// Wall-clock time of the last measurement reset.
    started_at: DateTime<Utc>,
}

#[derive(Debug)]
struct RateWindow {
    started: Instant,
    bytes: u64,
    previous_rate: f64,
    /// False until something is recorded after creation or reset.
    has_data: bool,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            bytes: 0,
            previous_rate: 0.0,
            has_data: false,
        }
    }

    /// Returns true when this call rotated the window.
    fn record(&mut self, bytes: u64, now: Instant) -> bool {
        self.has_data = true;
        let age = now.saturating_duration_since(self.started);
        if age > MONITORING_WINDOW {
            self.previous_rate = self.bytes as f64 / age.as_secs_f64();
            self.started = now;
            self.bytes = bytes;
            true
        } else {
            self.bytes = self.bytes.saturating_add(bytes);
            false
        }
    }

    fn rate(&self, now: Instant) -> u64 {
        if !self.has_data {
            return 0;
        }
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let current = if elapsed > 0.0 {
            self.bytes as f64 / elapsed
        } else {
            0.0
        };

        let blend = BLEND_WINDOW.as_secs_f64();
        let rate = if elapsed < blend {
            let weight = elapsed / blend;
            current * weight + self.previous_rate * (1.0 - weight)
        } else {
            current
        };
        rate.max(0.0) as u64
    }
}

/// Bandwidth accounting and throttling for one session.
///
/// Shared as `Arc<SessionTracker>`; every method takes `&self` and is safe to
/// call from any number of threads.
#[derive(Debug)]
pub struct SessionTracker {
    session_id: String,
    max_bytes_per_second: AtomicU64,
    bucket: Mutex<TokenBucket>,
    total_bytes: AtomicU64,
    active_downloads: AtomicU32,
    meta: Mutex<SessionMeta>,
    window: Mutex<RateWindow>,
    history: Mutex<VecDeque<u64>>,
    last_activity: Mutex<Instant>,
    // Set by `interrupt`, cleared when the last download completes.
    interrupted: Mutex<bool>,
    wake: Condvar,
}

impl SessionTracker {
    pub fn new(session_id: impl Into<String>, max_bytes_per_second: u64) -> Self {
        let now = Instant::now();
        Self {
            session_id: session_id.into(),
            max_bytes_per_second: AtomicU64::new(max_bytes_per_second),
            bucket: Mutex::new(TokenBucket::new(max_bytes_per_second)),
            total_bytes: AtomicU64::new(0),
            active_downloads: AtomicU32::new(0),
            meta: Mutex::new(SessionMeta {
                username: None,
                remote_ip: UNKNOWN_REMOTE_IP.to_string(),
                active_game_ids: HashSet::new(),
                started_at: Utc::now(),
            }),
            window: Mutex::new(RateWindow::new(now)),
            history: Mutex::new(VecDeque::with_capacity(MAX_BANDWIDTH_HISTORY + 1)),
            last_activity: Mutex::new(now),
            interrupted: Mutex::new(false),
            wake: Condvar::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// 0 = unlimited.
    pub fn max_bytes_per_second(&self) -> u64 {
        self.max_bytes_per_second.load(Ordering::Acquire)
    }

    /// Change the budget without losing accumulated state.
    pub fn update_limit(&self, max_bytes_per_second: u64) {
        let previous = self
            .max_bytes_per_second
            .swap(max_bytes_per_second, Ordering::AcqRel);
        if previous != max_bytes_per_second {
            lock(&self.bucket).set_rate(max_bytes_per_second);
            tracing::debug!(
                session = %self.session_id,
                previous,
                max_bytes_per_second,
                "bandwidth limit updated"
            );
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub fn download_started(
        &self,
        game_id: Option<GameId>,
        username: Option<&str>,
        remote_ip: Option<&str>,
    ) {
        let active = self.active_downloads.fetch_add(1, Ordering::AcqRel) + 1;
        {
            let mut meta = lock(&self.meta);
            if let Some(name) = username {
                if meta.username.is_none() && name != ANONYMOUS_USER {
                    meta.username = Some(name.to_string());
                }
            }
            if let Some(ip) = remote_ip {
                if meta.remote_ip == UNKNOWN_REMOTE_IP {
                    meta.remote_ip = ip.to_string();
                }
            }
            if let Some(id) = game_id {
                meta.active_game_ids.insert(id);
            }
        }
        self.touch(Instant::now());

        tracing::debug!(session = %self.session_id, ?game_id, active, "download started");
    }

    /// Ends one download. The last one to finish resets the rate measurement;
    /// the lifetime total is kept.
    pub fn download_completed(&self, game_id: Option<GameId>) {
        let remaining = match self
            .active_downloads
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        };
        if let Some(id) = game_id {
            lock(&self.meta).active_game_ids.remove(&id);
        }
        self.touch(Instant::now());

        tracing::debug!(session = %self.session_id, ?game_id, remaining, "download completed");

        if remaining == 0 {
            self.reset();
        }
    }

    /// Restart rate measurement and clear a pending interrupt.
    /// `total_bytes_transferred` is preserved.
    pub fn reset(&self) {
        let now = Instant::now();
        *lock(&self.window) = RateWindow::new(now);
        *lock(&self.interrupted) = false;
        lock(&self.meta).started_at = Utc::now();
        self.touch(now);
    }

    pub fn active_downloads(&self) -> u32 {
        self.active_downloads.load(Ordering::Acquire)
    }

    /// Copy of the games currently streaming.
    pub fn active_game_ids(&self) -> HashSet<GameId> {
        lock(&self.meta).active_game_ids.clone()
    }

    pub fn username(&self) -> Option<String> {
        lock(&self.meta).username.clone()
    }

    pub fn remote_ip(&self) -> String {
        lock(&self.meta).remote_ip.clone()
    }

    // ── Byte accounting ──────────────────────────────────────────────────────

    /// Account for bytes without throttling.
    pub fn record_bytes(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::AcqRel);
        let now = Instant::now();
        if lock(&self.window).record(bytes, now) {
            tracing::trace!(session = %self.session_id, "monitoring window rotated");
        }
        self.touch(now);
    }

    /// Account for bytes, then block until the session budget allows them.
    ///
    /// Returns `Interrupted` if the tracker was interrupted before or during
    /// the wait; the bytes stay recorded either way.
    pub fn throttle(&self, bytes: u64) -> Result<(), BandwidthError> {
        self.record_bytes(bytes);
        if self.is_interrupted() {
            return Err(BandwidthError::Interrupted(self.session_id.clone()));
        }

        let wait = lock(&self.bucket).reserve(bytes, Instant::now());
        if wait.is_zero() {
            return Ok(());
        }
        tracing::trace!(session = %self.session_id, bytes, wait_ms = wait.as_millis() as u64, "throttling");
        self.park(wait)
    }

    /// Wake every thread blocked in `throttle` on this tracker. Later
    /// throttles fail too until the session's last download completes.
    pub fn interrupt(&self) {
        *lock(&self.interrupted) = true;
        self.wake.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        *lock(&self.interrupted)
    }

    fn park(&self, wait: Duration) -> Result<(), BandwidthError> {
        let deadline = Instant::now().checked_add(wait);
        let mut interrupted = lock(&self.interrupted);
        loop {
            if *interrupted {
                return Err(BandwidthError::Interrupted(self.session_id.clone()));
            }
            let now = Instant::now();
            let remaining = match deadline {
                Some(deadline) if now >= deadline => return Ok(()),
                Some(deadline) => deadline - now,
                None => wait,
            };
            interrupted = match self.wake.wait_timeout(interrupted, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    pub fn total_bytes_transferred(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    pub fn current_bytes_per_second(&self) -> u64 {
        lock(&self.window).rate(Instant::now())
    }

    // ── History ──────────────────────────────────────────────────────────────

    /// Append the current throughput to the history. No deduplication.
    pub fn record_bandwidth_snapshot(&self) {
        let rate = self.current_bytes_per_second();
        self.push_history(rate);
    }

    fn push_history(&self, sample: u64) {
        let mut history = lock(&self.history);
        history.push_back(sample);
        while history.len() > MAX_BANDWIDTH_HISTORY {
            history.pop_front();
        }
    }

    /// Oldest sample first.
    pub fn bandwidth_history(&self) -> Vec<u64> {
        lock(&self.history).iter().copied().collect()
    }

    // ── Activity ─────────────────────────────────────────────────────────────

    fn touch(&self, now: Instant) {
        let mut last = lock(&self.last_activity);
        if now > *last {
            *last = now;
        }
    }

    pub fn last_activity(&self) -> Instant {
        *lock(&self.last_activity)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity().elapsed()
    }

    /// No active downloads and idle longer than `threshold`. A zero
    /// threshold matches every idle tracker.
    pub fn is_reapable(&self, threshold: Duration) -> bool {
        self.active_downloads() == 0 && (threshold.is_zero() || self.idle_for() > threshold)
    }

    pub fn snapshot(&self) -> SessionStats {
        let (start_time, username, remote_ip, active_game_ids) = {
            let meta = lock(&self.meta);
            (
                meta.started_at,
                meta.username.clone(),
                meta.remote_ip.clone(),
                meta.active_game_ids.clone(),
            )
        };

        SessionStats {
            session_id: self.session_id.clone(),
            start_time,
            username,
            remote_ip,
            active_downloads: self.active_downloads(),
            active_game_ids,
            total_bytes_transferred: self.total_bytes_transferred(),
            current_bytes_per_second: self.current_bytes_per_second(),
            bandwidth_history: self.bandwidth_history(),
        }
    }
}

#[cfg(test)]
impl SessionTracker {
    pub(crate) fn backdate_window(&self, by: Duration) {
        let mut window = lock(&self.window);
        window.started = window.started.checked_sub(by).expect("uptime too short");
    }

    pub(crate) fn backdate_activity(&self, by: Duration) {
        let mut last = lock(&self.last_activity);
        *last = last.checked_sub(by).expect("uptime too short");
    }

    pub(crate) fn window_bytes(&self) -> u64 {
        lock(&self.window).bytes
    }
}
