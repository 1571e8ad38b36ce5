//! QoS: token bucket rate limiting for one download session.
//!
//! Permits are bytes. The bucket tracks stored permits and the instant at
//! which the next request may proceed. A request is granted right away when
//! that instant has passed and its cost is charged to whoever comes next,
//! so the first write after idling bursts and the following ones pay for it.
//!
//! Rate 0 = unlimited (never throttled).

use std::time::{Duration, Instant};

/// Idle time converted into stored permits is capped at this many seconds.
const MAX_BURST_SECS: f64 = 1.0;
/// Upper bound on the debt a single reservation can add.
const MAX_DEBT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug)]
pub struct TokenBucket {
    stored_permits: f64,
    max_permits: f64,
    rate: f64,
    next_free: Instant,
}

impl TokenBucket {
    pub fn new(bytes_per_second: u64) -> Self {
        Self {
            stored_permits: 0.0,
            max_permits: bytes_per_second as f64 * MAX_BURST_SECS,
            rate: bytes_per_second as f64,
            next_free: Instant::now(),
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    pub fn rate(&self) -> u64 {
        self.rate as u64
    }

    /// Change the rate without forgetting the current debt or credit.
    pub fn set_rate(&mut self, bytes_per_second: u64) {
        self.resync(Instant::now());
        self.rate = bytes_per_second as f64;
        self.max_permits = self.rate * MAX_BURST_SECS;
        self.stored_permits = self.stored_permits.min(self.max_permits);
    }

    /// Reserve `permits` and return how long the caller must wait before
    /// sending them.
    pub fn reserve(&mut self, permits: u64, now: Instant) -> Duration {
        if self.is_unlimited() {
            return Duration::ZERO;
        }

        self.resync(now);
        let wait = self.next_free.saturating_duration_since(now);

        let requested = permits as f64;
        let from_stored = requested.min(self.stored_permits);
        let fresh = requested - from_stored;
        self.stored_permits -= from_stored;
        let debt = Duration::try_from_secs_f64(fresh / self.rate)
            .unwrap_or(MAX_DEBT)
            .min(MAX_DEBT);
        self.next_free = self.next_free.checked_add(debt).unwrap_or(self.next_free);

        wait
    }

    pub fn stored_permits(&self) -> f64 {
        self.stored_permits
    }

    // Credit idle time since `next_free` as stored permits.
    fn resync(&mut self, now: Instant) {
        if now > self.next_free {
            if !self.is_unlimited() {
                let idle = now.duration_since(self.next_free).as_secs_f64();
                self.stored_permits = (self.stored_permits + idle * self.rate).min(self.max_permits);
            }
            self.next_free = now;
        }
    }
}
