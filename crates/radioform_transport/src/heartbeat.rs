//! Heartbeat freshness tracking.
//!
//! Each side of a segment increments its heartbeat counter at least once per
//! second while alive. A peer proves liveness by *changing* the counter, not
//! by any absolute value, so an observer has to remember the last value it
//! saw and when it changed.

use std::time::{Duration, Instant};

/// A heartbeat that has not advanced for this long is considered stale.
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caches `(last_value, last_change_time)` for one heartbeat counter.
///
/// Fresh means: the value changed within the timeout window, *or* the
/// counter is still within the window of its first observation (a peer that
/// just appeared deserves a grace period). A heartbeat that never starts
/// incrementing goes stale once the window elapses.
#[derive(Debug, Clone)]
pub struct HeartbeatObserver {
    last_value: u64,
    last_change: Instant,
}

impl HeartbeatObserver {
    pub fn new(now: Instant) -> Self {
        Self {
            last_value: 0,
            last_change: now,
        }
    }

    /// Feed the current counter value; returns whether the peer is fresh.
    pub fn observe(&mut self, value: u64, now: Instant) -> bool {
        if value != self.last_value {
            self.last_value = value;
            self.last_change = now;
        }
        now.duration_since(self.last_change) < HEARTBEAT_TIMEOUT
    }

    pub fn last_value(&self) -> u64 {
        self.last_value
    }
}
