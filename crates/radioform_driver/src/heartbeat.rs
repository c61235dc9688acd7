//! Per-UID host heartbeat freshness cache.

use std::collections::HashMap;
use std::time::Instant;

use radioform_transport::HeartbeatObserver;

/// Tracks `(last_value, last_change_time)` per device UID so the fleet can
/// tell live control-file entries from stale ones.
///
/// Knowledge is kept across device removal on purpose: if a device flaps,
/// the old observation history is exactly what distinguishes a heartbeat
/// that resumed from one that never moved.
pub struct HeartbeatTracker {
    observers: HashMap<String, HeartbeatObserver>,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self {
            observers: HashMap::new(),
        }
    }

    /// Feed the heartbeat value read from a segment; returns freshness.
    pub fn is_fresh(&mut self, uid: &str, value: u64, now: Instant) -> bool {
        let observer = self
            .observers
            .entry(uid.to_string())
            .or_insert_with(|| HeartbeatObserver::new(now));
        observer.observe(value, now)
    }
}

impl Default for HeartbeatTracker {
    fn default() -> Self {
        Self::new()
    }
}
