//! Per-device I/O state machine and client counting.
//!
//! A `DeviceInstance` coordinates connect / validate / stream / recover /
//! disconnect across multiple I/O clients of one proxy device:
//!
//! ```text
//! Uninitialized ──first StartIO──▶ Connecting ──open ok──▶ Connected
//!      ▲                              │ all retries fail        │
//!      │                              ▼                         │ health fail
//!      │                            Error ◀──reopen fails── Connecting
//!      └── last StopIO ──▶ Disconnected
//! ```
//!
//! Only the first StartIO opens the shared segment and only the last
//! matching StopIO closes it. A StopIO with the count already at zero is a
//! logged bug, not fatal.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use radioform_transport::{segment_path, HeartbeatObserver, Segment};

use crate::error::DriverError;
use crate::handler::IoStats;

/// Attempts made to open the segment on first StartIO.
pub const MAX_OPEN_RETRIES: u32 = 15;
/// Base delay of the exponential backoff; doubles up to 64x (1920 ms cap).
pub const OPEN_RETRY_BASE_DELAY: Duration = Duration::from_millis(30);
/// How often the I/O callback re-verifies segment health.
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(3);
/// How often the I/O callback bumps the driver heartbeat.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// How often the handler dumps its counters to the log.
pub const STATS_LOG_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Uninitialized,
    Connecting,
    Connected,
    /// Format negotiation in progress.
    Negotiating,
    Error,
    Disconnected,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceState::Uninitialized => "Uninitialized",
            DeviceState::Connecting => "Connecting",
            DeviceState::Connected => "Connected",
            DeviceState::Negotiating => "Negotiating",
            DeviceState::Error => "Error",
            DeviceState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

/// State guarded by the per-instance mutex: transitions, the mapped
/// segment, and the client count.
pub(crate) struct DeviceCore {
    pub state: DeviceState,
    pub io_client_count: i32,
    pub segment: Option<Arc<Segment>>,
    pub host_hb: HeartbeatObserver,
}

/// One proxy device: identity, its segment, and the I/O state machine.
pub struct DeviceInstance {
    uid: String,
    display_name: String,
    segment_path: PathBuf,
    core: Mutex<DeviceCore>,
    stats: IoStats,
}

impl DeviceInstance {
    pub fn new(uid: &str, display_name: &str) -> Arc<Self> {
        let path = segment_path(uid);
        Self::with_segment_path(uid, display_name, path)
    }

    pub(crate) fn with_segment_path(
        uid: &str,
        display_name: &str,
        segment_path: PathBuf,
    ) -> Arc<Self> {
        info!(uid, display_name, path = %segment_path.display(), "device instance created");
        Arc::new(Self {
            uid: uid.to_string(),
            display_name: display_name.to_string(),
            segment_path,
            core: Mutex::new(DeviceCore {
                state: DeviceState::Uninitialized,
                io_client_count: 0,
                segment: None,
                host_hb: HeartbeatObserver::new(Instant::now()),
            }),
            stats: IoStats::new(),
        })
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn segment_path(&self) -> &Path {
        &self.segment_path
    }

    pub fn state(&self) -> DeviceState {
        self.core.lock().state
    }

    pub fn io_client_count(&self) -> i32 {
        self.core.lock().io_client_count
    }

    pub fn stats(&self) -> &IoStats {
        &self.stats
    }

    /// A client started I/O. The first client opens and validates the
    /// segment, retrying with exponential backoff while the host catches up.
    pub fn start_io(&self) -> Result<(), DriverError> {
        self.start_io_with_retries(MAX_OPEN_RETRIES)
    }

    pub(crate) fn start_io_with_retries(&self, max_retries: u32) -> Result<(), DriverError> {
        let mut core = self.core.lock();
        core.io_client_count += 1;
        let count = core.io_client_count;
        self.stats.client_starts_inc();

        info!(
            uid = %self.uid,
            client = count,
            state = %core.state,
            "start_io"
        );

        if count == 1 {
            core.state = DeviceState::Connecting;
            let mut last_error = String::new();

            for attempt in 1..=max_retries {
                match Segment::open(&self.segment_path) {
                    Ok(segment) => {
                        info!(uid = %self.uid, attempt, "connected to shared segment");
                        core.segment = Some(Arc::new(segment));
                        core.host_hb = HeartbeatObserver::new(Instant::now());
                        core.state = DeviceState::Connected;
                        return Ok(());
                    }
                    Err(e) => {
                        last_error = e.to_string();
                        if attempt < max_retries {
                            let delay = OPEN_RETRY_BASE_DELAY * (1u32 << (attempt - 1).min(6));
                            debug!(
                                uid = %self.uid,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %last_error,
                                "segment open failed, retrying"
                            );
                            std::thread::sleep(delay);
                        }
                    }
                }
            }

            core.io_client_count -= 1;
            core.state = DeviceState::Error;
            error!(
                uid = %self.uid,
                path = %self.segment_path.display(),
                error = %last_error,
                "start_io failed; is the host application running?"
            );
            return Err(DriverError::IoStartFailed {
                attempts: max_retries,
                last_error,
            });
        }

        // Additional client: the segment is supposedly up; verify it.
        let healthy = {
            let DeviceCore {
                segment, host_hb, ..
            } = &mut *core;
            match segment {
                Some(segment) => segment.is_healthy(host_hb),
                None => false,
            }
        };
        if !healthy {
            warn!(uid = %self.uid, client = count, "unhealthy connection on start_io");
            self.recover_locked(&mut core);
        }

        if core.segment.is_some() {
            Ok(())
        } else {
            Err(DriverError::IoStartFailed {
                attempts: 1,
                last_error: "recovery failed".to_string(),
            })
        }
    }

    /// A client stopped I/O. The last one unmaps the segment.
    pub fn stop_io(&self) {
        let mut core = self.core.lock();

        if core.io_client_count == 0 {
            error!(uid = %self.uid, "stop_io called with client count already 0");
            return;
        }

        core.io_client_count -= 1;
        self.stats.client_stops_inc();
        info!(uid = %self.uid, remaining = core.io_client_count, "stop_io");

        if core.io_client_count == 0 {
            info!(uid = %self.uid, "last client stopped, disconnecting");
            core.segment = None;
            core.state = DeviceState::Disconnected;
        }
    }

    /// Non-blocking lock for the I/O hot path.
    pub(crate) fn try_core(&self) -> Option<MutexGuard<'_, DeviceCore>> {
        self.core.try_lock()
    }

    /// Health of the current mapping: file still present, host alive,
    /// ring invariants intact.
    pub(crate) fn is_healthy_locked(&self, core: &mut DeviceCore) -> bool {
        if !self.segment_path.exists() {
            warn!(uid = %self.uid, "health: segment file vanished");
            return false;
        }
        let DeviceCore {
            segment, host_hb, ..
        } = core;
        match segment {
            Some(segment) => segment.is_healthy(host_hb),
            None => false,
        }
    }

    /// Drop the mapping and try one reopen. Connected again on success,
    /// Error otherwise.
    pub(crate) fn recover_locked(&self, core: &mut DeviceCore) {
        info!(uid = %self.uid, "attempting recovery");
        self.stats.reconnections_inc();

        core.segment = None;
        core.state = DeviceState::Connecting;

        if core.io_client_count > 0 {
            match Segment::open(&self.segment_path) {
                Ok(segment) => {
                    info!(uid = %self.uid, "recovery successful");
                    core.segment = Some(Arc::new(segment));
                    core.host_hb = HeartbeatObserver::new(Instant::now());
                    core.state = DeviceState::Connected;
                }
                Err(e) => {
                    error!(uid = %self.uid, error = %e, "recovery failed");
                    core.state = DeviceState::Error;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radioform_transport::SampleFormat;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn host_segment(dir: &tempfile::TempDir) -> (Segment, PathBuf) {
        let path = dir.path().join("seg");
        let seg = Segment::create(&path, 48000, 2, SampleFormat::Float32, 20).unwrap();
        (seg, path)
    }

    #[test]
    fn test_first_start_io_connects() {
        let dir = tempdir().unwrap();
        let (host, path) = host_segment(&dir);
        let device = DeviceInstance::with_segment_path("uid-1", "Test", path);

        assert_eq!(device.state(), DeviceState::Uninitialized);
        device.start_io().unwrap();
        assert_eq!(device.state(), DeviceState::Connected);
        assert_eq!(device.io_client_count(), 1);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_second_start_io_stays_connected() {
        let dir = tempdir().unwrap();
        let (host, path) = host_segment(&dir);
        host.update_host_heartbeat();
        let device = DeviceInstance::with_segment_path("uid-2", "Test", path);

        device.start_io().unwrap();
        device.start_io().unwrap();
        assert_eq!(device.state(), DeviceState::Connected);
        assert_eq!(device.io_client_count(), 2);
        assert_eq!(device.stats().client_starts(), 2);
    }

    #[test]
    fn test_start_io_fails_without_host() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        let device = DeviceInstance::with_segment_path("uid-3", "Test", path);

        let err = device.start_io_with_retries(2).unwrap_err();
        assert!(matches!(err, DriverError::IoStartFailed { attempts: 2, .. }));
        assert_eq!(device.state(), DeviceState::Error);
        assert_eq!(device.io_client_count(), 0);
    }

    #[test]
    fn test_stop_io_unmaps_only_at_zero() {
        let dir = tempdir().unwrap();
        let (host, path) = host_segment(&dir);
        host.update_host_heartbeat();
        let device = DeviceInstance::with_segment_path("uid-4", "Test", path);

        device.start_io().unwrap();
        device.start_io().unwrap();

        device.stop_io();
        assert_eq!(device.io_client_count(), 1);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 1);

        device.stop_io();
        assert_eq!(device.io_client_count(), 0);
        assert_eq!(device.state(), DeviceState::Disconnected);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_mismatched_stop_io_is_not_fatal() {
        let dir = tempdir().unwrap();
        let (_host, path) = host_segment(&dir);
        let device = DeviceInstance::with_segment_path("uid-5", "Test", path);

        device.stop_io();
        assert_eq!(device.io_client_count(), 0);
        assert_eq!(device.state(), DeviceState::Uninitialized);
    }

    #[test]
    fn test_recovery_after_host_restart() {
        let dir = tempdir().unwrap();
        let (host, path) = host_segment(&dir);
        let device = DeviceInstance::with_segment_path("uid-6", "Test", path.clone());
        device.start_io().unwrap();

        // Host goes away (unlinks the file), then comes back.
        drop(host);
        {
            let mut core = device.try_core().unwrap();
            assert!(!device.is_healthy_locked(&mut core));
            device.recover_locked(&mut core);
            assert_eq!(core.state, DeviceState::Error);
        }

        let _host2 = Segment::create(&path, 48000, 2, SampleFormat::Float32, 20).unwrap();
        {
            let mut core = device.try_core().unwrap();
            device.recover_locked(&mut core);
            assert_eq!(core.state, DeviceState::Connected);
        }
        assert_eq!(device.state(), DeviceState::Connected);
    }

    #[test]
    fn test_destructor_releases_segment() {
        let dir = tempdir().unwrap();
        let (host, path) = host_segment(&dir);
        let device = DeviceInstance::with_segment_path("uid-7", "Test", path);
        device.start_io().unwrap();
        drop(device);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 0);
    }
}
