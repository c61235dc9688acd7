//! The proxy fleet: control-file synchronisation and device lifecycle.
//!
//! A background watcher polls the control file roughly once per second and
//! reconciles the device map against it. An entry only becomes a device if
//! its shared segment shows a fresh host heartbeat; a removed UID is not
//! re-added within the cooldown window, which stops add/remove thrash while
//! the host is flapping.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, error, info};

use radioform_transport::{peek_host_heartbeat, segment_path};

use crate::control_file::{read_desired_devices, CONTROL_FILE_PATH};
use crate::device::DeviceInstance;
use crate::heartbeat::HeartbeatTracker;

/// A UID removed from the control file is not re-created for this long.
pub const DEVICE_COOLDOWN: Duration = Duration::from_secs(10);

/// UID -> DeviceInstance map, kept in sync with the control file.
pub struct ProxyFleet {
    control_path: PathBuf,
    devices: Mutex<HashMap<String, Arc<DeviceInstance>>>,
    heartbeats: Mutex<HeartbeatTracker>,
    removed_at: Mutex<HashMap<String, Instant>>,
    shutdown: Arc<AtomicBool>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProxyFleet {
    /// Build a fleet without a watcher thread; callers drive [`sync`]
    /// themselves.
    ///
    /// [`sync`]: ProxyFleet::sync
    pub fn new(control_path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            control_path: control_path.into(),
            devices: Mutex::new(HashMap::new()),
            heartbeats: Mutex::new(HeartbeatTracker::new()),
            removed_at: Mutex::new(HashMap::new()),
            shutdown: Arc::new(AtomicBool::new(false)),
            watcher: Mutex::new(None),
        })
    }

    /// Build the fleet, run one synchronous pass, and spawn the watcher
    /// thread (~1 Hz polling, 100 ms shutdown latency).
    pub fn start(control_path: impl Into<PathBuf>) -> Arc<Self> {
        let fleet = Self::new(control_path);
        fleet.sync();

        let weak = Arc::downgrade(&fleet);
        let shutdown = Arc::clone(&fleet.shutdown);
        let spawned = std::thread::Builder::new()
            .name("radioform-watcher".into())
            .spawn(move || {
                while !shutdown.load(Ordering::SeqCst) {
                    match weak.upgrade() {
                        Some(fleet) => fleet.sync(),
                        None => break,
                    }
                    for _ in 0..10 {
                        if shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
                debug!("control-file watcher stopped");
            });

        match spawned {
            Ok(handle) => *fleet.watcher.lock() = Some(handle),
            Err(e) => error!(error = %e, "failed to spawn control-file watcher"),
        }

        fleet
    }

    /// One reconciliation pass against the control file.
    pub fn sync(&self) {
        self.sync_at(Instant::now());
    }

    fn sync_at(&self, now: Instant) {
        let desired_raw = read_desired_devices(&self.control_path);

        // Only entries whose segment shows a live host heartbeat count.
        let mut desired: BTreeMap<String, String> = BTreeMap::new();
        {
            let mut heartbeats = self.heartbeats.lock();
            for (uid, name) in desired_raw {
                let fresh = match peek_host_heartbeat(&segment_path(&uid)) {
                    Ok(value) => heartbeats.is_fresh(&uid, value, now),
                    Err(_) => false,
                };
                if fresh {
                    desired.insert(uid, name);
                } else {
                    info!(%uid, "skipping stale control entry (no host heartbeat)");
                }
            }
        }

        let mut devices = self.devices.lock();
        debug!(
            desired = desired.len(),
            current = devices.len(),
            "fleet sync"
        );

        for (uid, name) in &desired {
            if devices.contains_key(uid) {
                continue;
            }
            if let Some(removed) = self.removed_at.lock().get(uid) {
                if now.duration_since(*removed) < DEVICE_COOLDOWN {
                    debug!(%uid, "re-add suppressed by removal cooldown");
                    continue;
                }
            }
            info!(%uid, %name, "creating proxy device");
            devices.insert(uid.clone(), DeviceInstance::new(uid, name));
        }

        let to_remove: Vec<String> = devices
            .keys()
            .filter(|uid| !desired.contains_key(*uid))
            .cloned()
            .collect();
        for uid in to_remove {
            info!(%uid, "removing proxy device");
            devices.remove(&uid);
            self.removed_at.lock().insert(uid, now);
        }
    }

    pub fn device(&self, uid: &str) -> Option<Arc<DeviceInstance>> {
        self.devices.lock().get(uid).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn uids(&self) -> Vec<String> {
        self.devices.lock().keys().cloned().collect()
    }

    /// Stop the watcher thread. Latency is bounded by the 100 ms sleep
    /// slices.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watcher.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProxyFleet {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.watcher.lock().take() {
            let _ = handle.join();
        }
    }
}

static FLEET: OnceLock<Arc<ProxyFleet>> = OnceLock::new();

/// The plug-in factory surface: lazily construct the process-wide fleet on
/// first call and hand back the same instance afterwards. The hosting
/// process is single-purpose, so the fleet is never torn down.
pub fn driver_entry() -> Arc<ProxyFleet> {
    Arc::clone(FLEET.get_or_init(|| {
        let fleet = ProxyFleet::start(CONTROL_FILE_PATH);
        info!(devices = fleet.device_count(), "driver ready");
        fleet
    }))
}
