//! Host heartbeat thread.
//!
//! Increments `host_heartbeat` (and re-asserts `host_connected`) on every
//! registered segment roughly once per second. The driver treats a
//! heartbeat that stalls for 5 s as a dead host, so this thread is what
//! keeps the proxy devices alive.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info};

use radioform_transport::Segment;

use crate::error::{HostError, HostResult};

pub struct HeartbeatBeater {
    segments: Arc<Mutex<Vec<Arc<Segment>>>>,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatBeater {
    pub fn start() -> HostResult<Self> {
        let segments: Arc<Mutex<Vec<Arc<Segment>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_segments = Arc::clone(&segments);
        let thread_shutdown = Arc::clone(&shutdown);
        let thread = std::thread::Builder::new()
            .name("radioform-heartbeat".into())
            .spawn(move || {
                while !thread_shutdown.load(Ordering::SeqCst) {
                    for segment in thread_segments.lock().iter() {
                        segment.update_host_heartbeat();
                    }
                    // 100 ms slices keep shutdown latency low.
                    for _ in 0..10 {
                        if thread_shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        std::thread::sleep(Duration::from_millis(100));
                    }
                }
                debug!("heartbeat thread stopped");
            })
            .map_err(|e| HostError::ThreadSpawnError(e.to_string()))?;

        info!("heartbeat thread started");
        Ok(Self {
            segments,
            shutdown,
            thread: Some(thread),
        })
    }

    /// Start beating a segment. Beats once immediately so the driver's
    /// freshness probe sees a live counter without waiting a cycle.
    pub fn add_segment(&self, segment: Arc<Segment>) {
        segment.update_host_heartbeat();
        self.segments.lock().push(segment);
    }

    /// Stop beating the segment backed by `path`.
    pub fn remove_segment(&self, path: &Path) {
        self.segments.lock().retain(|s| s.path() != path);
    }

    pub fn segment_count(&self) -> usize {
        self.segments.lock().len()
    }

    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HeartbeatBeater {
    fn drop(&mut self) {
        self.shutdown();
    }
}
