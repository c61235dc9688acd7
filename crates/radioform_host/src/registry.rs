//! Device registry: segment creation plus control-file publication.
//!
//! The driver discovers proxy devices by reading `NAME|UID` lines from the
//! control file and probing each UID's segment for a live host heartbeat.
//! The registry keeps both sides consistent: registering a device creates
//! its segment and rewrites the control file; unregistering removes the
//! line and unlinks the segment (via the segment's host-role drop).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use radioform_transport::{segment_path, SampleFormat, Segment};

use crate::error::HostResult;

pub struct RegisteredDevice {
    pub name: String,
    pub uid: String,
    pub segment: Arc<Segment>,
}

pub struct DeviceRegistry {
    control_path: PathBuf,
    devices: Vec<RegisteredDevice>,
    /// Whether this registry has ever written the control file.
    published: bool,
}

impl DeviceRegistry {
    pub fn new(control_path: impl Into<PathBuf>) -> Self {
        Self {
            control_path: control_path.into(),
            devices: Vec::new(),
            published: false,
        }
    }

    /// Create the segment for `(name, uid)` and publish it in the control
    /// file. Returns the shared segment handle.
    pub fn register(
        &mut self,
        name: &str,
        uid: &str,
        sample_rate: u32,
        channels: u32,
        format: SampleFormat,
        duration_ms: u32,
    ) -> HostResult<Arc<Segment>> {
        let path = segment_path(uid);
        let segment = Arc::new(Segment::create(
            &path,
            sample_rate,
            channels,
            format,
            duration_ms,
        )?);

        self.devices.push(RegisteredDevice {
            name: name.to_string(),
            uid: uid.to_string(),
            segment: Arc::clone(&segment),
        });
        self.rewrite_control_file()?;

        info!(name, uid, "registered proxy device");
        Ok(segment)
    }

    /// Drop a device: its control-file line goes away and the segment file
    /// is unlinked when the last handle drops.
    pub fn unregister(&mut self, uid: &str) -> HostResult<()> {
        self.devices.retain(|d| d.uid != uid);
        self.rewrite_control_file()?;
        info!(uid, "unregistered proxy device");
        Ok(())
    }

    pub fn devices(&self) -> &[RegisteredDevice] {
        &self.devices
    }

    pub fn control_path(&self) -> &Path {
        &self.control_path
    }

    fn rewrite_control_file(&mut self) -> HostResult<()> {
        let content: String = self
            .devices
            .iter()
            .map(|d| format!("{}|{}\n", d.name, d.uid))
            .collect();
        std::fs::write(&self.control_path, content)?;
        self.published = true;
        Ok(())
    }
}

impl Drop for DeviceRegistry {
    fn drop(&mut self) {
        // Single-purpose host: take our lines with us. A registry that
        // never published leaves the file alone.
        self.devices.clear();
        if self.published {
            let _ = std::fs::remove_file(&self.control_path);
        }
    }
}
