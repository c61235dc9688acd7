//! Radioform Driver - Virtual Device Runtime
//!
//! The driver side of the system: a dynamic fleet of proxy output devices,
//! synchronised from a control file, each backed by one shared-memory
//! segment owned by the host application.
//!
//! # Architecture
//!
//! ```text
//! ControlFile (/tmp/radioform-devices.txt)
//!      │ watcher thread, ~1 Hz
//!      ▼
//! ProxyFleet ── uid ──▶ DeviceInstance { state machine, client counter }
//!                            │
//!                            ▼
//!                        Handler ── convert ──▶ (resample?) ──▶ ring write
//!                            │
//!                        ZeroTimestampClock (monotonic I/O timestamps)
//! ```
//!
//! The platform audio-server plug-in ABI that invokes the I/O callbacks is a
//! collaborator, not part of this crate; [`driver_entry`] is the single
//! entry point it calls to lazily construct the fleet.

mod clock;
mod control_file;
mod device;
mod error;
mod fleet;
mod handler;
mod heartbeat;
mod resampler;

pub use clock::{now_ticks, ZeroTimestamp, ZeroTimestampClock};
pub use control_file::{parse_control_file, read_desired_devices, CONTROL_FILE_PATH};
pub use device::{
    DeviceInstance, DeviceState, HEALTH_CHECK_INTERVAL, HEARTBEAT_INTERVAL, MAX_OPEN_RETRIES,
    OPEN_RETRY_BASE_DELAY, STATS_LOG_INTERVAL,
};
pub use error::DriverError;
pub use fleet::{driver_entry, ProxyFleet, DEVICE_COOLDOWN};
pub use handler::{Handler, InputSampleKind, IoStats, StreamFormat};
pub use heartbeat::HeartbeatTracker;
pub use resampler::LinearResampler;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        let _tracker = HeartbeatTracker::new();
        let _clock = ZeroTimestampClock::new();
        assert_eq!(CONTROL_FILE_PATH, "/tmp/radioform-devices.txt");
    }
}
