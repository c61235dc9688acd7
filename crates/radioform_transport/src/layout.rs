//! Shared segment memory layout.
//!
//! The header is a fixed 256-byte `#[repr(C)]` prefix (four cache lines),
//! immediately followed by `ring_capacity_frames * bytes_per_frame` bytes of
//! interleaved audio in the negotiated format. `header_size` is stored in the
//! header itself so the layout can grow in future protocol revisions without
//! breaking readers.
//!
//! All fields are little-endian on supported platforms; there is no
//! endianness negotiation.

use std::mem;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Protocol version (major = 2, minor = 0). A mapper that finds any other
/// value must refuse the segment and leave its `connected` flag at 0.
pub const PROTOCOL_VERSION: u32 = 0x0002_0000;

/// Maximum channel count (up to 7.1 surround).
pub const MAX_CHANNELS: u32 = 8;

/// Sample rates a segment may be created with.
pub const SUPPORTED_SAMPLE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Ring sizing bounds, expressed as a duration so they are
/// sample-rate independent.
pub const RING_DURATION_MS_MIN: u32 = 20;
pub const RING_DURATION_MS_MAX: u32 = 100;
pub const RING_DURATION_MS_DEFAULT: u32 = 40;

/// Size of [`SegmentHeader`]; the payload starts at this offset.
pub const HEADER_SIZE: usize = 256;

/// Well-known control file location: one `NAME|UID` line per proxy device,
/// written by the host, polled by the driver.
pub const CONTROL_FILE_PATH: &str = "/tmp/radioform-devices.txt";

/// Capability flag bits carried in `driver_capabilities` /
/// `host_capabilities`. Unknown bits are reserved and must be zero.
pub mod capability {
    pub const MULTI_SAMPLE_RATE: u32 = 1 << 0;
    pub const MULTI_FORMAT: u32 = 1 << 1;
    pub const MULTI_CHANNEL: u32 = 1 << 2;
    pub const SAMPLE_RATE_CONVERT: u32 = 1 << 3;
    pub const FORMAT_CONVERT: u32 = 1 << 4;
    pub const AUTO_RECONNECT: u32 = 1 << 5;
    pub const HEARTBEAT_MONITOR: u32 = 1 << 6;
}

/// Ring capacity in frames for a given rate and duration.
pub fn frames_for_duration(sample_rate: u32, duration_ms: u32) -> u32 {
    (sample_rate * duration_ms) / 1000
}

/// Replace characters that are unsafe in a file name (`:`, `/`, ` `) with `_`.
pub fn sanitize_uid(uid: &str) -> String {
    uid.chars()
        .map(|c| if matches!(c, ':' | '/' | ' ') { '_' } else { c })
        .collect()
}

/// Path of the shared-memory file backing the segment for a device UID.
pub fn segment_path(uid: &str) -> PathBuf {
    PathBuf::from(format!("/tmp/radioform-{}", sanitize_uid(uid)))
}

/// Header at the start of every shared segment.
///
/// The plain fields are written once by the creator (the host) before it
/// publishes `host_connected = 1` and are read-only afterwards; a format
/// change requires tearing down and rebuilding the segment. The atomics are
/// shared working state:
///
/// - `write_index` / `read_index` are monotonic 64-bit frame counters that
///   never wrap; they are reduced modulo `ring_capacity_frames` only when
///   indexing the payload. `0 <= write_index - read_index <= capacity` holds
///   whenever the segment is healthy.
/// - `read_index` is advanced only by the consumer, except in the producer's
///   overrun path where the producer reclaims space before writing.
/// - Heartbeats increment at least once per second while their side is alive.
#[repr(C)]
pub struct SegmentHeader {
    pub protocol_version: u32,
    pub header_size: u32,

    // Negotiated audio format.
    pub sample_rate: u32,
    pub channels: u32,
    pub format: u32,
    pub bytes_per_sample: u32,
    pub bytes_per_frame: u32,

    // Ring configuration.
    pub ring_capacity_frames: u32,
    pub ring_duration_ms: u32,

    // Capability flags.
    pub driver_capabilities: u32,
    pub host_capabilities: u32,

    _pad0: u32,

    /// Wall-clock seconds at creation. Informational only.
    pub creation_timestamp: u64,
    pub format_change_counter: AtomicU64,

    // Ring indices (frames, never wrapping).
    pub write_index: AtomicU64,
    pub read_index: AtomicU64,

    // Statistics.
    pub total_frames_written: AtomicU64,
    pub total_frames_read: AtomicU64,
    pub overrun_count: AtomicU64,
    pub underrun_count: AtomicU64,
    pub format_mismatch_count: AtomicU64,

    // Presence.
    pub driver_connected: AtomicU32,
    pub host_connected: AtomicU32,
    pub driver_heartbeat: AtomicU64,
    pub host_heartbeat: AtomicU64,

    _reserved: [u8; 112],
}

const _: () = assert!(mem::size_of::<SegmentHeader>() == HEADER_SIZE);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_four_cache_lines() {
        assert_eq!(mem::size_of::<SegmentHeader>(), 256);
    }

    #[test]
    fn test_frames_for_duration() {
        assert_eq!(frames_for_duration(48000, 40), 1920);
        assert_eq!(frames_for_duration(44100, 20), 882);
        assert_eq!(frames_for_duration(192000, 100), 19200);
    }

    #[test]
    fn test_sanitize_uid() {
        assert_eq!(sanitize_uid("com.example:out/1 a"), "com.example_out_1_a");
        assert_eq!(sanitize_uid("plain-uid"), "plain-uid");
    }

    #[test]
    fn test_segment_path() {
        assert_eq!(
            segment_path("spotify:device 1"),
            PathBuf::from("/tmp/radioform-spotify_device_1")
        );
    }

    #[test]
    fn test_capability_bits_are_distinct() {
        let all = capability::MULTI_SAMPLE_RATE
            | capability::MULTI_FORMAT
            | capability::MULTI_CHANNEL
            | capability::SAMPLE_RATE_CONVERT
            | capability::FORMAT_CONVERT
            | capability::AUTO_RECONNECT
            | capability::HEARTBEAT_MONITOR;
        assert_eq!(all.count_ones(), 7);
    }
}
