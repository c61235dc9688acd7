//! Radioform Transport - Shared-Memory Audio Channel
//!
//! This crate implements the inter-process audio transport between the
//! driver (producer) and the host application (consumer):
//! - Versioned, cache-line-aware shared-memory segment layout
//! - Single-producer / single-consumer lock-free ring buffer
//! - Sample format conversion (float32/float64/int16/int24/int32)
//! - Liveness via heartbeats and connection flags
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    regular file, mmap'd     ┌──────────────┐
//! │ Driver       │◄───────────────────────────►│ Host         │
//! │ (producer)   │   SegmentHeader + ring      │ (consumer)   │
//! │ write()      │   atomics carry all sync    │ read()       │
//! └──────────────┘                             └──────────────┘
//! ```
//!
//! The host creates the backing file and owns its lifetime; the driver only
//! maps and unmaps. All cross-process synchronisation happens through the
//! atomics in the header: payload stores happen-before the release store of
//! `write_index`, and the consumer's acquire load of `write_index` pairs
//! with it. Everything else (stats, heartbeats, flags) is advisory.

mod error;
mod format;
mod heartbeat;
mod layout;
mod segment;

pub use error::TransportError;
pub use format::SampleFormat;
pub use heartbeat::{HeartbeatObserver, HEARTBEAT_TIMEOUT};
pub use layout::{
    capability, frames_for_duration, sanitize_uid, segment_path, SegmentHeader,
    CONTROL_FILE_PATH, HEADER_SIZE, MAX_CHANNELS, PROTOCOL_VERSION, RING_DURATION_MS_DEFAULT,
    RING_DURATION_MS_MAX, RING_DURATION_MS_MIN, SUPPORTED_SAMPLE_RATES,
};
pub use segment::{peek_host_heartbeat, Segment};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        assert_eq!(PROTOCOL_VERSION, 0x0002_0000);
        assert_eq!(SampleFormat::Float32.bytes_per_sample(), 4);
    }
}
