//! Transport Error Types

use thiserror::Error;

/// Errors that can occur while creating, opening, or validating a segment.
///
/// Overruns and underruns are deliberately *not* errors; they are counted in
/// the segment header and the data path keeps going.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("unsupported configuration: {0}")]
    ConfigError(String),

    #[error("protocol version mismatch: found {found:#010x}, expected {expected:#010x}")]
    ProtocolMismatch { found: u32, expected: u32 },

    #[error("segment declares an unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("segment file not found: {0}")]
    SegmentNotFound(String),

    #[error("segment file too small: {actual} bytes, need at least {required}")]
    SegmentTooSmall { actual: u64, required: u64 },

    #[error("failed to map segment: {0}")]
    MapFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TransportError::ProtocolMismatch {
            found: 0x0001_0000,
            expected: 0x0002_0000,
        };
        assert!(err.to_string().contains("0x00010000"));
        assert!(err.to_string().contains("0x00020000"));

        let err = TransportError::SegmentTooSmall {
            actual: 100,
            required: 256,
        };
        assert!(err.to_string().contains("100"));
    }
}
