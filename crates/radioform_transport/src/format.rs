//! Sample format tags and float32 <-> ring format conversion.
//!
//! The ring stores whatever format the segment was created with; the
//! producer always hands in float32 and the consumer always gets float32
//! back. Conversion is asymmetric on purpose: integer writes scale by the
//! maximum positive value (so a full-scale float never clips), while reads
//! divide by 2^(n-1) (so well-formed ring content decodes to magnitudes
//! <= 1.0).

use serde::{Deserialize, Serialize};

/// On-ring sample encoding. The raw tag value is what lands in the
/// segment header's `format` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleFormat {
    Float32,
    Float64,
    Int16,
    /// 24-bit packed little-endian, 3 bytes per sample.
    Int24,
    Int32,
}

impl SampleFormat {
    /// Decode the header tag. Unknown tags are rejected rather than
    /// defaulted; a segment with a bad format field is not usable.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SampleFormat::Float32),
            1 => Some(SampleFormat::Float64),
            2 => Some(SampleFormat::Int16),
            3 => Some(SampleFormat::Int24),
            4 => Some(SampleFormat::Int32),
            _ => None,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            SampleFormat::Float32 => 0,
            SampleFormat::Float64 => 1,
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Int32 => 4,
        }
    }

    pub fn bytes_per_sample(self) -> u32 {
        match self {
            SampleFormat::Float32 => 4,
            SampleFormat::Float64 => 8,
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Int32 => 4,
        }
    }
}

/// Encode one float32 sample into `buf` (little-endian). `buf` receives
/// exactly `format.bytes_per_sample()` bytes. Integer formats clamp to
/// [-1.0, 1.0] first.
pub(crate) fn encode_sample(format: SampleFormat, sample: f32, buf: &mut [u8; 8]) -> usize {
    match format {
        SampleFormat::Float32 => {
            buf[..4].copy_from_slice(&sample.to_le_bytes());
            4
        }
        SampleFormat::Float64 => {
            buf[..8].copy_from_slice(&(sample as f64).to_le_bytes());
            8
        }
        SampleFormat::Int16 => {
            let v = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            buf[..2].copy_from_slice(&v.to_le_bytes());
            2
        }
        SampleFormat::Int24 => {
            let v = (sample.clamp(-1.0, 1.0) * 8_388_607.0) as i32;
            let b = v.to_le_bytes();
            buf[..3].copy_from_slice(&b[..3]);
            3
        }
        SampleFormat::Int32 => {
            let v = (sample.clamp(-1.0, 1.0) as f64 * 2_147_483_647.0) as i32;
            buf[..4].copy_from_slice(&v.to_le_bytes());
            4
        }
    }
}

/// Decode one sample from ring bytes back to float32.
pub(crate) fn decode_sample(format: SampleFormat, src: &[u8]) -> f32 {
    match format {
        SampleFormat::Float32 => f32::from_le_bytes([src[0], src[1], src[2], src[3]]),
        SampleFormat::Float64 => f64::from_le_bytes([
            src[0], src[1], src[2], src[3], src[4], src[5], src[6], src[7],
        ]) as f32,
        SampleFormat::Int16 => i16::from_le_bytes([src[0], src[1]]) as f32 / 32768.0,
        SampleFormat::Int24 => {
            // Sign-extend 24 -> 32 bits before scaling.
            let v = (src[0] as i32) | ((src[1] as i32) << 8) | ((src[2] as i32) << 16);
            let v = (v << 8) >> 8;
            v as f32 / 8_388_608.0
        }
        SampleFormat::Int32 => {
            i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f32 / 2_147_483_648.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(format: SampleFormat, sample: f32) -> f32 {
        let mut buf = [0u8; 8];
        let n = encode_sample(format, sample, &mut buf);
        decode_sample(format, &buf[..n])
    }

    #[test]
    fn test_raw_tags_round_trip() {
        for format in [
            SampleFormat::Float32,
            SampleFormat::Float64,
            SampleFormat::Int16,
            SampleFormat::Int24,
            SampleFormat::Int32,
        ] {
            assert_eq!(SampleFormat::from_raw(format.raw()), Some(format));
        }
        assert_eq!(SampleFormat::from_raw(5), None);
    }

    #[test]
    fn test_float32_is_exact() {
        for v in [0.0, 1.0, -1.0, 0.25, -0.66667, f32::MIN_POSITIVE] {
            assert_eq!(round_trip(SampleFormat::Float32, v), v);
        }
    }

    #[test]
    fn test_int_formats_within_quantisation_error() {
        // Two quanta of headroom: one for truncation, one for the
        // deliberate write-by-32767 / read-by-32768 scale asymmetry.
        let cases = [
            (SampleFormat::Int16, 2.0 / 32768.0),
            (SampleFormat::Int24, 2.0 / 8_388_608.0),
            (SampleFormat::Int32, 2.0 / 2_147_483_648.0),
        ];
        for (format, tolerance) in cases {
            for v in [0.0f32, 0.5, -0.5, 0.999, -0.999, 0.123456, -0.987654] {
                let out = round_trip(format, v);
                assert!(
                    (out - v).abs() <= tolerance,
                    "{:?}: {} -> {} (tol {})",
                    format,
                    v,
                    out,
                    tolerance
                );
            }
        }
    }

    #[test]
    fn test_integer_write_clamps_out_of_range() {
        assert!((round_trip(SampleFormat::Int16, 2.0) - 32767.0 / 32768.0).abs() < 1e-6);
        assert!((round_trip(SampleFormat::Int16, -2.0) + 32767.0 / 32768.0).abs() < 1e-6);
        assert!(round_trip(SampleFormat::Int24, 10.0) <= 1.0);
        assert!(round_trip(SampleFormat::Int32, 10.0) <= 1.0);
    }

    #[test]
    fn test_int24_negative_sign_extension() {
        let out = round_trip(SampleFormat::Int24, -0.75);
        assert!((out + 0.75).abs() <= 2.0 / 8_388_608.0);
    }

    #[test]
    fn test_full_scale_never_overflows() {
        // Full-scale write must decode to a magnitude <= 1.0 in every format.
        for format in [SampleFormat::Int16, SampleFormat::Int24, SampleFormat::Int32] {
            assert!(round_trip(format, 1.0).abs() <= 1.0);
            assert!(round_trip(format, -1.0).abs() <= 1.0);
        }
    }
}
