//! DSP Error Types

use thiserror::Error;

/// Errors that can occur during DSP operations
#[derive(Error, Debug)]
pub enum DspError {
    #[error("sample rate {0} outside supported range 8000-384000 Hz")]
    InvalidSampleRate(u32),

    #[error("invalid band index: {index} (engine has {active} active bands)")]
    InvalidBandIndex { index: usize, active: usize },

    #[error("invalid preset: {0}")]
    InvalidPreset(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DspError::InvalidSampleRate(1000);
        assert!(err.to_string().contains("1000"));

        let err = DspError::InvalidBandIndex {
            index: 12,
            active: 10,
        };
        assert!(err.to_string().contains("12"));
    }
}
