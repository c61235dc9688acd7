//! Driver Error Types

use thiserror::Error;

/// Errors surfaced by the device runtime. Inside the steady-state I/O
/// callback everything is recovered locally (counters + state machine);
/// these only escape through the control-path entry points.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("could not open shared segment after {attempts} attempts: {last_error}")]
    IoStartFailed { attempts: u32, last_error: String },

    #[error("health check failed: {0}")]
    HealthFailure(String),

    #[error(transparent)]
    Transport(#[from] radioform_transport::TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DriverError::IoStartFailed {
            attempts: 15,
            last_error: "segment file not found: /tmp/radioform-x".into(),
        };
        assert!(err.to_string().contains("15"));
        assert!(err.to_string().contains("radioform-x"));
    }
}
