//! Host Error Types

use thiserror::Error;

/// Errors that can occur in the host runtime
#[derive(Error, Debug)]
pub enum HostError {
    #[error("no audio output device found")]
    NoOutputDevice,

    #[error("failed to build audio stream: {0}")]
    StreamBuildError(String),

    #[error("failed to play audio stream: {0}")]
    StreamPlayError(String),

    #[error("failed to write control file: {0}")]
    ControlFileWrite(#[from] std::io::Error),

    #[error("segment is not usable here: {0}")]
    UnsupportedSegment(String),

    #[error("failed to spawn thread: {0}")]
    ThreadSpawnError(String),

    #[error("channel send failed - receiver dropped")]
    ChannelSendError,

    #[error("transport error: {0}")]
    Transport(#[from] radioform_transport::TransportError),

    #[error("DSP error: {0}")]
    Dsp(#[from] radioform_dsp::DspError),
}

/// Result type alias for host operations
pub type HostResult<T> = Result<T, HostError>;
