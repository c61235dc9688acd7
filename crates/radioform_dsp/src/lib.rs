//! Radioform DSP - Parametric EQ Engine
//!
//! This crate provides the realtime audio processing core:
//! - 10-band parametric equalizer (RBJ biquad cascade, DF2T)
//! - Per-sample coefficient interpolation for click-free parameter changes
//! - Smoothed preamp, DC blocker, soft-knee limiter
//! - Stereo peak metering and CPU-load estimation
//! - Lock-free bypass and hardware denormal suppression
//!
//! # Architecture
//!
//! ```text
//! input ─▶ preamp(smoothed) ─▶ band[0..n] ─▶ DC blocker ─▶ limiter? ─▶ meters ─▶ output
//! ```
//!
//! The processing path follows a strict "no allocation in the audio
//! callback" rule. Bypass, meters, and stats are atomics so any thread can
//! read them; everything else is owned by whoever holds the engine, which
//! in practice is the audio thread.

mod biquad;
mod dc_blocker;
mod denormal;
mod engine;
mod error;
mod limiter;
mod meters;
mod preset;
mod smoothing;

pub use denormal::{disable_denormal_suppression, enable_denormal_suppression};
pub use engine::{DspControls, DspEngine, EngineStats};
pub use error::DspError;
pub use meters::METER_FLOOR_DB;
pub use preset::{BandConfig, FilterType, Preset, DEFAULT_BAND_FREQUENCIES, MAX_BANDS};

/// Library version string.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
