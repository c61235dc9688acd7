//! Stereo peak metering with sample-rate-independent decay.

use crate::smoothing::gain_to_db;

/// Meter readout floor in dBFS.
pub const METER_FLOOR_DB: f32 = -120.0;

/// Exponential peak-hold meter. Given a block's peak `p_block` over
/// `n` frames, the stored peak becomes
/// `max(p_block, p_prev * exp(-n / (0.3 * sample_rate)))`, so the decay
/// rate is the same wall-clock speed at every sample rate.
pub(crate) struct StereoPeakMeter {
    peak: [f32; 2],
    decay_frames: f32,
}

impl StereoPeakMeter {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            peak: [0.0; 2],
            decay_frames: 0.3 * sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.decay_frames = 0.3 * sample_rate;
    }

    pub fn reset(&mut self) {
        self.peak = [0.0; 2];
    }

    /// Fold one block's peaks in; returns the updated linear peaks.
    pub fn update_block(&mut self, peak_left: f32, peak_right: f32, n_frames: usize) -> (f32, f32) {
        let decay = (-(n_frames as f32) / self.decay_frames).exp();
        self.peak[0] = peak_left.max(self.peak[0] * decay);
        self.peak[1] = peak_right.max(self.peak[1] * decay);
        (self.peak[0], self.peak[1])
    }
}

/// Linear peak to dBFS with the -120 dB floor.
pub(crate) fn peak_to_db(peak: f32) -> f32 {
    if peak <= 0.0 {
        return METER_FLOOR_DB;
    }
    gain_to_db(peak).max(METER_FLOOR_DB)
}
