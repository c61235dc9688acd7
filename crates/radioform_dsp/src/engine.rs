//! The DSP engine: preamp, band cascade, DC blocker, limiter, meters.
//!
//! Signal path (non-bypass):
//!
//! ```text
//! input ─▶ preamp(smoothed) ─▶ band[0..num_bands-1] ─▶ DC blocker
//!       ─▶ limiter? ─▶ peak meters ─▶ output
//! ```
//!
//! # Real-time Safety
//!
//! `process_interleaved` and `process_planar` perform no allocations, take
//! no locks, and touch only atomics with relaxed ordering. Bypass is checked
//! once at the top of each call; when set the buffers are left untouched.
//!
//! The engine itself is owned by one thread (in practice the audio thread).
//! Other threads interact through [`DspControls`], which carries only the
//! lock-free shared state (bypass, stats, meters).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::biquad::Biquad;
use crate::dc_blocker::StereoDcBlocker;
use crate::denormal::enable_denormal_suppression;
use crate::error::DspError;
use crate::limiter::SoftLimiter;
use crate::meters::{peak_to_db, StereoPeakMeter};
use crate::preset::{Preset, MAX_BANDS};
use crate::smoothing::{db_to_gain, PreampSmoother};

/// Engine statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EngineStats {
    pub frames_processed: u64,
    /// EMA of wall-clock block time over available time, 0-100+.
    pub cpu_load_percent: f32,
    pub bypass_active: bool,
    pub sample_rate: u32,
    pub peak_left_db: f32,
    pub peak_right_db: f32,
}

/// Lock-free state shared between the engine and control threads.
struct SharedState {
    bypass: AtomicBool,
    frames_processed: AtomicU64,
    sample_rate: AtomicU32,
    // f32 values bit-cast into AtomicU32.
    cpu_load_bits: AtomicU32,
    peak_left_bits: AtomicU32,
    peak_right_bits: AtomicU32,
}

impl SharedState {
    fn new(sample_rate: u32) -> Self {
        Self {
            bypass: AtomicBool::new(false),
            frames_processed: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            cpu_load_bits: AtomicU32::new(0.0f32.to_bits()),
            peak_left_bits: AtomicU32::new(0.0f32.to_bits()),
            peak_right_bits: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    fn stats(&self) -> EngineStats {
        EngineStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            cpu_load_percent: f32::from_bits(self.cpu_load_bits.load(Ordering::Relaxed)),
            bypass_active: self.bypass.load(Ordering::Relaxed),
            sample_rate: self.sample_rate.load(Ordering::Relaxed),
            peak_left_db: peak_to_db(f32::from_bits(self.peak_left_bits.load(Ordering::Relaxed))),
            peak_right_db: peak_to_db(f32::from_bits(
                self.peak_right_bits.load(Ordering::Relaxed),
            )),
        }
    }
}

/// Cloneable handle for the lock-free engine controls. Safe to use from any
/// thread while the audio thread owns the engine.
#[derive(Clone)]
pub struct DspControls {
    shared: Arc<SharedState>,
}

impl DspControls {
    /// Atomic store, instant, no ramp. Bypass is an emergency path and must
    /// not wait for a fade.
    pub fn set_bypass(&self, bypassed: bool) {
        self.shared.bypass.store(bypassed, Ordering::Relaxed);
    }

    pub fn bypass(&self) -> bool {
        self.shared.bypass.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }
}

/// Stereo 10-band parametric EQ engine.
pub struct DspEngine {
    sample_rate: u32,
    bands: [Biquad; MAX_BANDS],
    preset: Preset,
    preamp: PreampSmoother,
    dc_blocker: StereoDcBlocker,
    limiter: SoftLimiter,
    meter: StereoPeakMeter,
    /// Coefficient transition length for realtime updates (~10 ms).
    ramp_samples: u32,
    shared: Arc<SharedState>,
}

impl DspEngine {
    /// Create an engine at a fixed sample rate in [8000, 384000] Hz with a
    /// flat preset applied. Enables denormal suppression on the calling
    /// thread.
    pub fn new(sample_rate: u32) -> Result<Self, DspError> {
        if !(8000..=384000).contains(&sample_rate) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }

        enable_denormal_suppression();

        let sr = sample_rate as f32;
        let mut engine = Self {
            sample_rate,
            bands: core::array::from_fn(|_| Biquad::new()),
            preset: Preset::flat(),
            preamp: PreampSmoother::new(sr, 10.0),
            dc_blocker: StereoDcBlocker::new(sr),
            limiter: SoftLimiter::new(-0.1),
            meter: StereoPeakMeter::new(sr),
            ramp_samples: sample_rate / 100,
            shared: Arc::new(SharedState::new(sample_rate)),
        };

        let flat = engine.preset.clone();
        engine.apply_preset(&flat)?;
        Ok(engine)
    }

    /// Handle for other threads: bypass and stats only.
    pub fn controls(&self) -> DspControls {
        DspControls {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Process an interleaved stereo buffer in-place: `[L0, R0, L1, R1, ..]`.
    pub fn process_interleaved(&mut self, buffer: &mut [f32]) {
        let frames = buffer.len() / 2;
        if frames == 0 {
            return;
        }
        if self.shared.bypass.load(Ordering::Relaxed) {
            return;
        }
        let started = Instant::now();

        let active = self.preset.num_bands as usize;
        let limiter_on = self.preset.limiter_enabled;
        let mut peak_left = 0.0f32;
        let mut peak_right = 0.0f32;

        for frame in buffer.chunks_exact_mut(2) {
            let gain = self.preamp.next();
            let mut left = frame[0] * gain;
            let mut right = frame[1] * gain;

            for band in 0..active {
                if self.preset.bands[band].enabled {
                    (left, right) = self.bands[band].process_sample(left, right);
                }
            }

            (left, right) = self.dc_blocker.process_sample(left, right);

            if limiter_on {
                left = self.limiter.process_sample(left);
                right = self.limiter.process_sample(right);
            }

            peak_left = peak_left.max(left.abs());
            peak_right = peak_right.max(right.abs());
            frame[0] = left;
            frame[1] = right;
        }

        self.finish_block(peak_left, peak_right, frames, started);
    }

    /// Process planar stereo buffers in-place.
    pub fn process_planar(&mut self, left: &mut [f32], right: &mut [f32]) {
        debug_assert_eq!(left.len(), right.len());
        let frames = left.len().min(right.len());
        if frames == 0 {
            return;
        }
        if self.shared.bypass.load(Ordering::Relaxed) {
            return;
        }
        let started = Instant::now();

        let left = &mut left[..frames];
        let right = &mut right[..frames];

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.preamp.next();
            *l *= gain;
            *r *= gain;
        }

        let active = self.preset.num_bands as usize;
        for band in 0..active {
            if self.preset.bands[band].enabled {
                self.bands[band].process_planar(left, right);
            }
        }

        self.dc_blocker.process_planar(left, right);

        if self.preset.limiter_enabled {
            self.limiter.process_planar(left, right);
        }

        let mut peak_left = 0.0f32;
        let mut peak_right = 0.0f32;
        for &v in left.iter() {
            peak_left = peak_left.max(v.abs());
        }
        for &v in right.iter() {
            peak_right = peak_right.max(v.abs());
        }

        self.finish_block(peak_left, peak_right, frames, started);
    }

    fn finish_block(&mut self, peak_left: f32, peak_right: f32, frames: usize, started: Instant) {
        let (pl, pr) = self.meter.update_block(peak_left, peak_right, frames);
        self.shared
            .peak_left_bits
            .store(pl.to_bits(), Ordering::Relaxed);
        self.shared
            .peak_right_bits
            .store(pr.to_bits(), Ordering::Relaxed);
        self.shared
            .frames_processed
            .fetch_add(frames as u64, Ordering::Relaxed);

        let available = frames as f32 / self.sample_rate as f32;
        let load = 100.0 * started.elapsed().as_secs_f32() / available;
        let previous = f32::from_bits(self.shared.cpu_load_bits.load(Ordering::Relaxed));
        let smoothed = 0.1 * load + 0.9 * previous;
        self.shared
            .cpu_load_bits
            .store(smoothed.to_bits(), Ordering::Relaxed);
    }

    /// Apply a complete preset. Coefficients change instantly (cold path,
    /// no audio assumption); the preamp retargets through its smoother.
    pub fn apply_preset(&mut self, preset: &Preset) -> Result<(), DspError> {
        preset.validate()?;
        self.preset = preset.clone();

        let sr = self.sample_rate as f32;
        let active = self.preset.num_bands as usize;
        for i in 0..MAX_BANDS {
            if i < active && self.preset.bands[i].enabled {
                let band = self.preset.bands[i];
                self.bands[i].set_band(&band, sr);
            } else {
                self.bands[i].set_flat();
            }
        }

        self.preamp.set_target(db_to_gain(self.preset.preamp_db));
        if self.preset.limiter_enabled {
            self.limiter.set_threshold(self.preset.limiter_threshold_db);
        }
        Ok(())
    }

    /// The currently active preset.
    pub fn preset(&self) -> &Preset {
        &self.preset
    }

    /// Update one band's gain; the coefficient change is ramped in over
    /// ~10 ms to avoid zipper noise.
    pub fn update_band_gain(&mut self, index: usize, gain_db: f32) -> Result<(), DspError> {
        self.check_band(index)?;
        self.preset.bands[index].gain_db = gain_db.clamp(-12.0, 12.0);
        self.retarget_band(index);
        Ok(())
    }

    /// Update one band's center frequency (smoothed).
    pub fn update_band_frequency(&mut self, index: usize, frequency_hz: f32) -> Result<(), DspError> {
        self.check_band(index)?;
        self.preset.bands[index].frequency_hz = frequency_hz.clamp(20.0, 20000.0);
        self.retarget_band(index);
        Ok(())
    }

    /// Update one band's Q factor (smoothed).
    pub fn update_band_q(&mut self, index: usize, q_factor: f32) -> Result<(), DspError> {
        self.check_band(index)?;
        self.preset.bands[index].q_factor = q_factor.clamp(0.1, 10.0);
        self.retarget_band(index);
        Ok(())
    }

    /// Update the preamp gain; retargets the smoother, no discontinuity.
    pub fn update_preamp(&mut self, gain_db: f32) {
        self.preset.preamp_db = gain_db.clamp(-12.0, 12.0);
        self.preamp.set_target(db_to_gain(self.preset.preamp_db));
    }

    /// Instant lock-free bypass (also available through [`DspControls`]).
    pub fn set_bypass(&self, bypassed: bool) {
        self.shared.bypass.store(bypassed, Ordering::Relaxed);
    }

    pub fn bypass(&self) -> bool {
        self.shared.bypass.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> EngineStats {
        self.shared.stats()
    }

    /// Clear all filter state, the DC blocker, and the statistics.
    pub fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
        self.dc_blocker.reset();
        self.meter.reset();
        self.shared.frames_processed.store(0, Ordering::Relaxed);
        self.shared
            .cpu_load_bits
            .store(0.0f32.to_bits(), Ordering::Relaxed);
        self.shared
            .peak_left_bits
            .store(0.0f32.to_bits(), Ordering::Relaxed);
        self.shared
            .peak_right_bits
            .store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    /// Change sample rate: re-initialises the smoother, transition length,
    /// and DC blocker, then reapplies the current preset.
    pub fn set_sample_rate(&mut self, sample_rate: u32) -> Result<(), DspError> {
        if !(8000..=384000).contains(&sample_rate) {
            return Err(DspError::InvalidSampleRate(sample_rate));
        }
        self.sample_rate = sample_rate;
        self.shared.sample_rate.store(sample_rate, Ordering::Relaxed);

        let sr = sample_rate as f32;
        self.preamp = PreampSmoother::new(sr, 10.0);
        self.ramp_samples = sample_rate / 100;
        self.dc_blocker = StereoDcBlocker::new(sr);
        self.meter.set_sample_rate(sr);

        let preset = self.preset.clone();
        self.apply_preset(&preset)
    }

    fn check_band(&self, index: usize) -> Result<(), DspError> {
        let active = self.preset.num_bands as usize;
        if index >= active {
            return Err(DspError::InvalidBandIndex { index, active });
        }
        Ok(())
    }

    fn retarget_band(&mut self, index: usize) {
        let band = self.preset.bands[index];
        self.bands[index].retarget(&band, self.sample_rate as f32, self.ramp_samples);
    }
}
