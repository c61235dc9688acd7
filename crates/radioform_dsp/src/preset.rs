//! EQ preset types and validation.

use serde::{Deserialize, Serialize};

use crate::error::DspError;

/// Maximum number of EQ bands.
pub const MAX_BANDS: usize = 10;

/// Default 10-band frequencies (standard graphic-EQ octave centers).
pub const DEFAULT_BAND_FREQUENCIES: [f32; MAX_BANDS] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Filter type for an EQ band. A closed set; each variant selects one RBJ
/// cookbook formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterType {
    /// Parametric peak/dip (bell curve)
    Peak,
    /// Low shelf (boost/cut bass)
    LowShelf,
    /// High shelf (boost/cut treble)
    HighShelf,
    LowPass,
    HighPass,
    /// Narrow rejection
    Notch,
    BandPass,
}

/// Configuration for a single EQ band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandConfig {
    /// Center frequency in Hz (20 - 20000)
    pub frequency_hz: f32,
    /// Gain in dB (-12.0 to +12.0)
    pub gain_db: f32,
    /// Q factor (0.1 to 10.0)
    pub q_factor: f32,
    pub filter_type: FilterType,
    pub enabled: bool,
}

/// Complete EQ preset: band table plus preamp and limiter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub bands: [BandConfig; MAX_BANDS],
    /// Number of active bands (1-10). Bands past this index are ignored.
    pub num_bands: u32,
    /// Global preamp gain in dB (-12.0 to +12.0)
    pub preamp_db: f32,
    /// Enable the soft limiter after the EQ cascade
    pub limiter_enabled: bool,
    /// Limiter threshold in dB (-6.0 to 0.0)
    pub limiter_threshold_db: f32,
    pub name: String,
}

impl Preset {
    /// Flat response: all bands present but disabled, 0 dB preamp,
    /// limiter off.
    pub fn flat() -> Self {
        let bands = core::array::from_fn(|i| BandConfig {
            frequency_hz: DEFAULT_BAND_FREQUENCIES[i],
            gain_db: 0.0,
            q_factor: 1.0,
            filter_type: FilterType::Peak,
            enabled: false,
        });
        Self {
            bands,
            num_bands: MAX_BANDS as u32,
            preamp_db: 0.0,
            limiter_enabled: false,
            limiter_threshold_db: -0.1,
            name: "Flat".to_string(),
        }
    }

    /// Check every field is inside its valid range and finite.
    pub fn validate(&self) -> Result<(), DspError> {
        if self.num_bands == 0 || self.num_bands > MAX_BANDS as u32 {
            return Err(DspError::InvalidPreset(format!(
                "num_bands {} outside 1..={MAX_BANDS}",
                self.num_bands
            )));
        }

        for (i, band) in self.bands[..self.num_bands as usize].iter().enumerate() {
            if !band.frequency_hz.is_finite()
                || !(20.0..=20000.0).contains(&band.frequency_hz)
            {
                return Err(DspError::InvalidPreset(format!(
                    "band {i} frequency {} outside [20, 20000]",
                    band.frequency_hz
                )));
            }
            if !band.gain_db.is_finite() || !(-12.0..=12.0).contains(&band.gain_db) {
                return Err(DspError::InvalidPreset(format!(
                    "band {i} gain {} outside [-12, 12]",
                    band.gain_db
                )));
            }
            if !band.q_factor.is_finite() || !(0.1..=10.0).contains(&band.q_factor) {
                return Err(DspError::InvalidPreset(format!(
                    "band {i} Q {} outside [0.1, 10]",
                    band.q_factor
                )));
            }
        }

        if !self.preamp_db.is_finite() || !(-12.0..=12.0).contains(&self.preamp_db) {
            return Err(DspError::InvalidPreset(format!(
                "preamp {} outside [-12, 12]",
                self.preamp_db
            )));
        }
        if !self.limiter_threshold_db.is_finite()
            || !(-6.0..=0.0).contains(&self.limiter_threshold_db)
        {
            return Err(DspError::InvalidPreset(format!(
                "limiter threshold {} outside [-6, 0]",
                self.limiter_threshold_db
            )));
        }

        Ok(())
    }
}

impl Default for Preset {
    fn default() -> Self {
        Self::flat()
    }
}
