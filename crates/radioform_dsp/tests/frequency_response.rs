//! Frequency response validation - the gold standard for EQ testing.
//!
//! Each case applies a preset, drives sine waves through the planar path,
//! and asserts on output/input RMS ratios in dB.

mod util;

use radioform_dsp::{BandConfig, DspEngine, FilterType, Preset};
use util::{compute_thd, gain_to_db, generate_sine, measure_rms};

const SAMPLE_RATE: u32 = 48000;

fn single_band_preset(filter_type: FilterType, frequency_hz: f32, gain_db: f32, q: f32) -> Preset {
    let mut preset = Preset::flat();
    preset.num_bands = 1;
    preset.bands[0] = BandConfig {
        frequency_hz,
        gain_db,
        q_factor: q,
        filter_type,
        enabled: true,
    };
    preset
}

/// Process a fresh sine through the engine and return the RMS gain in dB.
/// Resets and reapplies the preset first so each measurement starts cold.
fn measure_gain_db(engine: &mut DspEngine, preset: &Preset, frequency: f32, length: usize) -> f32 {
    engine.reset();
    engine.apply_preset(preset).unwrap();

    let input = generate_sine(length, frequency, SAMPLE_RATE as f32);
    let mut left = input.clone();
    let mut right = input.clone();
    engine.process_planar(&mut left, &mut right);

    gain_to_db(measure_rms(&left) / measure_rms(&input))
}

#[test]
fn flat_preset_is_transparent() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = Preset::flat();

    for freq in [100.0, 500.0, 1000.0, 5000.0, 10000.0] {
        let gain = measure_gain_db(&mut engine, &preset, freq, 4800);
        assert!(gain.abs() <= 0.8, "{freq} Hz: {gain} dB not transparent");
    }
}

#[test]
fn peak_filter_boosts_center_frequency() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::Peak, 1000.0, 6.0, 2.0);

    let at_center = measure_gain_db(&mut engine, &preset, 1000.0, 4800);
    assert!(
        (5.0..=7.0).contains(&at_center),
        "1 kHz boost {at_center} dB outside [5, 7]"
    );

    let off_center = measure_gain_db(&mut engine, &preset, 100.0, 4800);
    assert!(
        (-1.0..=1.0).contains(&off_center),
        "100 Hz response {off_center} dB outside [-1, 1]"
    );
}

#[test]
fn peak_filter_cuts_center_frequency() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::Peak, 1000.0, -6.0, 2.0);

    let at_center = measure_gain_db(&mut engine, &preset, 1000.0, 4800);
    assert!(
        (-7.0..=-5.0).contains(&at_center),
        "1 kHz cut {at_center} dB outside [-7, -5]"
    );
}

#[test]
fn low_shelf_boosts_bass() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::LowShelf, 250.0, 6.0, 0.707);

    let bass = measure_gain_db(&mut engine, &preset, 100.0, 4800);
    assert!(bass >= 3.0, "100 Hz gained only {bass} dB");

    let mids = measure_gain_db(&mut engine, &preset, 2000.0, 4800);
    assert!(mids < 1.0, "2 kHz gained {mids} dB");
}

#[test]
fn high_shelf_boosts_treble() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::HighShelf, 4000.0, 6.0, 0.707);

    let treble = measure_gain_db(&mut engine, &preset, 8000.0, 4800);
    assert!(treble >= 3.0, "8 kHz gained only {treble} dB");

    let mids = measure_gain_db(&mut engine, &preset, 500.0, 4800);
    assert!(mids < 1.0, "500 Hz gained {mids} dB");
}

#[test]
fn v_shaped_multi_band_eq() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();

    let mut preset = Preset::flat();
    preset.num_bands = 3;
    preset.bands[0] = BandConfig {
        frequency_hz: 100.0,
        gain_db: 6.0,
        q_factor: 0.707,
        filter_type: FilterType::LowShelf,
        enabled: true,
    };
    preset.bands[1] = BandConfig {
        frequency_hz: 1000.0,
        gain_db: -6.0,
        q_factor: 1.0,
        filter_type: FilterType::Peak,
        enabled: true,
    };
    preset.bands[2] = BandConfig {
        frequency_hz: 8000.0,
        gain_db: 6.0,
        q_factor: 0.707,
        filter_type: FilterType::HighShelf,
        enabled: true,
    };

    let bass = measure_gain_db(&mut engine, &preset, 50.0, 4800);
    assert!(bass > 3.0, "bass {bass} dB");

    let mids = measure_gain_db(&mut engine, &preset, 1000.0, 4800);
    assert!(mids < -3.0, "mids {mids} dB");

    let treble = measure_gain_db(&mut engine, &preset, 10000.0, 4800);
    assert!(treble > 3.0, "treble {treble} dB");
}

#[test]
fn notch_rejects_center_frequency() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::Notch, 1000.0, 0.0, 4.0);

    let at_center = measure_gain_db(&mut engine, &preset, 1000.0, 9600);
    assert!(at_center < -10.0, "notch only attenuated {at_center} dB");

    let far_away = measure_gain_db(&mut engine, &preset, 8000.0, 4800);
    assert!(far_away.abs() < 1.0, "8 kHz response {far_away} dB");
}

#[test]
fn thd_remains_low_at_moderate_boost() {
    let mut engine = DspEngine::new(SAMPLE_RATE).unwrap();
    let preset = single_band_preset(FilterType::Peak, 1000.0, 6.0, 1.0);
    engine.apply_preset(&preset).unwrap();

    let input = generate_sine(48000, 1000.0, SAMPLE_RATE as f32);
    let mut left = input.clone();
    let mut right = input;
    engine.process_planar(&mut left, &mut right);

    let thd = compute_thd(&left, 1000.0, SAMPLE_RATE as f32, 5);
    assert!(thd < 0.001, "THD {thd} exceeds 0.1%");
}
