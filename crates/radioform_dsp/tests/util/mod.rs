//! Signal generation and measurement helpers for the DSP test suites.

/// Generate a sine wave at the given frequency.
pub fn generate_sine(length: usize, frequency: f32, sample_rate: f32) -> Vec<f32> {
    let omega = 2.0 * std::f32::consts::PI * frequency / sample_rate;
    (0..length).map(|i| (omega * i as f32).sin()).collect()
}

/// Measure RMS level of a signal.
pub fn measure_rms(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let sum: f64 = signal.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / signal.len() as f64).sqrt() as f32
}

/// Single-bin DFT magnitude at a specific frequency.
pub fn magnitude_at_frequency(signal: &[f32], frequency: f32, sample_rate: f32) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    let omega = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;
    let mut real = 0.0f64;
    let mut imag = 0.0f64;
    for (i, &s) in signal.iter().enumerate() {
        real += s as f64 * (omega * i as f64).cos();
        imag += s as f64 * (omega * i as f64).sin();
    }
    real /= signal.len() as f64;
    imag /= signal.len() as f64;
    ((real * real + imag * imag).sqrt()) as f32
}

/// Total harmonic distortion: harmonics 2..=num_harmonics+1 vs fundamental.
pub fn compute_thd(
    signal: &[f32],
    fundamental_freq: f32,
    sample_rate: f32,
    num_harmonics: u32,
) -> f32 {
    let fundamental = magnitude_at_frequency(signal, fundamental_freq, sample_rate);
    let mut harmonic_sum = 0.0f32;
    for h in 2..=(num_harmonics + 1) {
        let harmonic = magnitude_at_frequency(signal, fundamental_freq * h as f32, sample_rate);
        harmonic_sum += harmonic * harmonic;
    }
    harmonic_sum.sqrt() / fundamental
}

/// Convert a linear gain ratio to dB.
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}
