//! Parameter smoothing to prevent zipper noise.

/// Second-order exponential smoother for the preamp gain.
///
/// A plain one-pole smoother still carries an audible corner when the target
/// jumps; the velocity term rounds that corner off. Per sample:
///
/// ```text
/// error    = target - current
/// velocity = a*velocity + (1-a)*error
/// current  = b*current + (1-b)*(target - 0.5*velocity)
/// ```
///
/// Time constant is ~10 ms; the initial value is 1.0 (0 dB).
pub(crate) struct PreampSmoother {
    current: f32,
    target: f32,
    velocity: f32,
    coeff: f32,
}

impl PreampSmoother {
    pub fn new(sample_rate: f32, time_constant_ms: f32) -> Self {
        let mut smoother = Self {
            current: 1.0,
            target: 1.0,
            velocity: 0.0,
            coeff: 0.0,
        };
        smoother.set_time_constant(sample_rate, time_constant_ms);
        smoother
    }

    pub fn set_time_constant(&mut self, sample_rate: f32, time_constant_ms: f32) {
        let tau = time_constant_ms * sample_rate / 1000.0;
        self.coeff = if tau > 0.0 { (-1.0 / tau).exp() } else { 0.0 };
    }

    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jump straight to a value with no ramp.
    #[cfg(test)]
    pub fn snap(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.velocity = 0.0;
    }

    /// Advance one sample and return the smoothed gain.
    #[inline]
    pub fn next(&mut self) -> f32 {
        let error = self.target - self.current;
        self.velocity = self.coeff * self.velocity + (1.0 - self.coeff) * error;
        self.current =
            self.coeff * self.current + (1.0 - self.coeff) * (self.target - 0.5 * self.velocity);
        self.current
    }
}

/// Convert decibels to linear gain.
#[inline]
pub(crate) fn db_to_gain(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert linear gain to decibels.
#[inline]
pub(crate) fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}
