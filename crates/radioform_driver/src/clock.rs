//! Monotonic zero-timestamp generation for the platform I/O cycle.
//!
//! The platform asks for a monotonic (sample_time, host_time) pair once per
//! I/O period. A naive "+1 period per call" counter falls behind whenever
//! the process is scheduled late; dividing elapsed host time by the period
//! length instead stays monotonic, catches up after a stall, and keeps its
//! anchor across I/O start/stop cycles so the host's drift compensation
//! never sees a cold-start jump.
//!
//! Ticks are nanoseconds from [`now_ticks`]; the generator takes them as an
//! argument so tests can drive time explicitly.

/// One timestamp pair handed to the platform per I/O period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZeroTimestamp {
    /// Sample clock: `period_counter * period_frames`.
    pub sample_time: f64,
    /// Host clock in ticks, aligned to the period grid.
    pub host_time: u64,
    /// Timeline generation. Stays 1; the anchor never resets.
    pub seed: u64,
}

/// Zero-timestamp generator. One per device; called from the I/O thread
/// under the platform's I/O lock.
pub struct ZeroTimestampClock {
    anchor_host_time: u64,
    period_counter: u64,
    ticks_per_frame: f64,
    last_sample_rate: u32,
}

impl ZeroTimestampClock {
    pub fn new() -> Self {
        Self {
            anchor_host_time: 0,
            period_counter: 0,
            ticks_per_frame: 0.0,
            last_sample_rate: 0,
        }
    }

    /// Produce the timestamp for the period containing `now_ticks`.
    pub fn next(
        &mut self,
        now_ticks: u64,
        sample_rate: u32,
        period_frames: u32,
    ) -> ZeroTimestamp {
        if self.anchor_host_time == 0 {
            self.anchor_host_time = now_ticks;
            self.period_counter = 0;
        }

        if sample_rate != self.last_sample_rate {
            self.ticks_per_frame = 1_000_000_000.0 / sample_rate as f64;
            self.last_sample_rate = sample_rate;
        }

        let ticks_per_period = self.ticks_per_frame * period_frames as f64;
        let elapsed = now_ticks.saturating_sub(self.anchor_host_time);
        self.period_counter = (elapsed as f64 / ticks_per_period) as u64;

        ZeroTimestamp {
            sample_time: (self.period_counter * period_frames as u64) as f64,
            host_time: self.anchor_host_time
                + (self.period_counter as f64 * ticks_per_period) as u64,
            seed: 1,
        }
    }
}

impl Default for ZeroTimestampClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Current monotonic time in nanoseconds.
pub fn now_ticks() -> u64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts);
    }
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
