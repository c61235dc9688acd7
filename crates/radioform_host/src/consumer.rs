//! Ring consumer: shared segment -> DSP engine -> caller's buffer.

use std::sync::Arc;

use radioform_dsp::{DspControls, DspEngine};
use radioform_transport::Segment;

use crate::error::{HostError, HostResult};

/// The consumer side of one segment's ring, feeding the DSP engine.
///
/// # Real-time Safety
///
/// `process_block` allocates nothing and takes no locks; it is meant to be
/// called from the output device's audio callback. Exactly one consumer
/// reads any given segment.
pub struct RingConsumer {
    segment: Arc<Segment>,
    engine: DspEngine,
}

impl RingConsumer {
    /// Build a consumer over a stereo segment; the DSP engine is created at
    /// the segment's sample rate.
    pub fn new(segment: Arc<Segment>) -> HostResult<Self> {
        if segment.channels() != 2 {
            return Err(HostError::UnsupportedSegment(format!(
                "DSP path is stereo, segment has {} channels",
                segment.channels()
            )));
        }
        let engine = DspEngine::new(segment.sample_rate())?;
        Ok(Self { segment, engine })
    }

    /// Lock-free controls (bypass, stats) usable from any thread.
    pub fn controls(&self) -> DspControls {
        self.engine.controls()
    }

    pub fn engine_mut(&mut self) -> &mut DspEngine {
        &mut self.engine
    }

    pub fn segment(&self) -> &Arc<Segment> {
        &self.segment
    }

    /// Fill `output` (interleaved stereo float32) from the ring and run it
    /// through the DSP chain in place. Missing frames arrive as silence and
    /// count one underrun on the segment. Returns real frames read.
    pub fn process_block(&mut self, output: &mut [f32]) -> u32 {
        let frames_read = self.segment.read(output);
        self.engine.process_interleaved(output);
        frames_read
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radioform_transport::SampleFormat;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn make_segment(dir: &tempfile::TempDir) -> Arc<Segment> {
        let path = dir.path().join("seg");
        Arc::new(Segment::create(&path, 48000, 2, SampleFormat::Float32, 20).unwrap())
    }

    #[test]
    fn test_rejects_non_stereo_segment() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono");
        let seg = Arc::new(Segment::create(&path, 48000, 1, SampleFormat::Float32, 20).unwrap());
        assert!(matches!(
            RingConsumer::new(seg),
            Err(HostError::UnsupportedSegment(_))
        ));
    }

    #[test]
    fn test_consumes_ring_through_flat_chain() {
        let dir = tempdir().unwrap();
        let segment = make_segment(&dir);
        let mut consumer = RingConsumer::new(Arc::clone(&segment)).unwrap();

        // Producer side: a quarter-scale ramp.
        let input: Vec<f32> = (0..256 * 2).map(|i| (i as f32 / 2048.0) - 0.125).collect();
        segment.write(&input);

        let mut output = vec![0.0f32; 256 * 2];
        let frames = consumer.process_block(&mut output);
        assert_eq!(frames, 256);
        // Flat preset is near-transparent but not bit-exact (DC blocker);
        // just pin the shape.
        for (a, b) in input.iter().zip(&output) {
            assert!((a - b).abs() < 0.05, "{a} vs {b}");
        }
    }

    #[test]
    fn test_empty_ring_yields_silence_and_underrun() {
        let dir = tempdir().unwrap();
        let segment = make_segment(&dir);
        let mut consumer = RingConsumer::new(Arc::clone(&segment)).unwrap();

        let mut output = vec![1.0f32; 128 * 2];
        let frames = consumer.process_block(&mut output);
        assert_eq!(frames, 0);
        assert_eq!(segment.header().underrun_count.load(Ordering::Relaxed), 1);
        // Silence through the flat chain stays silent.
        assert!(output.iter().all(|&v| v.abs() < 1e-6));
    }

    #[test]
    fn test_bypass_passes_ring_content_untouched() {
        let dir = tempdir().unwrap();
        let segment = make_segment(&dir);
        let mut consumer = RingConsumer::new(Arc::clone(&segment)).unwrap();
        consumer.controls().set_bypass(true);

        let input: Vec<f32> = (0..64 * 2).map(|i| ((i * 37) % 100) as f32 / 100.0).collect();
        segment.write(&input);

        let mut output = vec![0.0f32; 64 * 2];
        consumer.process_block(&mut output);
        assert_eq!(output, input);
    }
}
