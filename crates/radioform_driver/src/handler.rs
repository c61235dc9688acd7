//! The I/O handler: mixed-output callback, format conversion, ring write.
//!
//! `Handler::on_write_mixed_output` is the realtime producer path. It never
//! blocks: the device mutex is only ever `try_lock`ed here, and both
//! conversion buffers are pre-allocated and only grow (amortised, cold
//! path) until they reach the largest block the platform delivers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use radioform_transport::Segment;

use crate::device::{
    DeviceInstance, HEALTH_CHECK_INTERVAL, HEARTBEAT_INTERVAL, STATS_LOG_INTERVAL,
};
use crate::resampler::LinearResampler;

/// Sample encoding of the incoming platform stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSampleKind {
    Float32,
    Int16,
    /// 24-bit packed little-endian.
    Int24,
    Int32,
}

impl InputSampleKind {
    pub fn bytes_per_sample(self) -> u32 {
        match self {
            InputSampleKind::Float32 => 4,
            InputSampleKind::Int16 => 2,
            InputSampleKind::Int24 => 3,
            InputSampleKind::Int32 => 4,
        }
    }
}

/// Physical format of one platform stream block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_kind: InputSampleKind,
    /// Planar (one channel after another) when false. Only float32 streams
    /// arrive planar in practice; integer formats are treated as
    /// interleaved regardless.
    pub interleaved: bool,
}

impl StreamFormat {
    pub fn bytes_per_frame(&self) -> u32 {
        self.sample_kind.bytes_per_sample() * self.channels
    }
}

/// Handler counters. All relaxed atomics; purely diagnostic.
pub struct IoStats {
    total_writes: AtomicU64,
    failed_writes: AtomicU64,
    health_failures: AtomicU64,
    reconnections: AtomicU64,
    format_changes: AtomicU64,
    sample_rate_conversions: AtomicU64,
    client_starts: AtomicU64,
    client_stops: AtomicU64,
}

impl IoStats {
    pub fn new() -> Self {
        Self {
            total_writes: AtomicU64::new(0),
            failed_writes: AtomicU64::new(0),
            health_failures: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            format_changes: AtomicU64::new(0),
            sample_rate_conversions: AtomicU64::new(0),
            client_starts: AtomicU64::new(0),
            client_stops: AtomicU64::new(0),
        }
    }

    pub fn total_writes(&self) -> u64 {
        self.total_writes.load(Ordering::Relaxed)
    }

    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    pub fn health_failures(&self) -> u64 {
        self.health_failures.load(Ordering::Relaxed)
    }

    pub fn reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    pub fn format_changes(&self) -> u64 {
        self.format_changes.load(Ordering::Relaxed)
    }

    pub fn sample_rate_conversions(&self) -> u64 {
        self.sample_rate_conversions.load(Ordering::Relaxed)
    }

    pub fn client_starts(&self) -> u64 {
        self.client_starts.load(Ordering::Relaxed)
    }

    pub fn client_stops(&self) -> u64 {
        self.client_stops.load(Ordering::Relaxed)
    }

    pub(crate) fn total_writes_inc(&self) {
        self.total_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn failed_writes_inc(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn health_failures_inc(&self) {
        self.health_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn reconnections_inc(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn format_changes_inc(&self) {
        self.format_changes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn sample_rate_conversions_inc(&self) {
        self.sample_rate_conversions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn client_starts_inc(&self) {
        self.client_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn client_stops_inc(&self) {
        self.client_stops.fetch_add(1, Ordering::Relaxed);
    }

    fn log_snapshot(&self, uid: &str) {
        info!(
            uid,
            writes = self.total_writes(),
            failed = self.failed_writes(),
            client_starts = self.client_starts(),
            client_stops = self.client_stops(),
            health_failures = self.health_failures(),
            reconnections = self.reconnections(),
            format_changes = self.format_changes(),
            resampled_blocks = self.sample_rate_conversions(),
            "io stats"
        );
    }
}

impl Default for IoStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the producer side of one device's data path. Lives on the I/O
/// thread; exactly one handler writes to any given segment.
pub struct Handler {
    device: Arc<DeviceInstance>,
    /// Producer's view of the mapped segment, refreshed via try_lock.
    segment: Option<Arc<Segment>>,
    interleaved_buf: Vec<f32>,
    resampled_buf: Vec<f32>,
    resampler: Option<LinearResampler>,
    input_rate: u32,
    input_channels: u32,
    last_health_check: Instant,
    last_heartbeat: Instant,
    last_stats_log: Instant,
}

impl Handler {
    pub fn new(device: Arc<DeviceInstance>) -> Self {
        let now = Instant::now();
        Self {
            device,
            segment: None,
            interleaved_buf: Vec::new(),
            resampled_buf: Vec::new(),
            resampler: None,
            input_rate: 0,
            input_channels: 0,
            last_health_check: now,
            last_heartbeat: now,
            last_stats_log: now,
        }
    }

    pub fn device(&self) -> &Arc<DeviceInstance> {
        &self.device
    }

    /// The mixed-output I/O callback: the platform hands us one block of
    /// the device's mixed stream.
    ///
    /// All failures are absorbed locally: counters increment, the block is
    /// dropped, and the state machine decides whether to recover.
    pub fn on_write_mixed_output(
        &mut self,
        format: &StreamFormat,
        _zero_timestamp: f64,
        _timestamp: f64,
        bytes: &[u8],
    ) {
        self.device.stats().total_writes_inc();
        let now = Instant::now();

        if now.duration_since(self.last_health_check) >= HEALTH_CHECK_INTERVAL {
            self.last_health_check = now;
            self.run_health_check();
        }

        self.refresh_segment();
        let Some(segment) = self.segment.clone() else {
            self.device.stats().failed_writes_inc();
            return;
        };

        if now.duration_since(self.last_heartbeat) >= HEARTBEAT_INTERVAL {
            segment.update_driver_heartbeat();
            self.last_heartbeat = now;
        }

        let bytes_per_frame = format.bytes_per_frame() as usize;
        if bytes_per_frame == 0 {
            self.device.stats().failed_writes_inc();
            return;
        }
        let frame_count = bytes.len() / bytes_per_frame;
        if frame_count == 0 {
            self.device.stats().failed_writes_inc();
            return;
        }

        if format.sample_rate != self.input_rate || format.channels != self.input_channels {
            info!(
                uid = self.device.uid(),
                from_rate = self.input_rate,
                from_channels = self.input_channels,
                to_rate = format.sample_rate,
                to_channels = format.channels,
                "input format change"
            );
            self.device.stats().format_changes_inc();
            self.input_rate = format.sample_rate;
            self.input_channels = format.channels;

            if format.sample_rate != segment.sample_rate() {
                self.resampler = Some(LinearResampler::new(
                    format.sample_rate,
                    segment.sample_rate(),
                    format.channels as usize,
                ));
            } else {
                self.resampler = None;
            }
        }

        // A stream whose channel count disagrees with the segment cannot be
        // remixed here; the block is rejected and counted.
        if format.channels != segment.channels() {
            warn!(
                uid = self.device.uid(),
                stream = format.channels,
                segment = segment.channels(),
                "channel count mismatch, dropping block"
            );
            self.device.stats().failed_writes_inc();
            segment
                .header()
                .format_mismatch_count
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.convert_to_float32(format, bytes, frame_count);

        let channels = format.channels as usize;
        if let Some(resampler) = self.resampler.as_mut() {
            self.device.stats().sample_rate_conversions_inc();
            let out_frames = (frame_count as u64 * segment.sample_rate() as u64
                / format.sample_rate as u64
                + 10) as usize;
            let needed = out_frames * channels;
            if self.resampled_buf.len() < needed {
                self.resampled_buf.resize(needed, 0.0);
            }
            let produced = resampler.process(
                &self.interleaved_buf[..frame_count * channels],
                &mut self.resampled_buf[..needed],
            );
            if produced > 0 {
                segment.write(&self.resampled_buf[..produced * channels]);
            }
        } else {
            segment.write(&self.interleaved_buf[..frame_count * channels]);
        }

        if now.duration_since(self.last_stats_log) >= STATS_LOG_INTERVAL {
            self.device.stats().log_snapshot(self.device.uid());
            self.last_stats_log = now;
        }
    }

    /// Re-read the mapped segment from the device core. `try_lock` only:
    /// if start/stop/recovery holds the mutex right now we keep the cached
    /// view for this block.
    fn refresh_segment(&mut self) {
        if let Some(core) = self.device.try_core() {
            self.segment = core.segment.clone();
        }
    }

    fn run_health_check(&mut self) {
        let Some(mut core) = self.device.try_core() else {
            return;
        };
        if !self.device.is_healthy_locked(&mut core) {
            self.device.stats().health_failures_inc();
            error!(uid = self.device.uid(), "health check failed");
            self.device.recover_locked(&mut core);
            self.segment = core.segment.clone();
        }
    }

    /// Decode the platform block into the pre-allocated interleaved
    /// float32 buffer. Buffer growth is bounded by the largest block seen.
    fn convert_to_float32(&mut self, format: &StreamFormat, bytes: &[u8], frame_count: usize) {
        let channels = format.channels as usize;
        let samples = frame_count * channels;
        if self.interleaved_buf.len() < samples {
            self.interleaved_buf.resize(samples, 0.0);
        }
        let out = &mut self.interleaved_buf[..samples];

        match format.sample_kind {
            InputSampleKind::Float32 => {
                if format.interleaved {
                    for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                        *dst = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
                    }
                } else {
                    // Planar to interleaved.
                    for ch in 0..channels {
                        let base = ch * frame_count * 4;
                        for frame in 0..frame_count {
                            let off = base + frame * 4;
                            out[frame * channels + ch] = f32::from_le_bytes([
                                bytes[off],
                                bytes[off + 1],
                                bytes[off + 2],
                                bytes[off + 3],
                            ]);
                        }
                    }
                }
            }
            InputSampleKind::Int16 => {
                for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                    *dst = i16::from_le_bytes([src[0], src[1]]) as f32 / 32768.0;
                }
            }
            InputSampleKind::Int32 => {
                for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                    *dst = i32::from_le_bytes([src[0], src[1], src[2], src[3]]) as f32
                        / 2_147_483_648.0;
                }
            }
            InputSampleKind::Int24 => {
                for (dst, src) in out.iter_mut().zip(bytes.chunks_exact(3)) {
                    let v = (src[0] as i32) | ((src[1] as i32) << 8) | ((src[2] as i32) << 16);
                    let v = (v << 8) >> 8;
                    *dst = v as f32 / 8_388_608.0;
                }
            }
        }
    }
}
