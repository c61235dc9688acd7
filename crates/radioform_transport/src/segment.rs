//! Shared segment lifecycle and ring I/O.
//!
//! The host creates the backing file (and unlinks it again when it goes
//! away); the driver only maps and unmaps. Both sides get read/write access
//! to the payload and the header atomics, but neither owns the other's view.
//!
//! # Ring contract
//!
//! Exactly one producer calls [`Segment::write`] and exactly one consumer
//! calls [`Segment::read`] for any given segment. The producer publishes
//! payload bytes *before* the release store of `write_index`; the consumer's
//! acquire load of `write_index` pairs with it. `read_index` is advanced only
//! by the consumer, except in the overrun path where the producer reclaims
//! space first - the consumer can never observe the reclaimed frames because
//! they still lie beyond `write_index` at that point.

use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::ptr::{self, NonNull};
use std::sync::atomic::Ordering;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::format::{decode_sample, encode_sample, SampleFormat};
use crate::heartbeat::HeartbeatObserver;
use crate::layout::{
    capability, frames_for_duration, SegmentHeader, HEADER_SIZE, MAX_CHANNELS, PROTOCOL_VERSION,
    RING_DURATION_MS_MAX, RING_DURATION_MS_MIN, SUPPORTED_SAMPLE_RATES,
};

/// Which end of the transport this mapping belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    /// Creator: owns the file, publishes `host_connected`.
    Host,
    /// Mapper: publishes `driver_connected`, never touches the file itself.
    Driver,
}

/// A raw `mmap` region, unmapped on drop.
struct RawMap {
    ptr: NonNull<u8>,
    len: usize,
}

impl RawMap {
    fn map(file: &File, len: usize, prot: libc::c_int) -> Result<Self, TransportError> {
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                prot,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(TransportError::MapFailed(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(Self {
            // mmap never returns null on success.
            ptr: NonNull::new(ptr as *mut u8).unwrap(),
            len,
        })
    }
}

impl Drop for RawMap {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

unsafe impl Send for RawMap {}
unsafe impl Sync for RawMap {}

/// A mapped shared-audio segment: 256-byte header + interleaved ring payload.
///
/// Format parameters are cached at map time; a segment never changes its
/// format in place (a real format change tears the segment down and builds a
/// new one).
pub struct Segment {
    raw: RawMap,
    path: PathBuf,
    role: Role,
    format: SampleFormat,
    channels: u32,
    bytes_per_sample: u32,
    bytes_per_frame: u32,
    sample_rate: u32,
    capacity: u64,
    payload_offset: usize,
}

impl Segment {
    /// Create a fresh segment file (host side).
    ///
    /// Allocates and zero-fills the file, writes the header, and publishes
    /// `host_connected = 1`. Fails with `ConfigError` for unsupported sample
    /// rates, channel counts outside 1..=8, or durations outside
    /// [20, 100] ms.
    pub fn create(
        path: &Path,
        sample_rate: u32,
        channels: u32,
        format: SampleFormat,
        duration_ms: u32,
    ) -> Result<Self, TransportError> {
        if !SUPPORTED_SAMPLE_RATES.contains(&sample_rate) {
            return Err(TransportError::ConfigError(format!(
                "sample rate {sample_rate} not supported"
            )));
        }
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(TransportError::ConfigError(format!(
                "channel count {channels} outside 1..={MAX_CHANNELS}"
            )));
        }
        if !(RING_DURATION_MS_MIN..=RING_DURATION_MS_MAX).contains(&duration_ms) {
            return Err(TransportError::ConfigError(format!(
                "ring duration {duration_ms}ms outside [{RING_DURATION_MS_MIN}, {RING_DURATION_MS_MAX}]"
            )));
        }

        let capacity = frames_for_duration(sample_rate, duration_ms);
        let bytes_per_sample = format.bytes_per_sample();
        let bytes_per_frame = bytes_per_sample * channels;
        let total = HEADER_SIZE as u64 + capacity as u64 * bytes_per_frame as u64;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|e| TransportError::MapFailed(format!("create {}: {e}", path.display())))?;
        // Truncate-then-grow leaves the whole file zero-filled.
        file.set_len(total)
            .map_err(|e| TransportError::MapFailed(format!("resize {}: {e}", path.display())))?;

        let raw = RawMap::map(&file, total as usize, libc::PROT_READ | libc::PROT_WRITE)?;

        let header = raw.ptr.as_ptr() as *mut SegmentHeader;
        unsafe {
            (*header).protocol_version = PROTOCOL_VERSION;
            (*header).header_size = HEADER_SIZE as u32;
            (*header).sample_rate = sample_rate;
            (*header).channels = channels;
            (*header).format = format.raw();
            (*header).bytes_per_sample = bytes_per_sample;
            (*header).bytes_per_frame = bytes_per_frame;
            (*header).ring_capacity_frames = capacity;
            (*header).ring_duration_ms = duration_ms;
            (*header).driver_capabilities = capability::MULTI_SAMPLE_RATE
                | capability::MULTI_FORMAT
                | capability::MULTI_CHANNEL
                | capability::FORMAT_CONVERT
                | capability::AUTO_RECONNECT
                | capability::HEARTBEAT_MONITOR;
            (*header).creation_timestamp = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            (*header).host_connected.store(1, Ordering::Relaxed);
        }

        info!(
            path = %path.display(),
            sample_rate,
            channels,
            ?format,
            capacity,
            "created shared segment"
        );

        Ok(Self {
            raw,
            path: path.to_path_buf(),
            role: Role::Host,
            format,
            channels,
            bytes_per_sample,
            bytes_per_frame,
            sample_rate,
            capacity: capacity as u64,
            payload_offset: HEADER_SIZE,
        })
    }

    /// Map an existing segment file (driver side) and validate it.
    ///
    /// On success the mapping publishes `driver_connected = 1`. A rejected
    /// segment is unmapped cleanly with `driver_connected` left at 0.
    pub fn open(path: &Path) -> Result<Self, TransportError> {
        let meta = std::fs::metadata(path)
            .map_err(|_| TransportError::SegmentNotFound(path.display().to_string()))?;
        let file_len = meta.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(TransportError::SegmentTooSmall {
                actual: file_len,
                required: HEADER_SIZE as u64,
            });
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TransportError::MapFailed(format!("open {}: {e}", path.display())))?;
        let raw = RawMap::map(&file, file_len as usize, libc::PROT_READ | libc::PROT_WRITE)?;

        // Validate before touching any shared state.
        let header = unsafe { &*(raw.ptr.as_ptr() as *const SegmentHeader) };

        if header.protocol_version != PROTOCOL_VERSION {
            return Err(TransportError::ProtocolMismatch {
                found: header.protocol_version,
                expected: PROTOCOL_VERSION,
            });
        }
        if (header.header_size as usize) < HEADER_SIZE {
            return Err(TransportError::UnsupportedFormat(format!(
                "declared header size {} below {}",
                header.header_size, HEADER_SIZE
            )));
        }
        if !SUPPORTED_SAMPLE_RATES.contains(&header.sample_rate) {
            return Err(TransportError::UnsupportedFormat(format!(
                "sample rate {}",
                header.sample_rate
            )));
        }
        if header.channels == 0 || header.channels > MAX_CHANNELS {
            return Err(TransportError::UnsupportedFormat(format!(
                "channel count {}",
                header.channels
            )));
        }
        let format = SampleFormat::from_raw(header.format).ok_or_else(|| {
            TransportError::UnsupportedFormat(format!("format tag {}", header.format))
        })?;
        if header.bytes_per_sample != format.bytes_per_sample()
            || header.bytes_per_frame != header.bytes_per_sample * header.channels
        {
            return Err(TransportError::UnsupportedFormat(format!(
                "inconsistent frame geometry: {}B/sample, {}B/frame, {} channels",
                header.bytes_per_sample, header.bytes_per_frame, header.channels
            )));
        }
        let required = header.header_size as u64
            + header.ring_capacity_frames as u64 * header.bytes_per_frame as u64;
        if file_len < required {
            return Err(TransportError::SegmentTooSmall {
                actual: file_len,
                required,
            });
        }

        header.driver_connected.store(1, Ordering::Relaxed);

        info!(
            path = %path.display(),
            sample_rate = header.sample_rate,
            channels = header.channels,
            ?format,
            capacity = header.ring_capacity_frames,
            "mapped shared segment"
        );

        Ok(Self {
            format,
            channels: header.channels,
            bytes_per_sample: header.bytes_per_sample,
            bytes_per_frame: header.bytes_per_frame,
            sample_rate: header.sample_rate,
            capacity: header.ring_capacity_frames as u64,
            payload_offset: header.header_size as usize,
            raw,
            path: path.to_path_buf(),
            role: Role::Driver,
        })
    }

    /// The live header. Plain fields are fixed after creation; the atomics
    /// are the shared working state.
    pub fn header(&self) -> &SegmentHeader {
        unsafe { &*(self.raw.ptr.as_ptr() as *const SegmentHeader) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn capacity_frames(&self) -> u64 {
        self.capacity
    }

    pub fn bytes_per_frame(&self) -> u32 {
        self.bytes_per_frame
    }

    /// Frames currently buffered (`write_index - read_index`).
    pub fn used_frames(&self) -> u64 {
        let header = self.header();
        header
            .write_index
            .load(Ordering::Relaxed)
            .wrapping_sub(header.read_index.load(Ordering::Relaxed))
    }

    /// Producer: write interleaved float32 frames, converting to the ring
    /// format. `frames.len()` must be a multiple of the channel count.
    ///
    /// If the ring lacks space, the producer drops the oldest unconsumed
    /// frames by advancing `read_index` (one `overrun_count` increment) and
    /// writes anyway - the producer timeline is preserved so downstream
    /// phase and clock do not shift.
    pub fn write(&self, frames: &[f32]) -> u32 {
        let channels = self.channels as usize;
        debug_assert_eq!(frames.len() % channels, 0);
        let n = (frames.len() / channels) as u64;
        if n == 0 {
            return 0;
        }

        let header = self.header();
        let write_idx = header.write_index.load(Ordering::Relaxed);
        let read_idx = header.read_index.load(Ordering::Acquire);
        let used = write_idx.wrapping_sub(read_idx);

        if used + n > self.capacity {
            let to_drop = used + n - self.capacity;
            header
                .read_index
                .store(read_idx + to_drop, Ordering::Release);
            header.overrun_count.fetch_add(1, Ordering::Relaxed);
        }

        let bpf = self.bytes_per_frame as usize;
        let bps = self.bytes_per_sample as usize;
        let mut buf = [0u8; 8];
        for frame in 0..n as usize {
            let ring_pos = ((write_idx + frame as u64) % self.capacity) as usize;
            let base = self.payload_offset + ring_pos * bpf;
            for ch in 0..channels {
                let len = encode_sample(self.format, frames[frame * channels + ch], &mut buf);
                unsafe {
                    self.store_bytes(base + ch * bps, &buf[..len]);
                }
            }
        }

        header.write_index.store(write_idx + n, Ordering::Release);
        header.total_frames_written.fetch_add(n, Ordering::Relaxed);
        n as u32
    }

    /// Consumer: read up to `out.len() / channels` frames as float32.
    ///
    /// Always fills `out` completely; if fewer frames are available the tail
    /// is silence and `underrun_count` increments once. Returns the number of
    /// real frames read.
    pub fn read(&self, out: &mut [f32]) -> u32 {
        let channels = self.channels as usize;
        debug_assert_eq!(out.len() % channels, 0);
        let n = (out.len() / channels) as u64;
        if n == 0 {
            return 0;
        }

        let header = self.header();
        let write_idx = header.write_index.load(Ordering::Acquire);
        let read_idx = header.read_index.load(Ordering::Relaxed);
        let available = write_idx.wrapping_sub(read_idx);
        let to_read = available.min(n);

        let bpf = self.bytes_per_frame as usize;
        let bps = self.bytes_per_sample as usize;
        let mut buf = [0u8; 8];
        for frame in 0..to_read as usize {
            let ring_pos = ((read_idx + frame as u64) % self.capacity) as usize;
            let base = self.payload_offset + ring_pos * bpf;
            for ch in 0..channels {
                unsafe {
                    self.load_bytes(base + ch * bps, &mut buf[..bps]);
                }
                out[frame * channels + ch] = decode_sample(self.format, &buf[..bps]);
            }
        }

        if to_read < n {
            header.underrun_count.fetch_add(1, Ordering::Relaxed);
            out[to_read as usize * channels..].fill(0.0);
        }

        header.read_index.store(read_idx + to_read, Ordering::Release);
        header.total_frames_read.fetch_add(to_read, Ordering::Relaxed);
        to_read as u32
    }

    /// Bump the driver heartbeat and assert driver presence. Call at least
    /// once per second from the driver side while streaming.
    pub fn update_driver_heartbeat(&self) {
        let header = self.header();
        header.driver_heartbeat.fetch_add(1, Ordering::Relaxed);
        header.driver_connected.store(1, Ordering::Relaxed);
    }

    /// Bump the host heartbeat and assert host presence.
    pub fn update_host_heartbeat(&self) {
        let header = self.header();
        header.host_heartbeat.fetch_add(1, Ordering::Relaxed);
        header.host_connected.store(1, Ordering::Relaxed);
    }

    /// Driver-side health probe: host still present, host heartbeat advanced
    /// within the freshness window, ring indices inside their invariant.
    pub fn is_healthy(&self, host_hb: &mut HeartbeatObserver) -> bool {
        let header = self.header();

        if header.host_connected.load(Ordering::Relaxed) != 1 {
            warn!(path = %self.path.display(), "health: host disconnected");
            return false;
        }

        let hb = header.host_heartbeat.load(Ordering::Relaxed);
        if !host_hb.observe(hb, Instant::now()) {
            warn!(path = %self.path.display(), heartbeat = hb, "health: host heartbeat stalled");
            return false;
        }

        let write_idx = header.write_index.load(Ordering::Relaxed);
        let read_idx = header.read_index.load(Ordering::Relaxed);
        if write_idx < read_idx {
            warn!(path = %self.path.display(), "health: ring corruption (write < read)");
            return false;
        }
        if write_idx - read_idx > self.capacity {
            warn!(path = %self.path.display(), "health: ring corruption (used > capacity)");
            return false;
        }

        true
    }

    unsafe fn store_bytes(&self, offset: usize, bytes: &[u8]) {
        debug_assert!(offset + bytes.len() <= self.raw.len);
        ptr::copy_nonoverlapping(bytes.as_ptr(), self.raw.ptr.as_ptr().add(offset), bytes.len());
    }

    unsafe fn load_bytes(&self, offset: usize, bytes: &mut [u8]) {
        debug_assert!(offset + bytes.len() <= self.raw.len);
        ptr::copy_nonoverlapping(self.raw.ptr.as_ptr().add(offset), bytes.as_mut_ptr(), bytes.len());
    }
}

impl Drop for Segment {
    fn drop(&mut self) {
        match self.role {
            Role::Driver => {
                self.header().driver_connected.store(0, Ordering::Relaxed);
                debug!(path = %self.path.display(), "unmapping segment (driver)");
            }
            Role::Host => {
                self.header().host_connected.store(0, Ordering::Relaxed);
                debug!(path = %self.path.display(), "unmapping and unlinking segment (host)");
            }
        }
        if self.role == Role::Host {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Read the host heartbeat counter from a segment file without the full
/// validation that [`Segment::open`] performs. The fleet uses this to decide
/// whether a control-file entry is backed by a live host before creating a
/// proxy device for it.
pub fn peek_host_heartbeat(path: &Path) -> Result<u64, TransportError> {
    let meta = std::fs::metadata(path)
        .map_err(|_| TransportError::SegmentNotFound(path.display().to_string()))?;
    if meta.len() < HEADER_SIZE as u64 {
        return Err(TransportError::SegmentTooSmall {
            actual: meta.len(),
            required: HEADER_SIZE as u64,
        });
    }
    let file = File::open(path)
        .map_err(|e| TransportError::MapFailed(format!("open {}: {e}", path.display())))?;
    let raw = RawMap::map(&file, HEADER_SIZE, libc::PROT_READ)?;
    let header = unsafe { &*(raw.ptr.as_ptr() as *const SegmentHeader) };
    Ok(header.host_heartbeat.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn make_segment(dir: &tempfile::TempDir, format: SampleFormat) -> Segment {
        let path = dir.path().join("seg");
        // 48 kHz * 20 ms = 960-frame ring.
        Segment::create(&path, 48000, 2, format, 20).unwrap()
    }

    #[test]
    fn test_create_rejects_bad_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("seg");

        assert!(matches!(
            Segment::create(&path, 22050, 2, SampleFormat::Float32, 40),
            Err(TransportError::ConfigError(_))
        ));
        assert!(matches!(
            Segment::create(&path, 48000, 0, SampleFormat::Float32, 40),
            Err(TransportError::ConfigError(_))
        ));
        assert!(matches!(
            Segment::create(&path, 48000, 9, SampleFormat::Float32, 40),
            Err(TransportError::ConfigError(_))
        ));
        assert!(matches!(
            Segment::create(&path, 48000, 2, SampleFormat::Float32, 10),
            Err(TransportError::ConfigError(_))
        ));
        assert!(matches!(
            Segment::create(&path, 48000, 2, SampleFormat::Float32, 150),
            Err(TransportError::ConfigError(_))
        ));
    }

    #[test]
    fn test_open_missing_file() {
        assert!(matches!(
            Segment::open(Path::new("/tmp/radioform-test-does-not-exist")),
            Err(TransportError::SegmentNotFound(_))
        ));
    }

    #[test]
    fn test_open_rejects_protocol_mismatch() {
        use std::os::unix::fs::FileExt;

        let dir = tempdir().unwrap();
        let host = make_segment(&dir, SampleFormat::Float32);

        // Stamp a v1 protocol word into the live file.
        let file = OpenOptions::new().write(true).open(host.path()).unwrap();
        file.write_at(&0x0001_0000u32.to_le_bytes(), 0).unwrap();

        match Segment::open(host.path()) {
            Err(TransportError::ProtocolMismatch { found, expected }) => {
                assert_eq!(found, 0x0001_0000);
                assert_eq!(expected, PROTOCOL_VERSION);
            }
            other => panic!("expected ProtocolMismatch, got {other:?}", other = other.err()),
        }
        // A refused mapping must leave driver_connected at 0.
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let host = make_segment(&dir, SampleFormat::Float32);

        let file = OpenOptions::new().write(true).open(host.path()).unwrap();
        file.set_len(300).unwrap();

        assert!(matches!(
            Segment::open(host.path()),
            Err(TransportError::SegmentTooSmall { .. })
        ));
    }

    #[test]
    fn test_connected_flags_follow_mapping_lifetime() {
        let dir = tempdir().unwrap();
        let host = make_segment(&dir, SampleFormat::Float32);
        assert_eq!(host.header().host_connected.load(Ordering::Relaxed), 1);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 0);

        let driver = Segment::open(host.path()).unwrap();
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 1);

        drop(driver);
        assert_eq!(host.header().driver_connected.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_host_drop_unlinks_file() {
        let dir = tempdir().unwrap();
        let host = make_segment(&dir, SampleFormat::Float32);
        let path = host.path().to_path_buf();
        assert!(path.exists());
        drop(host);
        assert!(!path.exists());
    }

    #[test]
    fn test_round_trip_float32() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);

        // 240 frames of alternating +0.5 / -0.5 on both channels.
        let mut input = Vec::with_capacity(240 * 2);
        for i in 0..240 {
            let v = if i % 2 == 0 { 0.5 } else { -0.5 };
            input.push(v);
            input.push(v);
        }
        assert_eq!(seg.write(&input), 240);

        let mut output = vec![0.0f32; 240 * 2];
        assert_eq!(seg.read(&mut output), 240);
        assert_eq!(input, output);

        let header = seg.header();
        assert_eq!(header.write_index.load(Ordering::Relaxed), 240);
        assert_eq!(header.read_index.load(Ordering::Relaxed), 240);
        assert_eq!(header.overrun_count.load(Ordering::Relaxed), 0);
        assert_eq!(header.underrun_count.load(Ordering::Relaxed), 0);
        assert_eq!(header.total_frames_written.load(Ordering::Relaxed), 240);
        assert_eq!(header.total_frames_read.load(Ordering::Relaxed), 240);
    }

    #[test]
    fn test_round_trip_int16_quantisation() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Int16);

        let input: Vec<f32> = (0..200).map(|i| ((i as f32) / 100.0) - 1.0).collect();
        seg.write(&input);

        let mut output = vec![0.0f32; input.len()];
        seg.read(&mut output);
        for (a, b) in input.iter().zip(&output) {
            // Truncation plus the asymmetric 32767/32768 scale pair.
            assert!((a - b).abs() <= 2.0 / 32768.0, "{a} vs {b}");
        }
    }

    #[test]
    fn test_overrun_policy() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);
        let capacity = seg.capacity_frames();
        assert_eq!(capacity, 960);

        // Fill the ring exactly, then push 100 more frames.
        let fill = vec![0.25f32; capacity as usize * 2];
        assert_eq!(seg.write(&fill) as u64, capacity);
        let extra = vec![0.75f32; 100 * 2];
        assert_eq!(seg.write(&extra), 100);

        let header = seg.header();
        assert_eq!(header.overrun_count.load(Ordering::Relaxed), 1);
        assert_eq!(header.read_index.load(Ordering::Relaxed), 100);
        assert_eq!(header.write_index.load(Ordering::Relaxed), capacity + 100);
        assert_eq!(seg.used_frames(), capacity);

        // The invariant is re-established and the new frames are intact:
        // draining the ring ends with the 100 freshly written samples.
        let mut drained = vec![0.0f32; capacity as usize * 2];
        assert_eq!(seg.read(&mut drained) as u64, capacity);
        assert!(drained[(capacity as usize - 100) * 2..]
            .iter()
            .all(|&v| v == 0.75));
    }

    #[test]
    fn test_underrun_policy() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);

        let mut out = vec![1.0f32; 256 * 2];
        assert_eq!(seg.read(&mut out), 0);
        assert!(out.iter().all(|&v| v == 0.0));

        let header = seg.header();
        assert_eq!(header.underrun_count.load(Ordering::Relaxed), 1);
        assert_eq!(header.read_index.load(Ordering::Relaxed), 0);
        assert_eq!(header.total_frames_read.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_partial_read_fills_tail_with_silence() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);

        seg.write(&vec![0.5f32; 100 * 2]);
        let mut out = vec![1.0f32; 256 * 2];
        assert_eq!(seg.read(&mut out), 100);
        assert!(out[..100 * 2].iter().all(|&v| v == 0.5));
        assert!(out[100 * 2..].iter().all(|&v| v == 0.0));
        assert_eq!(seg.header().underrun_count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_indices_monotonic_across_wraparound() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);
        let mut out = vec![0.0f32; 300 * 2];

        let mut last_write = 0;
        let mut last_read = 0;
        for round in 0..20 {
            let block: Vec<f32> = (0..300 * 2).map(|i| ((round * i) % 97) as f32 / 97.0).collect();
            seg.write(&block);
            assert_eq!(seg.read(&mut out), 300);
            assert_eq!(out, block);

            let header = seg.header();
            let w = header.write_index.load(Ordering::Relaxed);
            let r = header.read_index.load(Ordering::Relaxed);
            assert!(w >= last_write && r >= last_read);
            assert!(w >= r && w - r <= seg.capacity_frames());
            last_write = w;
            last_read = r;
        }
    }

    #[test]
    fn test_heartbeats_and_health() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);

        seg.update_host_heartbeat();
        seg.update_driver_heartbeat();
        let header = seg.header();
        assert_eq!(header.host_heartbeat.load(Ordering::Relaxed), 1);
        assert_eq!(header.driver_heartbeat.load(Ordering::Relaxed), 1);

        let mut obs = HeartbeatObserver::new(Instant::now());
        assert!(seg.is_healthy(&mut obs));
    }

    #[test]
    fn test_health_fails_on_stalled_heartbeat() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);

        // Observer that last saw the counter change six seconds ago.
        let stale_start = Instant::now() - Duration::from_secs(6);
        let mut obs = HeartbeatObserver::new(stale_start);
        assert!(!seg.is_healthy(&mut obs));
    }

    #[test]
    fn test_health_fails_when_host_gone() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);
        seg.header().host_connected.store(0, Ordering::Relaxed);

        let mut obs = HeartbeatObserver::new(Instant::now());
        assert!(!seg.is_healthy(&mut obs));
    }

    #[test]
    fn test_peek_host_heartbeat() {
        let dir = tempdir().unwrap();
        let seg = make_segment(&dir, SampleFormat::Float32);
        assert_eq!(peek_host_heartbeat(seg.path()).unwrap(), 0);
        seg.update_host_heartbeat();
        seg.update_host_heartbeat();
        assert_eq!(peek_host_heartbeat(seg.path()).unwrap(), 2);
    }
}
