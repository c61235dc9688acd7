//! Host engine: command/event loop around the output stream.
//!
//! Lives on a control thread and talks to the rest of the process through
//! channels:
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │  caller ──commands──▶ HostEngine ◀──events── caller       │
//! └───────────────────────────┬───────────────────────────────┘
//!                             │ crossbeam-channel
//! ┌───────────────────────────▼───────────────────────────────┐
//! │  engine thread: registry + heartbeat + cpal stream        │
//! │  audio callback: param drain ─▶ ring read ─▶ DSP ─▶ out  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Parameter updates reach the audio thread over a bounded SPSC channel
//! drained with `try_recv` at the top of each callback; bypass and stats go
//! through the engine's lock-free [`DspControls`].

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use radioform_dsp::{DspControls, DspEngine, Preset};
use radioform_transport::{SampleFormat, CONTROL_FILE_PATH, RING_DURATION_MS_DEFAULT};

use crate::consumer::RingConsumer;
use crate::error::{HostError, HostResult};
use crate::heartbeat::HeartbeatBeater;
use crate::registry::DeviceRegistry;

/// Host configuration for one proxy device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Human-visible device label published in the control file.
    pub device_name: String,
    /// Stable identifier; also determines the segment path.
    pub device_uid: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub ring_duration_ms: u32,
    pub format: SampleFormat,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            device_name: "Radioform".to_string(),
            device_uid: "radioform-main-out".to_string(),
            sample_rate: 48000,
            channels: 2,
            ring_duration_ms: RING_DURATION_MS_DEFAULT,
            format: SampleFormat::Float32,
        }
    }
}

/// Commands sent into the engine thread.
#[derive(Debug, Clone)]
pub enum Command {
    /// Create the segment, publish the device, open the output stream.
    Start,
    /// Tear the stream down and unpublish the device.
    Stop,
    SetBandGain { band: usize, gain_db: f32 },
    SetBandFrequency { band: usize, frequency_hz: f32 },
    SetBandQ { band: usize, q_factor: f32 },
    SetPreamp(f32),
    SetBypass(bool),
    ApplyPreset(Box<Preset>),
    /// Triggers a StateUpdate event.
    RequestState,
    Shutdown,
}

/// Events emitted by the engine thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Event {
    Started,
    Stopped,
    Error { message: String },
    /// Peak meter levels in dBFS, emitted while running.
    LevelUpdate { left_db: f32, right_db: f32 },
    StateUpdate {
        is_running: bool,
        is_bypassed: bool,
        sample_rate: u32,
        frames_processed: u64,
        cpu_load_percent: f32,
    },
}

impl Event {
    pub fn error<E: std::fmt::Display>(err: E) -> Self {
        Event::Error {
            message: err.to_string(),
        }
    }
}

/// Parameter updates shipped to the audio callback.
enum ParamUpdate {
    BandGain(usize, f32),
    BandFrequency(usize, f32),
    BandQ(usize, f32),
    Preamp(f32),
    Preset(Box<Preset>),
}

/// The running stream plus the handles that outlive the callback closure.
struct ActiveStream {
    // Held for its Drop; the stream stops when this goes away.
    _stream: cpal::Stream,
    controls: DspControls,
    param_sender: Sender<ParamUpdate>,
    segment_path: PathBuf,
}

/// The host engine controller. Lives on the caller's thread and drives the
/// engine thread via channels; dropping it shuts everything down.
pub struct HostEngine {
    command_sender: Sender<Command>,
    event_receiver: Receiver<Event>,
    engine_thread: Option<JoinHandle<()>>,
    shutdown_flag: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
    config: HostConfig,
}

impl HostEngine {
    pub fn new() -> HostResult<Self> {
        Self::with_config(HostConfig::default())
    }

    pub fn with_config(config: HostConfig) -> HostResult<Self> {
        let (command_sender, command_receiver) = bounded::<Command>(32);
        let (event_sender, event_receiver) = unbounded::<Event>();

        let shutdown_flag = Arc::new(AtomicBool::new(false));
        let is_running = Arc::new(AtomicBool::new(false));

        let shutdown_clone = Arc::clone(&shutdown_flag);
        let running_clone = Arc::clone(&is_running);
        let config_clone = config.clone();

        let engine_thread = thread::Builder::new()
            .name("radioform-host-engine".into())
            .spawn(move || {
                engine_thread_main(
                    config_clone,
                    command_receiver,
                    event_sender,
                    shutdown_clone,
                    running_clone,
                );
            })
            .map_err(|e| HostError::ThreadSpawnError(e.to_string()))?;

        Ok(Self {
            command_sender,
            event_receiver,
            engine_thread: Some(engine_thread),
            shutdown_flag,
            is_running,
            config,
        })
    }

    pub fn start(&self) -> HostResult<()> {
        self.send_command(Command::Start)
    }

    pub fn stop(&self) -> HostResult<()> {
        self.send_command(Command::Stop)
    }

    pub fn set_band_gain(&self, band: usize, gain_db: f32) -> HostResult<()> {
        self.send_command(Command::SetBandGain { band, gain_db })
    }

    pub fn set_band_frequency(&self, band: usize, frequency_hz: f32) -> HostResult<()> {
        self.send_command(Command::SetBandFrequency { band, frequency_hz })
    }

    pub fn set_band_q(&self, band: usize, q_factor: f32) -> HostResult<()> {
        self.send_command(Command::SetBandQ { band, q_factor })
    }

    pub fn set_preamp(&self, gain_db: f32) -> HostResult<()> {
        self.send_command(Command::SetPreamp(gain_db))
    }

    pub fn set_bypass(&self, bypassed: bool) -> HostResult<()> {
        self.send_command(Command::SetBypass(bypassed))
    }

    pub fn apply_preset(&self, preset: Preset) -> HostResult<()> {
        self.send_command(Command::ApplyPreset(Box::new(preset)))
    }

    pub fn request_state(&self) -> HostResult<()> {
        self.send_command(Command::RequestState)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Next event, non-blocking.
    pub fn poll_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Next event, blocking.
    pub fn wait_event(&self) -> Option<Event> {
        self.event_receiver.recv().ok()
    }

    fn send_command(&self, command: Command) -> HostResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| HostError::ChannelSendError)
    }
}

impl Drop for HostEngine {
    fn drop(&mut self) {
        self.shutdown_flag.store(true, Ordering::SeqCst);
        let _ = self.command_sender.send(Command::Shutdown);
        if let Some(handle) = self.engine_thread.take() {
            let _ = handle.join();
        }
    }
}

fn engine_thread_main(
    config: HostConfig,
    command_receiver: Receiver<Command>,
    event_sender: Sender<Event>,
    shutdown_flag: Arc<AtomicBool>,
    is_running: Arc<AtomicBool>,
) {
    info!("host engine thread started");

    let mut registry = DeviceRegistry::new(CONTROL_FILE_PATH);
    let beater = match HeartbeatBeater::start() {
        Ok(beater) => beater,
        Err(e) => {
            error!(error = %e, "could not start heartbeat thread");
            let _ = event_sender.send(Event::error(e));
            return;
        }
    };

    let mut active: Option<ActiveStream> = None;
    // Settings that arrive while stopped are replayed on the next start.
    let mut bypassed = false;
    let mut pending_preset: Option<Box<Preset>> = None;

    while !shutdown_flag.load(Ordering::SeqCst) {
        match command_receiver.recv_timeout(Duration::from_millis(16)) {
            Ok(Command::Start) => {
                if active.is_some() {
                    warn!("engine already running");
                    let _ = event_sender.send(Event::error("already running"));
                    continue;
                }
                match start_stream(
                    &config,
                    &mut registry,
                    &beater,
                    bypassed,
                    pending_preset.clone(),
                    event_sender.clone(),
                ) {
                    Ok(stream) => {
                        active = Some(stream);
                        is_running.store(true, Ordering::SeqCst);
                        let _ = event_sender.send(Event::Started);
                        info!(
                            device = %config.device_name,
                            uid = %config.device_uid,
                            "host engine started"
                        );
                    }
                    Err(e) => {
                        error!(error = %e, "failed to start");
                        let _ = event_sender.send(Event::error(e));
                    }
                }
            }

            Ok(Command::Stop) => {
                if let Some(stream) = active.take() {
                    beater.remove_segment(&stream.segment_path);
                    drop(stream);
                    if let Err(e) = registry.unregister(&config.device_uid) {
                        warn!(error = %e, "failed to unpublish device");
                    }
                    is_running.store(false, Ordering::SeqCst);
                    let _ = event_sender.send(Event::Stopped);
                    info!("host engine stopped");
                } else {
                    debug!("engine not running");
                }
            }

            Ok(Command::SetBandGain { band, gain_db }) => {
                forward_param(&active, ParamUpdate::BandGain(band, gain_db));
            }
            Ok(Command::SetBandFrequency { band, frequency_hz }) => {
                forward_param(&active, ParamUpdate::BandFrequency(band, frequency_hz));
            }
            Ok(Command::SetBandQ { band, q_factor }) => {
                forward_param(&active, ParamUpdate::BandQ(band, q_factor));
            }
            Ok(Command::SetPreamp(gain_db)) => {
                forward_param(&active, ParamUpdate::Preamp(gain_db));
            }

            Ok(Command::SetBypass(value)) => {
                bypassed = value;
                if let Some(stream) = &active {
                    stream.controls.set_bypass(value);
                }
            }

            Ok(Command::ApplyPreset(preset)) => {
                pending_preset = Some(preset.clone());
                forward_param(&active, ParamUpdate::Preset(preset));
            }

            Ok(Command::RequestState) => {
                let event = match &active {
                    Some(stream) => {
                        let stats = stream.controls.stats();
                        Event::StateUpdate {
                            is_running: true,
                            is_bypassed: stats.bypass_active,
                            sample_rate: stats.sample_rate,
                            frames_processed: stats.frames_processed,
                            cpu_load_percent: stats.cpu_load_percent,
                        }
                    }
                    None => Event::StateUpdate {
                        is_running: false,
                        is_bypassed: bypassed,
                        sample_rate: config.sample_rate,
                        frames_processed: 0,
                        cpu_load_percent: 0.0,
                    },
                };
                let _ = event_sender.send(event);
            }

            Ok(Command::Shutdown) => {
                info!("shutdown command received");
                shutdown_flag.store(true, Ordering::SeqCst);
            }

            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                // Tick: push meter levels while audio is flowing.
                if let Some(stream) = &active {
                    let stats = stream.controls.stats();
                    if stats.peak_left_db > -90.0 || stats.peak_right_db > -90.0 {
                        let _ = event_sender.try_send(Event::LevelUpdate {
                            left_db: stats.peak_left_db,
                            right_db: stats.peak_right_db,
                        });
                    }
                }
            }

            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                warn!("command channel disconnected");
                break;
            }
        }
    }

    if let Some(stream) = active.take() {
        beater.remove_segment(&stream.segment_path);
    }
    is_running.store(false, Ordering::SeqCst);
    info!("host engine thread shutting down");
}

fn forward_param(active: &Option<ActiveStream>, update: ParamUpdate) {
    match active {
        Some(stream) => {
            if stream.param_sender.try_send(update).is_err() {
                warn!("parameter queue full, update dropped");
            }
        }
        None => debug!("parameter update ignored, engine not running"),
    }
}

fn apply_param(engine: &mut DspEngine, update: ParamUpdate) {
    // Out-of-range indices are rejected by the engine; nothing to do with
    // the error on the audio thread.
    match update {
        ParamUpdate::BandGain(band, gain_db) => {
            let _ = engine.update_band_gain(band, gain_db);
        }
        ParamUpdate::BandFrequency(band, frequency_hz) => {
            let _ = engine.update_band_frequency(band, frequency_hz);
        }
        ParamUpdate::BandQ(band, q_factor) => {
            let _ = engine.update_band_q(band, q_factor);
        }
        ParamUpdate::Preamp(gain_db) => engine.update_preamp(gain_db),
        ParamUpdate::Preset(preset) => {
            let _ = engine.apply_preset(&preset);
        }
    }
}

fn start_stream(
    config: &HostConfig,
    registry: &mut DeviceRegistry,
    beater: &HeartbeatBeater,
    bypassed: bool,
    pending_preset: Option<Box<Preset>>,
    event_sender: Sender<Event>,
) -> HostResult<ActiveStream> {
    let segment = registry.register(
        &config.device_name,
        &config.device_uid,
        config.sample_rate,
        config.channels,
        config.format,
        config.ring_duration_ms,
    )?;
    beater.add_segment(Arc::clone(&segment));

    let mut consumer = RingConsumer::new(Arc::clone(&segment))?;
    if let Some(preset) = pending_preset {
        consumer.engine_mut().apply_preset(&preset)?;
    }
    let controls = consumer.controls();
    controls.set_bypass(bypassed);

    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(HostError::NoOutputDevice)?;
    let stream_config = cpal::StreamConfig {
        channels: config.channels as u16,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let (param_sender, param_receiver) = bounded::<ParamUpdate>(64);
    let err_sender = event_sender;

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                // Realtime callback: drain parameter updates, then pull one
                // block through the ring and the DSP chain. No allocations.
                while let Ok(update) = param_receiver.try_recv() {
                    apply_param(consumer.engine_mut(), update);
                }
                consumer.process_block(data);
            },
            move |err| {
                let _ = err_sender.try_send(Event::error(err));
            },
            None,
        )
        .map_err(|e| HostError::StreamBuildError(e.to_string()))?;

    stream
        .play()
        .map_err(|e| HostError::StreamPlayError(e.to_string()))?;

    let segment_path = segment.path().to_path_buf();
    Ok(ActiveStream {
        _stream: stream,
        controls,
        param_sender,
        segment_path,
    })
}
