//! Radioform Host - Segment Owner and DSP Consumer
//!
//! The host side of the transport: it creates the shared segments, lists
//! them in the control file for the driver to discover, proves its liveness
//! with a heartbeat thread, and pulls audio out of each ring through the
//! DSP engine into a real output device.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                      Control Thread                        │
//! │   commands ──▶ HostEngine loop ◀── events                  │
//! └──────────────┬─────────────────────────────────────────────┘
//!                │ crossbeam-channel
//! ┌──────────────▼─────────────────────────────────────────────┐
//! │                      Audio Thread (cpal)                   │
//! │   ring read ──▶ DspEngine ──▶ output device                │
//! │          (zero allocation in this path)                    │
//! └────────────────────────────────────────────────────────────┘
//!   HeartbeatBeater thread: host_heartbeat++ ~1 Hz
//! ```

mod consumer;
mod engine;
mod error;
mod heartbeat;
mod registry;

pub use consumer::RingConsumer;
pub use engine::{Command, Event, HostConfig, HostEngine};
pub use error::{HostError, HostResult};
pub use heartbeat::HeartbeatBeater;
pub use registry::{DeviceRegistry, RegisteredDevice};
