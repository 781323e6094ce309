//! # sensor-modes-core
//!
//! Platform-agnostic core for mode-based sensor drivers.
//!
//! Each device is a reactor: a small automaton of mutually exclusive modes
//! that acquires its hardware session on entry to a session-holding mode and
//! releases it on leaving. A single logical-time runtime delivers all events
//! in tag order, and capture threads reach it only through the async bridge.
//! Hardware backends (WASAPI, OpenCV) implement the traits in `traits/` and
//! live in `sensor-modes-hw`.
//!
//! ## Architecture
//!
//! ```text
//! sensor-modes-core (this crate)
//! ├── traits/       ← AudioBackend, VideoBackend, VideoSession, Session, delegates
//! ├── models/       ← DeviceError, Tag, modes, configs, AudioBuffer, Frame
//! ├── processing/   ← EventQueue (drop-oldest), sample-format conversion
//! ├── runtime/      ← Runtime, ActionScheduler, PhysicalAction bridge
//! ├── session/      ← ModeAutomaton, ResourceHandle
//! ├── devices/      ← Microphone, Camera, FrameWorker
//! └── mock          ← in-memory backends, RecordingDelegate
//! ```

pub mod devices;
pub mod mock;
pub mod models;
pub mod processing;
pub mod runtime;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use devices::camera::{Camera, CameraController, CameraEvent, CameraStats, ReadOutcome};
pub use devices::frame_worker::FrameWorker;
pub use devices::microphone::{Microphone, MicrophoneController, MicrophoneEvent, MicrophoneStats};
pub use models::config::{BridgeCapacity, CameraConfig, MicrophoneConfig, ReadStrategy, RuntimeConfig};
pub use models::error::{DeviceError, RuntimeError};
pub use models::mode::{CameraMode, MicrophoneMode, Mode};
pub use models::payload::{AudioBuffer, Frame, SampleFormat, Samples};
pub use models::tag::Tag;
pub use runtime::{ActionScheduler, PhysicalAction, Reactor, Runtime, RuntimeHandle, RuntimeStats};
pub use session::automaton::{ModeAutomaton, ModeToken};
pub use session::resource::{ResourceHandle, SessionId};
pub use traits::audio_backend::{AudioBackend, AudioBufferCallback};
pub use traits::delegate::{CameraDelegate, LoggingDelegate, MicrophoneDelegate};
pub use traits::session::Session;
pub use traits::video_backend::{VideoBackend, VideoSession};
