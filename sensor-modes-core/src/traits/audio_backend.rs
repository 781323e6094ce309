use std::sync::Arc;

use crate::models::config::MicrophoneConfig;
use crate::models::error::DeviceError;
use crate::traits::session::Session;

/// Callback invoked when an audio buffer is available.
///
/// Parameters:
/// - `samples`: Interleaved f32 samples.
/// - `sample_rate`: The actual sample rate of the delivered audio.
/// - `channels`: Number of interleaved channels.
pub type AudioBufferCallback = Arc<dyn Fn(&[f32], u32, u16) + Send + Sync + 'static>;

/// Callback-driven audio input backend.
///
/// Implemented by:
/// - `WasapiMicBackend` (sensor-modes-hw, Windows)
/// - `MockAudioBackend` (tests and demos)
pub trait AudioBackend: Send {
    type Stream: Session;

    /// Start streaming, delivering buffers via `callback`.
    ///
    /// The callback fires on a thread owned by the backend. It must only hand
    /// data off; it never touches device state.
    fn open(
        &mut self,
        config: &MicrophoneConfig,
        callback: AudioBufferCallback,
    ) -> Result<Self::Stream, DeviceError>;

    /// Human-readable name used in logs.
    fn describe(&self) -> String;
}
