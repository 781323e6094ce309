use crate::models::error::DeviceError;
use crate::models::mode::{CameraMode, MicrophoneMode};
use crate::models::payload::{AudioBuffer, Frame};
use crate::models::tag::Tag;

/// Output sink for a microphone device.
///
/// All methods are called on the runtime's logical thread, in tag order.
pub trait MicrophoneDelegate: Send + Sync {
    /// Called when a mode transition commits, and once at startup with the
    /// initial mode.
    fn on_mode_changed(&self, mode: MicrophoneMode, tag: Tag);

    /// Called once per captured buffer (`audio_data`).
    fn on_audio_data(&self, tag: Tag, buffer: &AudioBuffer);

    /// Called when a recoverable device error occurs.
    fn on_error(&self, error: &DeviceError);
}

/// Output sink for a camera device.
///
/// All methods are called on the runtime's logical thread, in tag order.
pub trait CameraDelegate: Send + Sync {
    fn on_mode_changed(&self, mode: CameraMode, tag: Tag);

    /// Called once per successfully captured frame (`camera_frame`).
    fn on_camera_frame(&self, tag: Tag, frame: &Frame);

    /// Called when a capture attempt produced no frame. No frame is emitted
    /// for that attempt.
    fn on_frame_missing(&self, tag: Tag, error: &DeviceError);

    fn on_error(&self, error: &DeviceError);
}

/// Delegate that writes every output to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingDelegate;

impl MicrophoneDelegate for LoggingDelegate {
    fn on_mode_changed(&self, mode: MicrophoneMode, tag: Tag) {
        log::info!("microphone mode {} at {}", mode, tag);
    }

    fn on_audio_data(&self, tag: Tag, buffer: &AudioBuffer) {
        log::debug!(
            "audio_data at {}: {} frames x {} ch @ {} Hz ({:?})",
            tag,
            buffer.frames,
            buffer.channels,
            buffer.sample_rate,
            buffer.samples.format()
        );
    }

    fn on_error(&self, error: &DeviceError) {
        log::error!("microphone error: {}", error);
    }
}

impl CameraDelegate for LoggingDelegate {
    fn on_mode_changed(&self, mode: CameraMode, tag: Tag) {
        log::info!("camera mode {} at {}", mode, tag);
    }

    fn on_camera_frame(&self, tag: Tag, frame: &Frame) {
        log::debug!(
            "camera_frame #{} at {}: {}x{}x{} ({} bytes)",
            frame.index,
            tag,
            frame.width,
            frame.height,
            frame.channels,
            frame.data.len()
        );
    }

    fn on_frame_missing(&self, tag: Tag, error: &DeviceError) {
        log::warn!("missing frame at {}: {}", tag, error);
    }

    fn on_error(&self, error: &DeviceError) {
        log::error!("camera error: {}", error);
    }
}
