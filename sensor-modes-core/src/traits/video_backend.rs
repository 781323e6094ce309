use crate::models::error::DeviceError;
use crate::models::payload::Frame;

/// An open video capture session.
pub trait VideoSession: Send + 'static {
    /// Request a frame rate, returning the rate the device actually honors.
    fn set_rate(&mut self, fps: f64) -> Result<f64, DeviceError>;

    /// Frame rate currently reported by the device.
    fn fps(&self) -> f64;

    /// Read one frame. Blocks the calling thread until the device delivers
    /// or fails.
    fn read_frame(&mut self) -> Result<Frame, DeviceError>;

    /// Release the device. Idempotent.
    fn release(&mut self);
}

/// Blocking video capture backend.
pub trait VideoBackend: Send {
    type Session: VideoSession;

    fn open(&mut self, camera_id: i32) -> Result<Self::Session, DeviceError>;

    fn describe(&self) -> String;
}
