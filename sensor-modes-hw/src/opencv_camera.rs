//! Camera backend on OpenCV `videoio`.

use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use sensor_modes_core::models::error::DeviceError;
use sensor_modes_core::models::payload::Frame;
use sensor_modes_core::traits::video_backend::{VideoBackend, VideoSession};

/// Opens cameras by index through the platform's default capture API.
#[derive(Debug, Default)]
pub struct OpenCvCameraBackend;

impl OpenCvCameraBackend {
    pub fn new() -> Self {
        Self
    }
}

impl VideoBackend for OpenCvCameraBackend {
    type Session = OpenCvCameraSession;

    fn open(&mut self, camera_id: i32) -> Result<OpenCvCameraSession, DeviceError> {
        let device = format!("camera {}", camera_id);
        let capture = VideoCapture::new(camera_id, videoio::CAP_ANY)
            .map_err(|e| DeviceError::cannot_open(&device, e.to_string()))?;
        let opened = capture
            .is_opened()
            .map_err(|e| DeviceError::cannot_open(&device, e.to_string()))?;
        if !opened {
            return Err(DeviceError::cannot_open(device, "device did not open"));
        }
        Ok(OpenCvCameraSession {
            capture,
            released: false,
        })
    }

    fn describe(&self) -> String {
        "OpenCV camera".into()
    }
}

pub struct OpenCvCameraSession {
    capture: VideoCapture,
    released: bool,
}

impl VideoSession for OpenCvCameraSession {
    fn set_rate(&mut self, fps: f64) -> Result<f64, DeviceError> {
        self.capture
            .set(videoio::CAP_PROP_FPS, fps)
            .map_err(|e| DeviceError::Backend(format!("failed to set fps: {}", e)))?;
        // Some drivers report 0 when the rate is unknown.
        let actual = self.fps();
        Ok(if actual > 0.0 { actual } else { fps })
    }

    fn fps(&self) -> f64 {
        self.capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0)
    }

    fn read_frame(&mut self) -> Result<Frame, DeviceError> {
        let mut mat = Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| DeviceError::FrameMissing(e.to_string()))?;
        if !grabbed || mat.rows() == 0 || mat.cols() == 0 {
            return Err(DeviceError::FrameMissing("camera returned no frame".into()));
        }

        let data = mat
            .data_bytes()
            .map_err(|e| DeviceError::FrameMissing(format!("frame not readable: {}", e)))?
            .to_vec();
        Ok(Frame::new(
            mat.cols() as u32,
            mat.rows() as u32,
            mat.channels() as u8,
            data,
        ))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.capture.release() {
            log::warn!("failed to release camera: {}", e);
        }
    }
}

impl Drop for OpenCvCameraSession {
    fn drop(&mut self) {
        self.release();
    }
}
