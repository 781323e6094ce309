//! # sensor-modes-hw
//!
//! Hardware backends for sensor-modes-core.
//!
//! Provides:
//! - `WasapiMicBackend`: microphone capture via a WASAPI capture endpoint (Windows)
//! - `DeviceEnumerator`: capture endpoint enumeration via the MMDevice API (Windows)
//! - `permissions`: Windows microphone privacy check
//! - `OpenCvCameraBackend`: camera capture via OpenCV `videoio` (feature `opencv`)
//!
//! ## Platform Requirements
//! - Windows 10+ with Visual Studio Build Tools and the Windows SDK for the WASAPI backend
//! - An OpenCV 4.x installation discoverable by the `opencv` crate for the camera backend
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use sensor_modes_core::{LoggingDelegate, Microphone, MicrophoneConfig, Runtime, RuntimeConfig};
//! use sensor_modes_hw::WasapiMicBackend;
//!
//! let mic = Microphone::new(WasapiMicBackend::new(), MicrophoneConfig::default(), Arc::new(LoggingDelegate))?;
//! Runtime::new(mic, RuntimeConfig::default()).run()?;
//! ```

#[cfg(target_os = "windows")]
pub mod device_enumerator;
#[cfg(target_os = "windows")]
pub mod permissions;
#[cfg(target_os = "windows")]
pub mod wasapi_mic;

#[cfg(feature = "opencv")]
pub mod opencv_camera;

#[cfg(target_os = "windows")]
pub use device_enumerator::{CaptureDevice, DeviceEnumerator};
#[cfg(target_os = "windows")]
pub use wasapi_mic::WasapiMicBackend;

#[cfg(feature = "opencv")]
pub use opencv_camera::OpenCvCameraBackend;
