use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::error::DeviceError;
use super::mode::CameraMode;
use super::payload::SampleFormat;

/// Queue policy of one async-bridge lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeCapacity {
    /// Never drops. Meant for low-rate control inputs.
    Unbounded,
    /// Keeps at most `n` pending events, dropping the oldest on overflow.
    Bounded(usize),
}

impl BridgeCapacity {
    pub fn limit(self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Bounded(n) => Some(n),
        }
    }
}

/// Where the camera's blocking frame read runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadStrategy {
    /// Dedicated frame worker thread; completions arrive as physical events.
    #[default]
    Worker,
    /// Blocking read on the logical thread.
    Inline,
}

/// Microphone configuration, immutable once the device is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MicrophoneConfig {
    /// Frames per delivered buffer (default: 1024).
    pub buffer_size: u32,

    /// Sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Channel count (default: 1).
    pub channels: u16,

    /// Input device index, or None for the system default.
    pub device_index: Option<usize>,

    /// Encoding of emitted samples (default: i16).
    pub sample_format: SampleFormat,

    /// Pending audio buffers held between the capture thread and the runtime.
    pub bridge_capacity: BridgeCapacity,
}

impl MicrophoneConfig {
    pub fn validate(&self) -> Result<(), DeviceError> {
        if self.sample_rate == 0 {
            return Err(DeviceError::ConfigurationFailed(
                "sample rate must be positive".into(),
            ));
        }
        if self.buffer_size == 0 {
            return Err(DeviceError::ConfigurationFailed(
                "buffer size must be positive".into(),
            ));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(DeviceError::ConfigurationFailed(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        validate_capacity(self.bridge_capacity)
    }
}

impl Default for MicrophoneConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            sample_rate: 16000,
            channels: 1,
            device_index: None,
            sample_format: SampleFormat::I16,
            bridge_capacity: BridgeCapacity::Bounded(64),
        }
    }
}

/// Camera configuration, immutable once the device is constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub camera_id: i32,

    /// Mode entered at startup (default: idle). Accepts `"idle"`/`"active"`
    /// or an index, where 0 is idle and anything else active.
    #[serde(deserialize_with = "camera_mode_by_name_or_index")]
    pub initial_mode: CameraMode,

    /// Frame rate requested from the device when no capture period is set.
    pub fps: f64,

    /// Capture cadence in milliseconds; 0 captures one frame per activation
    /// and one per trigger.
    pub capture_period_ms: u64,

    pub read_strategy: ReadStrategy,

    /// Pending frames held between the frame worker and the runtime.
    pub frame_queue: BridgeCapacity,
}

impl CameraConfig {
    pub fn capture_period(&self) -> Option<Duration> {
        (self.capture_period_ms > 0).then(|| Duration::from_millis(self.capture_period_ms))
    }

    pub fn validate(&self) -> Result<(), DeviceError> {
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(DeviceError::ConfigurationFailed(format!(
                "fps must be positive, got {}",
                self.fps
            )));
        }
        validate_capacity(self.frame_queue)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_id: 0,
            initial_mode: CameraMode::Idle,
            fps: 30.0,
            capture_period_ms: 0,
            read_strategy: ReadStrategy::Worker,
            frame_queue: BridgeCapacity::Bounded(4),
        }
    }
}

/// Runtime loop options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Process events as fast as possible instead of waiting for wall-clock
    /// time to reach their tags.
    pub fast: bool,

    /// Keep waiting for physical events when the event queue is empty.
    pub keepalive: bool,

    /// Logical time at which the runtime shuts down.
    pub timeout_ms: Option<u64>,
}

impl RuntimeConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fast: false,
            keepalive: true,
            timeout_ms: None,
        }
    }
}

fn camera_mode_by_name_or_index<'de, D>(deserializer: D) -> Result<CameraMode, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Index(u8),
        Name(CameraMode),
    }

    Ok(match Repr::deserialize(deserializer)? {
        Repr::Index(index) => CameraMode::from_index(index),
        Repr::Name(mode) => mode,
    })
}

fn validate_capacity(capacity: BridgeCapacity) -> Result<(), DeviceError> {
    if capacity == BridgeCapacity::Bounded(0) {
        return Err(DeviceError::ConfigurationFailed(
            "bridge capacity must be at least 1".into(),
        ));
    }
    Ok(())
}

/// Parse a JSON configuration document.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, DeviceError> {
    serde_json::from_str(text)
        .map_err(|e| DeviceError::ConfigurationFailed(format!("invalid config: {}", e)))
}

/// Load a JSON configuration file.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, DeviceError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        DeviceError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e))
    })?;
    parse_json(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn microphone_defaults_are_valid() {
        let config = MicrophoneConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sample_rate, 16000);
        assert_eq!(config.channels, 1);
    }

    #[test]
    fn microphone_rejects_bad_values() {
        let zero_rate = MicrophoneConfig {
            sample_rate: 0,
            ..Default::default()
        };
        assert!(zero_rate.validate().is_err());

        let many_channels = MicrophoneConfig {
            channels: 12,
            ..Default::default()
        };
        assert!(many_channels.validate().is_err());

        let no_room = MicrophoneConfig {
            bridge_capacity: BridgeCapacity::Bounded(0),
            ..Default::default()
        };
        assert!(no_room.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: MicrophoneConfig =
            parse_json(r#"{"sample_rate": 48000, "sample_format": "f32"}"#).unwrap();
        assert_eq!(config.sample_rate, 48000);
        assert_eq!(config.sample_format, SampleFormat::F32);
        assert_eq!(config.buffer_size, 1024);
        assert_eq!(config.bridge_capacity, BridgeCapacity::Bounded(64));
    }

    #[test]
    fn camera_json_with_capacity_and_mode() {
        let config: CameraConfig = parse_json(
            r#"{"initial_mode": "active", "capture_period_ms": 100, "frame_queue": "unbounded", "read_strategy": "inline"}"#,
        )
        .unwrap();
        assert_eq!(config.initial_mode, CameraMode::Active);
        assert_eq!(config.capture_period(), Some(Duration::from_millis(100)));
        assert_eq!(config.frame_queue, BridgeCapacity::Unbounded);
        assert_eq!(config.read_strategy, ReadStrategy::Inline);
    }

    #[test]
    fn camera_initial_mode_by_index() {
        let idle: CameraConfig = parse_json(r#"{"initial_mode": 0}"#).unwrap();
        assert_eq!(idle.initial_mode, CameraMode::Idle);

        let active: CameraConfig = parse_json(r#"{"initial_mode": 1}"#).unwrap();
        assert_eq!(active.initial_mode, CameraMode::Active);

        assert!(parse_json::<CameraConfig>(r#"{"initial_mode": "standby"}"#).is_err());
    }

    #[test]
    fn zero_period_means_no_cadence() {
        assert_eq!(CameraConfig::default().capture_period(), None);
    }

    #[test]
    fn camera_rejects_non_positive_fps() {
        let config = CameraConfig {
            fps: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_is_configuration_error() {
        let err = parse_json::<RuntimeConfig>("{ not json").unwrap_err();
        assert!(matches!(err, DeviceError::ConfigurationFailed(_)));
    }

    #[test]
    fn missing_file_is_configuration_error() {
        let err = load_json::<RuntimeConfig>(Path::new("/nonexistent/sensor.json")).unwrap_err();
        assert!(matches!(err, DeviceError::ConfigurationFailed(_)));
    }
}
