use std::fmt;

use serde::{Deserialize, Serialize};

/// A mutually exclusive operating mode of a device.
///
/// `Effect` is the device-specific entry action vocabulary; `entry_effects`
/// lists what entering the mode must do, in order.
pub trait Mode: Copy + Eq + fmt::Debug + fmt::Display + Send + 'static {
    type Effect: Copy + Eq + fmt::Debug;

    fn entry_effects(self) -> &'static [Self::Effect];

    /// Whether this mode requires a live hardware session.
    fn holds_session(self) -> bool;
}

/// Microphone power modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicrophoneMode {
    On,
    Off,
}

/// Entry actions of the microphone automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicrophoneEffect {
    OpenStream,
    StopStream,
}

impl Mode for MicrophoneMode {
    type Effect = MicrophoneEffect;

    fn entry_effects(self) -> &'static [MicrophoneEffect] {
        match self {
            Self::On => &[MicrophoneEffect::OpenStream],
            Self::Off => &[MicrophoneEffect::StopStream],
        }
    }

    fn holds_session(self) -> bool {
        matches!(self, Self::On)
    }
}

impl fmt::Display for MicrophoneMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "On"),
            Self::Off => write!(f, "Off"),
        }
    }
}

/// Camera power modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraMode {
    Idle,
    Active,
}

/// Entry actions of the camera automaton.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraEffect {
    ReleaseSession,
    OpenSession,
    NegotiateRate,
    StartWorker,
    RequestFrame,
}

impl CameraMode {
    /// Maps the numeric `initial_mode` convention: 0 is `Idle`, anything else `Active`.
    pub fn from_index(index: u8) -> Self {
        if index == 0 {
            Self::Idle
        } else {
            Self::Active
        }
    }
}

impl Mode for CameraMode {
    type Effect = CameraEffect;

    fn entry_effects(self) -> &'static [CameraEffect] {
        match self {
            Self::Idle => &[CameraEffect::ReleaseSession],
            Self::Active => &[
                CameraEffect::OpenSession,
                CameraEffect::NegotiateRate,
                CameraEffect::StartWorker,
                CameraEffect::RequestFrame,
            ],
        }
    }

    fn holds_session(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Active => write!(f, "Active"),
        }
    }
}
