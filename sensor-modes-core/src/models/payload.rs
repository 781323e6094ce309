use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sample encoding of emitted audio buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    F32,
    #[default]
    I16,
    I32,
    U8,
}

/// Interleaved samples in the configured encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    F32(Vec<f32>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    U8(Vec<u8>),
}

impl Samples {
    pub fn len(&self) -> usize {
        match self {
            Self::F32(s) => s.len(),
            Self::I16(s) => s.len(),
            Self::I32(s) => s.len(),
            Self::U8(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn format(&self) -> SampleFormat {
        match self {
            Self::F32(_) => SampleFormat::F32,
            Self::I16(_) => SampleFormat::I16,
            Self::I32(_) => SampleFormat::I32,
            Self::U8(_) => SampleFormat::U8,
        }
    }
}

/// One captured audio buffer, the payload of an `audio_data` output.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Samples,
    pub channels: u16,
    pub sample_rate: u32,
    /// Samples per channel.
    pub frames: usize,
}

/// One captured video frame, the payload of a `camera_frame` output.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Per-device sequence number, assigned when the frame is emitted.
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(width: u32, height: u32, channels: u8, data: Vec<u8>) -> Self {
        Self {
            index: 0,
            width,
            height,
            channels,
            data,
            captured_at: Utc::now(),
        }
    }
}
