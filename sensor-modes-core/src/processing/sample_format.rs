//! Pure-math conversion of backend f32 buffers into emitted audio payloads.

use crate::models::config::MicrophoneConfig;
use crate::models::payload::{AudioBuffer, SampleFormat, Samples};

/// Convert f32 samples `[-1.0, 1.0]` to the requested encoding.
///
/// Clamps out-of-range values. Integer encodings scale by the positive
/// maximum, so -1.0 maps to `-MAX` rather than `MIN`.
pub fn convert(samples: &[f32], format: SampleFormat) -> Samples {
    match format {
        SampleFormat::F32 => Samples::F32(samples.iter().map(|s| s.clamp(-1.0, 1.0)).collect()),
        SampleFormat::I16 => Samples::I16(
            samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
                .collect(),
        ),
        SampleFormat::I32 => Samples::I32(
            samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) as f64 * i32::MAX as f64) as i32)
                .collect(),
        ),
        SampleFormat::U8 => Samples::U8(
            samples
                .iter()
                .map(|s| (s.clamp(-1.0, 1.0) * 127.0 + 128.0).round() as u8)
                .collect(),
        ),
    }
}

/// Downmix interleaved multi-channel audio to mono by averaging channels per frame.
///
/// A trailing partial frame is dropped.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let partial = samples.len() % channels;
    if partial != 0 {
        log::warn!(
            "buffer of {} samples is not a whole number of {}-channel frames, dropping {} trailing sample(s)",
            samples.len(),
            channels,
            partial
        );
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Build the `audio_data` payload for one backend buffer.
///
/// A mono configuration downmixes whatever the device delivered; other
/// layouts pass through with the delivered channel count.
pub fn to_audio_buffer(
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
    config: &MicrophoneConfig,
) -> AudioBuffer {
    let (interleaved, channels) = if config.channels == 1 && channels > 1 {
        (downmix_to_mono(samples, channels as usize), 1)
    } else {
        (samples.to_vec(), channels.max(1))
    };
    let frames = interleaved.len() / channels as usize;
    AudioBuffer {
        samples: convert(&interleaved, config.sample_format),
        channels,
        sample_rate,
        frames,
    }
}
