//! In-memory backends and a recording delegate.
//!
//! Used by the test suite and by hosts that run without hardware. Backends
//! are cheap to clone; clones share state so a test can keep one copy for
//! inspection while the device owns the other.

use std::f32::consts::TAU;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::models::config::MicrophoneConfig;
use crate::models::error::DeviceError;
use crate::models::mode::{CameraMode, MicrophoneMode};
use crate::models::payload::{AudioBuffer, Frame};
use crate::models::tag::Tag;
use crate::traits::audio_backend::{AudioBackend, AudioBufferCallback};
use crate::traits::delegate::{CameraDelegate, MicrophoneDelegate};
use crate::traits::session::Session;
use crate::traits::video_backend::{VideoBackend, VideoSession};

/// Backend calls observed by [`MockAudioBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioOp {
    Open,
    Stop,
}

#[derive(Default)]
struct AudioShared {
    ops: Vec<AudioOp>,
    callback: Option<AudioBufferCallback>,
    fail_open: Option<DeviceError>,
}

/// Audio backend driven by the test, or by a tone generator thread.
#[derive(Clone, Default)]
pub struct MockAudioBackend {
    shared: Arc<Mutex<AudioShared>>,
    generator: Option<Duration>,
}

impl MockAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams spawn a thread that delivers a 440 Hz tone every `period`.
    pub fn with_generator(period: Duration) -> Self {
        Self {
            generator: Some(period),
            ..Self::default()
        }
    }

    /// Make every following `open` fail with `error`, or succeed again with `None`.
    pub fn fail_open(&self, error: Option<DeviceError>) {
        self.shared.lock().fail_open = error;
    }

    pub fn ops(&self) -> Vec<AudioOp> {
        self.shared.lock().ops.clone()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.lock().callback.is_some()
    }

    /// Callback of the live stream, as the capture thread would hold it.
    pub fn callback(&self) -> Option<AudioBufferCallback> {
        self.shared.lock().callback.clone()
    }

    /// Deliver one buffer through the live stream. Returns `false` when no
    /// stream is open.
    pub fn emit(&self, samples: &[f32], sample_rate: u32, channels: u16) -> bool {
        let Some(callback) = self.callback() else {
            return false;
        };
        callback(samples, sample_rate, channels);
        true
    }
}

impl AudioBackend for MockAudioBackend {
    type Stream = MockAudioStream;

    fn open(
        &mut self,
        config: &MicrophoneConfig,
        callback: AudioBufferCallback,
    ) -> Result<MockAudioStream, DeviceError> {
        {
            let mut shared = self.shared.lock();
            if let Some(error) = shared.fail_open.clone() {
                return Err(error);
            }
            shared.ops.push(AudioOp::Open);
            shared.callback = Some(Arc::clone(&callback));
        }

        let running = Arc::new(AtomicBool::new(true));
        let generator = match self.generator {
            Some(period) => Some(spawn_tone(
                Arc::clone(&running),
                period,
                config.clone(),
                callback,
            )?),
            None => None,
        };

        Ok(MockAudioStream {
            shared: Arc::clone(&self.shared),
            running,
            generator,
            closed: false,
        })
    }

    fn describe(&self) -> String {
        "mock microphone".into()
    }
}

fn spawn_tone(
    running: Arc<AtomicBool>,
    period: Duration,
    config: MicrophoneConfig,
    callback: AudioBufferCallback,
) -> Result<thread::JoinHandle<()>, DeviceError> {
    thread::Builder::new()
        .name("mock-mic-tone".into())
        .spawn(move || {
            let channels = config.channels as usize;
            let frames = config.buffer_size as usize;
            let step = 440.0 / config.sample_rate as f32;
            let mut phase = 0.0f32;
            let mut buffer = vec![0.0f32; frames * channels];
            while running.load(Ordering::SeqCst) {
                thread::sleep(period);
                for frame in buffer.chunks_exact_mut(channels) {
                    frame.fill((phase * TAU).sin() * 0.25);
                    phase = (phase + step).fract();
                }
                callback(&buffer, config.sample_rate, config.channels);
            }
        })
        .map_err(|e| DeviceError::Backend(format!("failed to spawn tone thread: {}", e)))
}

/// Stream handed out by [`MockAudioBackend`].
pub struct MockAudioStream {
    shared: Arc<Mutex<AudioShared>>,
    running: Arc<AtomicBool>,
    generator: Option<thread::JoinHandle<()>>,
    closed: bool,
}

impl Session for MockAudioStream {
    fn close(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.generator.take() {
            let _ = handle.join();
        }
        let mut shared = self.shared.lock();
        shared.callback = None;
        shared.ops.push(AudioOp::Stop);
        Ok(())
    }
}

/// Backend calls observed by [`MockVideoBackend`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VideoOp {
    Open(i32),
    SetRate(f64),
    Read,
    Release,
}

struct VideoShared {
    ops: Vec<VideoOp>,
    fail_open: Option<DeviceError>,
    failing_reads: u32,
    max_fps: f64,
    read_delay: Duration,
    open_sessions: usize,
}

/// Video backend producing small synthetic frames.
#[derive(Clone)]
pub struct MockVideoBackend {
    shared: Arc<Mutex<VideoShared>>,
    width: u32,
    height: u32,
}

impl MockVideoBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(VideoShared {
                ops: Vec::new(),
                fail_open: None,
                failing_reads: 0,
                max_fps: 30.0,
                read_delay: Duration::ZERO,
                open_sessions: 0,
            })),
            width: 4,
            height: 3,
        }
    }

    pub fn fail_open(&self, error: Option<DeviceError>) {
        self.shared.lock().fail_open = error;
    }

    /// The next `count` reads fail with `FrameMissing`.
    pub fn fail_next_reads(&self, count: u32) {
        self.shared.lock().failing_reads = count;
    }

    /// Highest rate sessions will honor.
    pub fn set_max_fps(&self, fps: f64) {
        self.shared.lock().max_fps = fps;
    }

    /// Make every read block for `delay`.
    pub fn set_read_delay(&self, delay: Duration) {
        self.shared.lock().read_delay = delay;
    }

    pub fn ops(&self) -> Vec<VideoOp> {
        self.shared.lock().ops.clone()
    }

    pub fn reads(&self) -> usize {
        self.shared
            .lock()
            .ops
            .iter()
            .filter(|op| matches!(op, VideoOp::Read))
            .count()
    }

    /// Sessions opened and not yet released.
    pub fn open_sessions(&self) -> usize {
        self.shared.lock().open_sessions
    }
}

impl Default for MockVideoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoBackend for MockVideoBackend {
    type Session = MockVideoSession;

    fn open(&mut self, camera_id: i32) -> Result<MockVideoSession, DeviceError> {
        let mut shared = self.shared.lock();
        if let Some(error) = shared.fail_open.clone() {
            return Err(error);
        }
        shared.ops.push(VideoOp::Open(camera_id));
        shared.open_sessions += 1;
        Ok(MockVideoSession {
            shared: Arc::clone(&self.shared),
            fps: shared.max_fps,
            width: self.width,
            height: self.height,
            served: 0,
            released: false,
        })
    }

    fn describe(&self) -> String {
        "mock camera".into()
    }
}

pub struct MockVideoSession {
    shared: Arc<Mutex<VideoShared>>,
    fps: f64,
    width: u32,
    height: u32,
    served: u64,
    released: bool,
}

impl VideoSession for MockVideoSession {
    fn set_rate(&mut self, fps: f64) -> Result<f64, DeviceError> {
        let mut shared = self.shared.lock();
        shared.ops.push(VideoOp::SetRate(fps));
        self.fps = fps.min(shared.max_fps);
        Ok(self.fps)
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn read_frame(&mut self) -> Result<Frame, DeviceError> {
        let delay = {
            let mut shared = self.shared.lock();
            shared.ops.push(VideoOp::Read);
            shared.read_delay
        };
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut shared = self.shared.lock();
        if shared.failing_reads > 0 {
            shared.failing_reads -= 1;
            return Err(DeviceError::FrameMissing("simulated read failure".into()));
        }
        self.served += 1;
        let size = (self.width * self.height * 3) as usize;
        Ok(Frame::new(
            self.width,
            self.height,
            3,
            vec![self.served as u8; size],
        ))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut shared = self.shared.lock();
        shared.ops.push(VideoOp::Release);
        shared.open_sessions -= 1;
    }
}

impl Drop for MockVideoSession {
    fn drop(&mut self) {
        self.release();
    }
}

/// One delegate callback, as observed by [`RecordingDelegate`].
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    MicrophoneMode(MicrophoneMode, Tag),
    Audio(Tag, AudioBuffer),
    CameraMode(CameraMode, Tag),
    Frame(Tag, Frame),
    FrameMissing(Tag, DeviceError),
    Error(DeviceError),
}

/// Delegate that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingDelegate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn microphone_modes(&self) -> Vec<MicrophoneMode> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::MicrophoneMode(mode, _) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn camera_modes(&self) -> Vec<CameraMode> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::CameraMode(mode, _) => Some(*mode),
                _ => None,
            })
            .collect()
    }

    pub fn audio(&self) -> Vec<AudioBuffer> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Audio(_, buffer) => Some(buffer.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn frames(&self) -> Vec<(Tag, Frame)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Frame(tag, frame) => Some((*tag, frame.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn missing_frames(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| matches!(e, Recorded::FrameMissing(..)))
            .count()
    }

    pub fn errors(&self) -> Vec<DeviceError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Error(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: Recorded) {
        self.events.lock().push(event);
    }
}

impl MicrophoneDelegate for RecordingDelegate {
    fn on_mode_changed(&self, mode: MicrophoneMode, tag: Tag) {
        self.push(Recorded::MicrophoneMode(mode, tag));
    }

    fn on_audio_data(&self, tag: Tag, buffer: &AudioBuffer) {
        self.push(Recorded::Audio(tag, buffer.clone()));
    }

    fn on_error(&self, error: &DeviceError) {
        self.push(Recorded::Error(error.clone()));
    }
}

impl CameraDelegate for RecordingDelegate {
    fn on_mode_changed(&self, mode: CameraMode, tag: Tag) {
        self.push(Recorded::CameraMode(mode, tag));
    }

    fn on_camera_frame(&self, tag: Tag, frame: &Frame) {
        self.push(Recorded::Frame(tag, frame.clone()));
    }

    fn on_frame_missing(&self, tag: Tag, error: &DeviceError) {
        self.push(Recorded::FrameMissing(tag, error.clone()));
    }

    fn on_error(&self, error: &DeviceError) {
        self.push(Recorded::Error(error.clone()));
    }
}
