//! Microphone device: `On`/`Off` automaton over an [`AudioBackend`].
//!
//! ```text
//! TurnOff ──► Off ──Enter──► StopStream
//! TurnOn  ──► On  ──Enter──► OpenStream ──► backend callback ──► audio lane ──► Audio{session}
//! ```
//!
//! Audio from a stream other than the current one, or arriving while `Off`,
//! is counted as stale and dropped.

use std::sync::Arc;
use std::time::Duration;

use crate::models::config::MicrophoneConfig;
use crate::models::error::DeviceError;
use crate::models::mode::{MicrophoneEffect, MicrophoneMode, Mode};
use crate::models::payload::AudioBuffer;
use crate::processing::sample_format::to_audio_buffer;
use crate::runtime::bridge::PhysicalAction;
use crate::runtime::engine::Reactor;
use crate::runtime::scheduler::ActionScheduler;
use crate::session::automaton::{ModeAutomaton, ModeToken};
use crate::session::resource::{ResourceHandle, SessionId};
use crate::traits::audio_backend::{AudioBackend, AudioBufferCallback};
use crate::traits::delegate::MicrophoneDelegate;

/// Owns the audio backend and at most one open stream.
pub struct MicrophoneController<B: AudioBackend> {
    backend: B,
    stream: ResourceHandle<B::Stream>,
}

impl<B: AudioBackend> MicrophoneController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            stream: ResourceHandle::new("microphone"),
        }
    }

    /// Open a stream unless one is already open.
    ///
    /// `callback` builds the backend callback for the new stream's id, so
    /// every buffer it delivers can be traced back to its stream.
    pub fn open<F>(&mut self, config: &MicrophoneConfig, callback: F) -> Result<SessionId, DeviceError>
    where
        F: FnOnce(SessionId) -> AudioBufferCallback,
    {
        if let Some(id) = self.stream.session_id() {
            log::debug!("microphone stream {} already open", id);
            return Ok(id);
        }
        let id = SessionId::new();
        let stream = self.backend.open(config, callback(id))?;
        log::info!("opened {} (stream {})", self.backend.describe(), id);
        Ok(self.stream.acquire_as(id, stream))
    }

    /// Stop the stream. Returns whether one was open.
    pub fn close(&mut self) -> bool {
        self.stream.release()
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_held()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.stream.session_id()
    }
}

#[derive(Debug)]
pub enum MicrophoneEvent {
    TurnOn,
    TurnOff,
    Enter(ModeToken<MicrophoneMode>),
    Audio { session: SessionId, buffer: AudioBuffer },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MicrophoneStats {
    pub buffers_delivered: u64,
    /// Buffers from a closed stream or delivered while `Off`.
    pub stale_dropped: u64,
    pub open_failures: u64,
}

/// Reactor driving one microphone.
pub struct Microphone<B: AudioBackend> {
    config: MicrophoneConfig,
    automaton: ModeAutomaton<MicrophoneMode>,
    controller: MicrophoneController<B>,
    delegate: Arc<dyn MicrophoneDelegate>,
    audio: Option<PhysicalAction<MicrophoneEvent>>,
    stats: MicrophoneStats,
}

impl<B: AudioBackend> Microphone<B> {
    pub fn new(
        backend: B,
        config: MicrophoneConfig,
        delegate: Arc<dyn MicrophoneDelegate>,
    ) -> Result<Self, DeviceError> {
        config.validate()?;
        Ok(Self {
            config,
            automaton: ModeAutomaton::new(MicrophoneMode::On),
            controller: MicrophoneController::new(backend),
            delegate,
            audio: None,
            stats: MicrophoneStats::default(),
        })
    }

    pub fn mode(&self) -> MicrophoneMode {
        self.automaton.current()
    }

    pub fn is_streaming(&self) -> bool {
        self.controller.is_open()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.controller.session_id()
    }

    pub fn stats(&self) -> MicrophoneStats {
        self.stats
    }

    pub fn config(&self) -> &MicrophoneConfig {
        &self.config
    }

    fn request(&mut self, target: MicrophoneMode, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        let now = sched.current_tag();
        if let Some(transition) = self.automaton.transition(target, now) {
            log::info!("microphone: {} -> {} at {}", transition.from, transition.to, now);
            self.delegate.on_mode_changed(transition.to, now);
            sched.schedule(MicrophoneEvent::Enter(transition.token), Duration::ZERO);
        }
    }

    fn enter(&mut self, token: ModeToken<MicrophoneMode>, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        if !self.automaton.is_current(token) {
            log::debug!("skipping stale entry into {}", token.mode);
            return;
        }
        for effect in token.mode.entry_effects() {
            match effect {
                MicrophoneEffect::OpenStream => self.open_stream(sched),
                MicrophoneEffect::StopStream => {
                    if self.controller.close() {
                        log::info!("microphone stream stopped at {}", sched.current_tag());
                    }
                }
            }
        }
    }

    fn open_stream(&mut self, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        let Some(lane) = self.audio.clone() else {
            log::warn!("microphone entered On before startup");
            return;
        };
        let config = self.config.clone();
        let opened = self.controller.open(&self.config, move |session| -> AudioBufferCallback {
            Arc::new(move |samples: &[f32], sample_rate: u32, channels: u16| {
                let buffer = to_audio_buffer(samples, sample_rate, channels, &config);
                lane.submit(MicrophoneEvent::Audio { session, buffer });
            })
        });

        if let Err(e) = opened {
            log::error!("failed to open microphone: {}", e);
            self.stats.open_failures += 1;
            self.delegate.on_error(&e);
            self.request(MicrophoneMode::Off, sched);
        }
    }

    fn deliver(&mut self, session: SessionId, buffer: AudioBuffer, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        let live = self.automaton.current() == MicrophoneMode::On
            && self.controller.session_id() == Some(session);
        if !live {
            self.stats.stale_dropped += 1;
            log::debug!("dropping audio from stale stream {}", session);
            return;
        }
        self.stats.buffers_delivered += 1;
        self.delegate.on_audio_data(sched.current_tag(), &buffer);
    }
}

impl<B: AudioBackend> Reactor for Microphone<B> {
    type Event = MicrophoneEvent;

    fn name(&self) -> &str {
        "microphone"
    }

    fn startup(&mut self, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        self.audio = Some(sched.physical_action(self.config.bridge_capacity));
        let now = sched.current_tag();
        self.delegate.on_mode_changed(self.automaton.current(), now);
        sched.schedule(MicrophoneEvent::Enter(self.automaton.token()), Duration::ZERO);
    }

    fn react(&mut self, event: MicrophoneEvent, sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        match event {
            MicrophoneEvent::TurnOn => self.request(MicrophoneMode::On, sched),
            MicrophoneEvent::TurnOff => self.request(MicrophoneMode::Off, sched),
            MicrophoneEvent::Enter(token) => self.enter(token, sched),
            MicrophoneEvent::Audio { session, buffer } => self.deliver(session, buffer, sched),
        }
    }

    fn shutdown(&mut self, _sched: &mut dyn ActionScheduler<MicrophoneEvent>) {
        if self.controller.close() {
            log::info!("microphone stream stopped on shutdown");
        }
        log::debug!("microphone: {} mode transition(s) this run", self.automaton.transitions());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{AudioOp, MockAudioBackend, RecordingDelegate};
    use crate::models::config::RuntimeConfig;
    use crate::models::payload::Samples;
    use crate::runtime::engine::Runtime;

    fn microphone(backend: &MockAudioBackend, delegate: &Arc<RecordingDelegate>) -> Runtime<Microphone<MockAudioBackend>> {
        let mic = Microphone::new(backend.clone(), MicrophoneConfig::default(), delegate.clone()).unwrap();
        Runtime::new(
            mic,
            RuntimeConfig {
                fast: true,
                keepalive: false,
                timeout_ms: None,
            },
        )
    }

    #[test]
    fn starts_on_and_opens_stream() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);

        rt.start();
        rt.drain();

        assert_eq!(rt.reactor().mode(), MicrophoneMode::On);
        assert!(rt.reactor().is_streaming());
        assert_eq!(backend.ops(), vec![AudioOp::Open]);
        assert_eq!(delegate.microphone_modes(), vec![MicrophoneMode::On]);
    }

    #[test]
    fn redundant_turn_on_is_ignored() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);
        let input = rt.input();
        rt.start();
        rt.drain();

        input.submit(MicrophoneEvent::TurnOn);
        rt.drain();

        assert_eq!(backend.ops(), vec![AudioOp::Open]);
        assert_eq!(delegate.microphone_modes(), vec![MicrophoneMode::On]);
    }

    #[test]
    fn audio_is_converted_and_downmixed() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);
        rt.start();
        rt.drain();

        assert!(backend.emit(&[0.5, -0.5, 1.0, 1.0], 16000, 2));
        rt.drain();

        let audio = delegate.audio();
        assert_eq!(audio.len(), 1);
        assert_eq!(audio[0].channels, 1);
        assert_eq!(audio[0].frames, 2);
        assert_eq!(audio[0].samples, Samples::I16(vec![0, i16::MAX]));
        assert_eq!(rt.reactor().stats().buffers_delivered, 1);
    }

    #[test]
    fn audio_from_a_closed_stream_is_stale() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);
        let input = rt.input();
        rt.start();
        rt.drain();
        let old_stream = backend.callback().unwrap();

        input.submit(MicrophoneEvent::TurnOff);
        input.submit(MicrophoneEvent::TurnOn);
        rt.drain();

        old_stream(&[0.1; 8], 16000, 1);
        rt.drain();

        assert!(delegate.audio().is_empty());
        assert_eq!(rt.reactor().stats().stale_dropped, 1);
    }

    #[test]
    fn audio_buffered_before_turn_off_is_dropped() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);
        let input = rt.input();
        rt.start();
        rt.drain();

        input.submit(MicrophoneEvent::TurnOff);
        backend.emit(&[0.1; 8], 16000, 1);
        rt.drain();

        assert!(delegate.audio().is_empty());
        assert_eq!(rt.reactor().mode(), MicrophoneMode::Off);
        assert!(!rt.reactor().is_streaming());
    }

    #[test]
    fn open_failure_reports_and_falls_back_to_off() {
        let backend = MockAudioBackend::new();
        backend.fail_open(Some(DeviceError::PermissionDenied));
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);

        rt.start();
        rt.drain();

        assert_eq!(rt.reactor().mode(), MicrophoneMode::Off);
        assert!(!rt.reactor().is_streaming());
        assert_eq!(delegate.errors(), vec![DeviceError::PermissionDenied]);
        assert_eq!(
            delegate.microphone_modes(),
            vec![MicrophoneMode::On, MicrophoneMode::Off]
        );
        assert!(rt.shutdown().is_ok());
    }

    #[test]
    fn shutdown_stops_the_stream_once() {
        let backend = MockAudioBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = microphone(&backend, &delegate);
        rt.start();
        rt.drain();

        rt.shutdown().unwrap();
        rt.shutdown().unwrap();

        assert_eq!(backend.ops(), vec![AudioOp::Open, AudioOp::Stop]);
        assert!(!backend.emit(&[0.0; 4], 16000, 1));
    }

    #[test]
    fn controller_close_is_idempotent() {
        let mut controller = MicrophoneController::new(MockAudioBackend::new());
        let config = MicrophoneConfig::default();
        let noop = |_: SessionId| -> AudioBufferCallback { Arc::new(|_: &[f32], _: u32, _: u16| {}) };

        let first = controller.open(&config, noop).unwrap();
        let again = controller.open(&config, noop).unwrap();
        assert_eq!(first, again);

        assert!(controller.close());
        assert!(!controller.close());
        assert!(!controller.is_open());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = MicrophoneConfig {
            sample_rate: 0,
            ..Default::default()
        };
        let result = Microphone::new(MockAudioBackend::new(), config, RecordingDelegate::new());
        assert!(matches!(result, Err(DeviceError::ConfigurationFailed(_))));
    }
}
