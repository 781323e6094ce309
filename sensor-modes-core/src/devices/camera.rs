//! Camera device: `Idle`/`Active` automaton over a [`VideoBackend`].
//!
//! ```text
//! Trigger  (Idle)   ──► Active ──Enter──► OpenSession ► NegotiateRate ► StartWorker ► RequestFrame
//! Trigger  (Active) ──► Capture
//! LowPower (Active) ──► release ──► Idle ──Enter──► ReleaseSession
//! Capture(token)    ──► read_frame ──► camera_frame | frame_missing   (+ period, if configured)
//! ```
//!
//! With the worker read strategy, a capture only requests a frame. The
//! result comes back as a `FrameReady` physical event and is dropped as
//! stale unless it belongs to the current session while `Active`.

use std::sync::Arc;
use std::time::Duration;

use crate::devices::frame_worker::{FrameCallback, FrameWorker, WorkerRequest};
use crate::models::config::{CameraConfig, ReadStrategy};
use crate::models::error::DeviceError;
use crate::models::mode::{CameraEffect, CameraMode, Mode};
use crate::models::payload::Frame;
use crate::runtime::bridge::PhysicalAction;
use crate::runtime::engine::Reactor;
use crate::runtime::scheduler::ActionScheduler;
use crate::session::automaton::{ModeAutomaton, ModeToken};
use crate::session::resource::{ResourceHandle, SessionId};
use crate::traits::delegate::CameraDelegate;
use crate::traits::session::Session;
use crate::traits::video_backend::{VideoBackend, VideoSession};

/// An open camera, read either on the calling thread or by a worker.
pub enum CameraSession<S: VideoSession> {
    Inline(S),
    Worker(FrameWorker),
}

impl<S: VideoSession> Session for CameraSession<S> {
    fn close(&mut self) -> Result<(), DeviceError> {
        match self {
            Self::Inline(session) => session.release(),
            Self::Worker(worker) => worker.release(),
        }
        Ok(())
    }
}

/// Outcome of one capture attempt.
#[derive(Debug)]
pub enum ReadOutcome {
    Frame(Frame),
    Missing(DeviceError),
    /// Handed to the frame worker; the result arrives later.
    Requested,
    /// The worker is still busy with the previous read.
    Busy,
    /// No session is open.
    Closed,
}

/// Owns the video backend and at most one open session.
pub struct CameraController<B: VideoBackend> {
    backend: B,
    session: ResourceHandle<CameraSession<B::Session>>,
}

impl<B: VideoBackend> CameraController<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            session: ResourceHandle::new("camera"),
        }
    }

    /// Open camera `camera_id` unless a session is already open.
    pub fn open(&mut self, camera_id: i32) -> Result<SessionId, DeviceError> {
        if let Some(id) = self.session.session_id() {
            return Ok(id);
        }
        let session = self.backend.open(camera_id).map_err(|e| match e {
            DeviceError::CannotOpen { .. } => e,
            other => DeviceError::cannot_open(format!("camera {}", camera_id), other.to_string()),
        })?;
        log::info!("opened {} (camera {})", self.backend.describe(), camera_id);
        Ok(self.session.acquire(CameraSession::Inline(session)))
    }

    /// Request `fps` and return the rate the device honors. Only possible
    /// before the worker takes the session.
    pub fn set_rate(&mut self, fps: f64) -> Result<f64, DeviceError> {
        match self.session.get_mut() {
            Some(CameraSession::Inline(session)) => session.set_rate(fps),
            Some(CameraSession::Worker(_)) => Err(DeviceError::Backend(
                "frame rate is fixed once the worker runs".into(),
            )),
            None => Err(DeviceError::NoSession),
        }
    }

    /// Move the open session onto a frame worker. `on_frame` builds the
    /// completion callback for the session's id.
    pub fn start_worker<F>(&mut self, on_frame: F) -> Result<(), DeviceError>
    where
        F: FnOnce(SessionId) -> FrameCallback,
    {
        let Some((id, session)) = self.session.detach() else {
            return Err(DeviceError::NoSession);
        };
        let worker = match session {
            CameraSession::Worker(worker) => worker,
            CameraSession::Inline(session) => FrameWorker::spawn(session, on_frame(id))?,
        };
        self.session.acquire_as(id, CameraSession::Worker(worker));
        Ok(())
    }

    /// Capture one frame: inline sessions read now, worker sessions request.
    pub fn read_frame(&mut self) -> ReadOutcome {
        match self.session.get_mut() {
            None => ReadOutcome::Closed,
            Some(CameraSession::Inline(session)) => match session.read_frame() {
                Ok(frame) => ReadOutcome::Frame(frame),
                Err(e) => ReadOutcome::Missing(missing(e)),
            },
            Some(CameraSession::Worker(worker)) => match worker.request() {
                WorkerRequest::Requested => ReadOutcome::Requested,
                WorkerRequest::Busy => ReadOutcome::Busy,
                WorkerRequest::Closed => ReadOutcome::Closed,
            },
        }
    }

    /// Release the session. Returns whether one was open.
    pub fn release(&mut self) -> bool {
        self.session.release()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_held()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.session_id()
    }
}

fn missing(error: DeviceError) -> DeviceError {
    match error {
        DeviceError::FrameMissing(_) => error,
        other => DeviceError::FrameMissing(other.to_string()),
    }
}

#[derive(Debug)]
pub enum CameraEvent {
    Trigger,
    LowPower,
    Enter(ModeToken<CameraMode>),
    Capture(ModeToken<CameraMode>),
    FrameReady {
        session: SessionId,
        result: Result<Frame, DeviceError>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames: u64,
    pub missing: u64,
    /// Captures skipped because the worker was still reading.
    pub skipped: u64,
    /// Worker results that arrived after their session ended.
    pub stale_dropped: u64,
}

/// Reactor driving one camera.
pub struct Camera<B: VideoBackend> {
    config: CameraConfig,
    automaton: ModeAutomaton<CameraMode>,
    controller: CameraController<B>,
    delegate: Arc<dyn CameraDelegate>,
    frames: Option<PhysicalAction<CameraEvent>>,
    negotiated_fps: Option<f64>,
    next_index: u64,
    stats: CameraStats,
}

impl<B: VideoBackend> Camera<B> {
    pub fn new(
        backend: B,
        config: CameraConfig,
        delegate: Arc<dyn CameraDelegate>,
    ) -> Result<Self, DeviceError> {
        config.validate()?;
        Ok(Self {
            automaton: ModeAutomaton::new(config.initial_mode),
            config,
            controller: CameraController::new(backend),
            delegate,
            frames: None,
            negotiated_fps: None,
            next_index: 0,
            stats: CameraStats::default(),
        })
    }

    pub fn mode(&self) -> CameraMode {
        self.automaton.current()
    }

    pub fn has_session(&self) -> bool {
        self.controller.is_open()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.controller.session_id()
    }

    /// Rate accepted by the device during the last activation.
    pub fn negotiated_fps(&self) -> Option<f64> {
        self.negotiated_fps
    }

    pub fn stats(&self) -> CameraStats {
        self.stats
    }

    fn request(&mut self, target: CameraMode, sched: &mut dyn ActionScheduler<CameraEvent>) {
        let now = sched.current_tag();
        if let Some(transition) = self.automaton.transition(target, now) {
            log::info!("camera: {} -> {} at {}", transition.from, transition.to, now);
            self.delegate.on_mode_changed(transition.to, now);
            sched.schedule(CameraEvent::Enter(transition.token), Duration::ZERO);
        }
    }

    fn enter(&mut self, token: ModeToken<CameraMode>, sched: &mut dyn ActionScheduler<CameraEvent>) {
        if !self.automaton.is_current(token) {
            log::debug!("skipping stale entry into {}", token.mode);
            return;
        }
        for effect in token.mode.entry_effects() {
            if !self.apply(*effect, token, sched) {
                break;
            }
        }
    }

    /// Run one entry effect. Returns `false` when the remaining effects must
    /// not run.
    fn apply(
        &mut self,
        effect: CameraEffect,
        token: ModeToken<CameraMode>,
        sched: &mut dyn ActionScheduler<CameraEvent>,
    ) -> bool {
        match effect {
            CameraEffect::ReleaseSession => {
                if self.controller.release() {
                    log::info!("camera session released at {}", sched.current_tag());
                }
                true
            }
            CameraEffect::OpenSession => match self.controller.open(self.config.camera_id) {
                Ok(_) => true,
                Err(e) => {
                    self.fail(e, sched);
                    false
                }
            },
            CameraEffect::NegotiateRate => {
                if self.config.capture_period().is_none() {
                    self.negotiate_rate();
                }
                true
            }
            CameraEffect::StartWorker => {
                if self.config.read_strategy != ReadStrategy::Worker {
                    return true;
                }
                let Some(lane) = self.frames.clone() else {
                    log::warn!("camera entered Active before startup");
                    return false;
                };
                let started = self.controller.start_worker(move |session| -> FrameCallback {
                    Box::new(move |result: Result<Frame, DeviceError>| {
                        lane.submit(CameraEvent::FrameReady { session, result });
                    })
                });
                match started {
                    Ok(()) => true,
                    Err(e) => {
                        self.fail(e, sched);
                        false
                    }
                }
            }
            CameraEffect::RequestFrame => {
                sched.schedule(CameraEvent::Capture(token), Duration::ZERO);
                true
            }
        }
    }

    fn negotiate_rate(&mut self) {
        let requested = self.config.fps;
        match self.controller.set_rate(requested) {
            Ok(actual) => {
                if (actual - requested).abs() > f64::EPSILON {
                    log::info!("requested {} fps, camera honors {} fps", requested, actual);
                } else {
                    log::debug!("camera running at {} fps", actual);
                }
                self.negotiated_fps = Some(actual);
            }
            Err(e) => log::warn!("frame rate negotiation failed: {}", e),
        }
    }

    /// An open failure is fatal for the whole runtime.
    fn fail(&mut self, error: DeviceError, sched: &mut dyn ActionScheduler<CameraEvent>) {
        log::error!("camera {} unusable: {}", self.config.camera_id, error);
        self.delegate.on_error(&error);
        sched.halt(error);
    }

    fn capture(&mut self, sched: &mut dyn ActionScheduler<CameraEvent>) {
        match self.controller.read_frame() {
            ReadOutcome::Frame(frame) => self.emit(Ok(frame), sched),
            ReadOutcome::Missing(e) => self.emit(Err(e), sched),
            ReadOutcome::Requested => {}
            ReadOutcome::Busy => {
                self.stats.skipped += 1;
                log::debug!("frame read still in flight, skipping capture");
            }
            ReadOutcome::Closed => log::warn!("capture requested without an open camera"),
        }
    }

    fn emit(&mut self, result: Result<Frame, DeviceError>, sched: &mut dyn ActionScheduler<CameraEvent>) {
        let now = sched.current_tag();
        match result {
            Ok(mut frame) => {
                frame.index = self.next_index;
                self.next_index += 1;
                self.stats.frames += 1;
                self.delegate.on_camera_frame(now, &frame);
            }
            Err(e) => {
                self.stats.missing += 1;
                log::warn!("no frame at {}: {}", now, e);
                self.delegate.on_frame_missing(now, &e);
            }
        }
    }
}

impl<B: VideoBackend> Reactor for Camera<B> {
    type Event = CameraEvent;

    fn name(&self) -> &str {
        "camera"
    }

    fn startup(&mut self, sched: &mut dyn ActionScheduler<CameraEvent>) {
        self.frames = Some(sched.physical_action(self.config.frame_queue));
        let now = sched.current_tag();
        self.delegate.on_mode_changed(self.automaton.current(), now);
        sched.schedule(CameraEvent::Enter(self.automaton.token()), Duration::ZERO);
    }

    fn react(&mut self, event: CameraEvent, sched: &mut dyn ActionScheduler<CameraEvent>) {
        match event {
            CameraEvent::Trigger => match self.automaton.current() {
                CameraMode::Idle => self.request(CameraMode::Active, sched),
                CameraMode::Active => self.capture(sched),
            },
            CameraEvent::LowPower => match self.automaton.current() {
                CameraMode::Idle => log::debug!("low_power while idle, nothing to do"),
                CameraMode::Active => {
                    self.controller.release();
                    self.request(CameraMode::Idle, sched);
                }
            },
            CameraEvent::Enter(token) => self.enter(token, sched),
            CameraEvent::Capture(token) => {
                if !self.automaton.is_current(token) {
                    log::debug!("dropping capture scheduled for a previous {} residency", token.mode);
                    return;
                }
                self.capture(sched);
                if let Some(period) = self.config.capture_period() {
                    sched.schedule(CameraEvent::Capture(token), period);
                }
            }
            CameraEvent::FrameReady { session, result } => {
                let live = self.automaton.current() == CameraMode::Active
                    && self.controller.session_id() == Some(session);
                if live {
                    self.emit(result, sched);
                } else {
                    self.stats.stale_dropped += 1;
                    log::debug!("dropping frame from stale session {}", session);
                }
            }
        }
    }

    fn shutdown(&mut self, _sched: &mut dyn ActionScheduler<CameraEvent>) {
        if self.controller.release() {
            log::info!("camera session released on shutdown");
        }
        log::debug!("camera: {} mode transition(s) this run", self.automaton.transitions());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockVideoBackend, RecordingDelegate, VideoOp};
    use crate::models::config::RuntimeConfig;
    use crate::models::error::RuntimeError;
    use crate::models::tag::Tag;
    use crate::runtime::engine::Runtime;

    fn inline(period_ms: u64) -> CameraConfig {
        CameraConfig {
            capture_period_ms: period_ms,
            read_strategy: ReadStrategy::Inline,
            ..Default::default()
        }
    }

    fn camera(
        backend: &MockVideoBackend,
        config: CameraConfig,
        delegate: &Arc<RecordingDelegate>,
    ) -> Runtime<Camera<MockVideoBackend>> {
        let camera = Camera::new(backend.clone(), config, delegate.clone()).unwrap();
        Runtime::new(
            camera,
            RuntimeConfig {
                fast: true,
                keepalive: false,
                timeout_ms: None,
            },
        )
    }

    #[test]
    fn idle_camera_holds_no_session() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, inline(0), &delegate);

        rt.start();
        rt.drain();

        assert_eq!(rt.reactor().mode(), CameraMode::Idle);
        assert!(!rt.reactor().has_session());
        assert!(backend.ops().is_empty());
    }

    #[test]
    fn activation_negotiates_rate_and_captures_once() {
        let backend = MockVideoBackend::new();
        backend.set_max_fps(15.0);
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, inline(0), &delegate);
        let input = rt.input();
        rt.start();
        rt.drain();

        input.submit(CameraEvent::Trigger);
        rt.drain();

        assert_eq!(
            backend.ops(),
            vec![VideoOp::Open(0), VideoOp::SetRate(30.0), VideoOp::Read]
        );
        assert_eq!(rt.reactor().negotiated_fps(), Some(15.0));
        assert_eq!(delegate.frames().len(), 1);
        assert_eq!(delegate.camera_modes(), vec![CameraMode::Idle, CameraMode::Active]);
    }

    #[test]
    fn trigger_while_active_captures_one_more_frame() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, inline(0), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        rt.drain();
        input.submit(CameraEvent::Trigger);
        rt.drain();

        let frames = delegate.frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].1.index, 0);
        assert_eq!(frames[1].1.index, 1);
        assert!(frames[0].0 < frames[1].0);
    }

    #[test]
    fn low_power_releases_and_goes_idle() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, inline(0), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        rt.drain();
        input.submit(CameraEvent::LowPower);
        rt.drain();

        assert_eq!(rt.reactor().mode(), CameraMode::Idle);
        assert!(!rt.reactor().has_session());
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn periodic_capture_follows_the_period() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let config = CameraConfig {
            initial_mode: CameraMode::Active,
            ..inline(100)
        };
        let mut rt = camera(&backend, config, &delegate);
        rt.start();

        rt.advance_to(Tag::at(Duration::from_millis(350)));

        let tags: Vec<_> = delegate.frames().iter().map(|(tag, _)| tag.time).collect();
        assert_eq!(
            tags,
            vec![
                Duration::ZERO,
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
            ]
        );
        // A capture period replaces rate negotiation.
        assert!(!backend.ops().iter().any(|op| matches!(op, VideoOp::SetRate(_))));
    }

    #[test]
    fn periodic_capture_stops_after_low_power() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let config = CameraConfig {
            initial_mode: CameraMode::Active,
            ..inline(1000)
        };
        let mut rt = camera(&backend, config, &delegate);
        let input = rt.input();
        rt.start();
        rt.advance_to(Tag::at(Duration::from_millis(1500)));

        input.submit(CameraEvent::LowPower);
        let processed = rt.drain();

        assert!(processed >= 1);
        assert_eq!(delegate.frames().len(), 2);
        assert_eq!(rt.reactor().mode(), CameraMode::Idle);
    }

    #[test]
    fn read_failure_skips_the_frame_and_stays_active() {
        let backend = MockVideoBackend::new();
        backend.fail_next_reads(1);
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, inline(0), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        rt.drain();

        assert!(delegate.frames().is_empty());
        assert_eq!(delegate.missing_frames(), 1);
        assert_eq!(rt.reactor().mode(), CameraMode::Active);

        input.submit(CameraEvent::Trigger);
        rt.drain();
        assert_eq!(delegate.frames().len(), 1);
    }

    #[test]
    fn open_failure_halts_the_runtime() {
        let backend = MockVideoBackend::new();
        backend.fail_open(Some(DeviceError::DeviceNotAvailable));
        let delegate = RecordingDelegate::new();
        let config = CameraConfig {
            initial_mode: CameraMode::Active,
            ..inline(0)
        };
        let mut rt = camera(&backend, config, &delegate);

        let err = rt.run().unwrap_err();

        let RuntimeError::Halted { reactor, source } = err;
        assert_eq!(reactor, "camera");
        assert!(matches!(source, DeviceError::CannotOpen { .. }));
        assert_eq!(delegate.errors().len(), 1);
        assert!(backend.ops().is_empty());
    }

    #[test]
    fn worker_frames_arrive_as_physical_events() {
        let backend = MockVideoBackend::new();
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, CameraConfig::default(), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        rt.settle(Duration::from_millis(200));

        assert_eq!(delegate.frames().len(), 1);
        assert_eq!(rt.reactor().stats().frames, 1);
        rt.shutdown().unwrap();
        assert_eq!(backend.open_sessions(), 0);
    }

    #[test]
    fn worker_busy_skips_overlapping_captures() {
        let backend = MockVideoBackend::new();
        backend.set_read_delay(Duration::from_millis(150));
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, CameraConfig::default(), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        rt.drain();
        input.submit(CameraEvent::Trigger);
        rt.drain();
        rt.settle(Duration::from_millis(400));

        assert_eq!(rt.reactor().stats().skipped, 1);
        assert_eq!(delegate.frames().len(), 1);
        assert_eq!(backend.reads(), 1);
    }

    #[test]
    fn worker_result_after_low_power_is_stale() {
        let backend = MockVideoBackend::new();
        backend.set_read_delay(Duration::from_millis(50));
        let delegate = RecordingDelegate::new();
        let mut rt = camera(&backend, CameraConfig::default(), &delegate);
        let input = rt.input();
        rt.start();

        input.submit(CameraEvent::Trigger);
        input.submit(CameraEvent::LowPower);
        rt.settle(Duration::from_millis(200));

        assert!(delegate.frames().is_empty());
        assert_eq!(rt.reactor().mode(), CameraMode::Idle);
        assert_eq!(rt.reactor().stats().stale_dropped, 1);
    }

    #[test]
    fn controller_release_is_idempotent() {
        let backend = MockVideoBackend::new();
        let mut controller = CameraController::new(backend.clone());

        assert!(!controller.release());
        controller.open(2).unwrap();
        assert!(controller.release());
        assert!(!controller.release());
        assert!(matches!(controller.read_frame(), ReadOutcome::Closed));
        assert_eq!(backend.ops(), vec![VideoOp::Open(2), VideoOp::Release]);
    }
}
