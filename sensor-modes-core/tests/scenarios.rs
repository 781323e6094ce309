use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sensor_modes_core::mock::{AudioOp, MockAudioBackend, MockVideoBackend, Recorded, RecordingDelegate};
use sensor_modes_core::models::config::parse_json;
use sensor_modes_core::{
    AudioBufferCallback, BridgeCapacity, Camera, CameraConfig, CameraController, CameraEvent,
    CameraMode, DeviceError, Microphone, MicrophoneConfig, MicrophoneController, MicrophoneEvent,
    MicrophoneMode, Mode, ReadStrategy, Runtime, RuntimeConfig, RuntimeError, Samples, SessionId,
};

fn stepping() -> RuntimeConfig {
    RuntimeConfig {
        fast: true,
        keepalive: false,
        timeout_ms: None,
    }
}

fn mic_runtime(
    backend: &MockAudioBackend,
    delegate: &Arc<RecordingDelegate>,
) -> Runtime<Microphone<MockAudioBackend>> {
    let config = MicrophoneConfig {
        sample_rate: 16000,
        channels: 1,
        ..Default::default()
    };
    let mic = Microphone::new(backend.clone(), config, delegate.clone()).unwrap();
    Runtime::new(mic, stepping())
}

fn camera_runtime(
    backend: &MockVideoBackend,
    config: CameraConfig,
    delegate: &Arc<RecordingDelegate>,
) -> Runtime<Camera<MockVideoBackend>> {
    let camera = Camera::new(backend.clone(), config, delegate.clone()).unwrap();
    Runtime::new(camera, stepping())
}

#[test]
fn microphone_handle_tracks_mode_after_every_input() {
    let backend = MockAudioBackend::new();
    let delegate = RecordingDelegate::new();
    let mut rt = mic_runtime(&backend, &delegate);
    let input = rt.input();
    rt.start();
    rt.drain();
    assert!(rt.reactor().is_streaming());

    let sequence = [
        MicrophoneEvent::TurnOff,
        MicrophoneEvent::TurnOff,
        MicrophoneEvent::TurnOn,
        MicrophoneEvent::TurnOn,
        MicrophoneEvent::TurnOff,
        MicrophoneEvent::TurnOn,
        MicrophoneEvent::TurnOff,
    ];
    for event in sequence {
        input.submit(event);
        rt.drain();
        let mic = rt.reactor();
        assert_eq!(mic.is_streaming(), mic.mode().holds_session());
    }
    assert!(!backend.is_streaming());
}

#[test]
fn physical_events_from_a_foreign_thread_keep_order() {
    let backend = MockAudioBackend::new();
    let delegate = RecordingDelegate::new();
    let mut rt = mic_runtime(&backend, &delegate);
    rt.start();
    rt.drain();

    let capture = backend.clone();
    let producer = thread::spawn(move || {
        capture.emit(&[0.25; 4], 16000, 1);
        capture.emit(&[0.5; 4], 16000, 1);
    });
    producer.join().unwrap();
    rt.drain();

    let audio: Vec<_> = delegate
        .events()
        .into_iter()
        .filter_map(|event| match event {
            Recorded::Audio(tag, buffer) => Some((tag, buffer)),
            _ => None,
        })
        .collect();
    assert_eq!(audio.len(), 2);
    assert!(audio[0].0 < audio[1].0);
    let Samples::I16(first) = &audio[0].1.samples else {
        panic!("expected i16 samples");
    };
    let Samples::I16(second) = &audio[1].1.samples else {
        panic!("expected i16 samples");
    };
    assert!(first[0] < second[0]);
}

#[test]
fn double_release_never_errors() {
    let mut mic = MicrophoneController::new(MockAudioBackend::new());
    assert!(!mic.close());
    let silent = |_: SessionId| -> AudioBufferCallback { Arc::new(|_: &[f32], _: u32, _: u16| {}) };
    mic.open(&MicrophoneConfig::default(), silent).unwrap();
    assert!(mic.close());
    assert!(!mic.close());
    assert!(!mic.is_open());

    let mut camera = CameraController::new(MockVideoBackend::new());
    assert!(!camera.release());
    camera.open(0).unwrap();
    assert!(camera.release());
    assert!(!camera.release());
    assert!(!camera.is_open());
}

#[test]
fn low_power_is_a_noop_while_idle_and_releases_while_active() {
    let backend = MockVideoBackend::new();
    let delegate = RecordingDelegate::new();
    let config = CameraConfig {
        read_strategy: ReadStrategy::Inline,
        ..Default::default()
    };
    let mut rt = camera_runtime(&backend, config, &delegate);
    let input = rt.input();
    rt.start();
    rt.drain();

    input.submit(CameraEvent::LowPower);
    rt.drain();
    assert_eq!(rt.reactor().mode(), CameraMode::Idle);
    assert_eq!(delegate.camera_modes(), vec![CameraMode::Idle]);
    assert!(backend.ops().is_empty());

    input.submit(CameraEvent::Trigger);
    rt.drain();
    assert!(rt.reactor().has_session());

    input.submit(CameraEvent::LowPower);
    rt.drain();
    assert_eq!(rt.reactor().mode(), CameraMode::Idle);
    assert!(!rt.reactor().has_session());
    assert_eq!(backend.open_sessions(), 0);
}

#[test]
fn microphone_off_and_on_again() {
    let backend = MockAudioBackend::new();
    let delegate = RecordingDelegate::new();
    let mut rt = mic_runtime(&backend, &delegate);
    let input = rt.input();
    rt.start();
    rt.drain();

    input.submit(MicrophoneEvent::TurnOff);
    rt.drain();
    // Nothing is streaming, so nothing can be captured while Off.
    assert!(!backend.emit(&[0.1; 16], 16000, 1));
    input.submit(MicrophoneEvent::TurnOn);
    rt.drain();
    assert!(backend.emit(&[0.1; 16], 16000, 1));
    rt.drain();

    assert_eq!(
        delegate.microphone_modes(),
        vec![MicrophoneMode::On, MicrophoneMode::Off, MicrophoneMode::On]
    );
    assert_eq!(backend.ops(), vec![AudioOp::Open, AudioOp::Stop, AudioOp::Open]);

    let events = delegate.events();
    let off = events
        .iter()
        .position(|e| matches!(e, Recorded::MicrophoneMode(MicrophoneMode::Off, _)))
        .unwrap();
    let on_again = events
        .iter()
        .rposition(|e| matches!(e, Recorded::MicrophoneMode(MicrophoneMode::On, _)))
        .unwrap();
    assert!(!events[off..on_again]
        .iter()
        .any(|e| matches!(e, Recorded::Audio(..))));
    assert_eq!(delegate.audio().len(), 1);
}

#[test]
fn idle_camera_trigger_yields_exactly_one_frame() {
    let backend = MockVideoBackend::new();
    let delegate = RecordingDelegate::new();
    let config: CameraConfig = parse_json(r#"{"initial_mode": 0}"#).unwrap();
    assert_eq!(config.initial_mode, CameraMode::Idle);
    let mut rt = camera_runtime(&backend, config, &delegate);
    let input = rt.input();

    rt.start();
    rt.drain();
    assert!(!rt.reactor().has_session());
    assert_eq!(backend.open_sessions(), 0);

    input.submit(CameraEvent::Trigger);
    rt.settle(Duration::from_millis(200));

    assert_eq!(delegate.frames().len(), 1);
    assert_eq!(rt.reactor().mode(), CameraMode::Active);
    rt.shutdown().unwrap();
    assert_eq!(backend.open_sessions(), 0);
}

#[test]
fn simulated_read_failure_yields_no_frame() {
    let backend = MockVideoBackend::new();
    backend.fail_next_reads(1);
    let delegate = RecordingDelegate::new();
    let mut rt = camera_runtime(&backend, CameraConfig::default(), &delegate);
    let input = rt.input();
    rt.start();

    input.submit(CameraEvent::Trigger);
    rt.settle(Duration::from_millis(200));

    assert!(delegate.frames().is_empty());
    assert_eq!(delegate.missing_frames(), 1);
    assert_eq!(rt.reactor().mode(), CameraMode::Active);
    assert!(delegate.errors().is_empty());
}

#[test]
fn blocking_run_streams_until_stopped() {
    let backend = MockAudioBackend::with_generator(Duration::from_millis(5));
    let delegate = RecordingDelegate::new();
    let config = MicrophoneConfig {
        buffer_size: 80,
        ..Default::default()
    };
    let mic = Microphone::new(backend.clone(), config, delegate.clone()).unwrap();
    let mut rt = Runtime::new(mic, RuntimeConfig::default());
    let handle = rt.handle();

    let host = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        handle.request_stop();
    });
    rt.run().unwrap();
    host.join().unwrap();

    let audio = delegate.audio();
    assert!(!audio.is_empty());
    assert!(audio.iter().all(|buffer| buffer.frames == 80));
    assert_eq!(backend.ops(), vec![AudioOp::Open, AudioOp::Stop]);
    assert!(rt.is_finished());
}

#[test]
fn camera_open_failure_stops_the_runtime() {
    let backend = MockVideoBackend::new();
    backend.fail_open(Some(DeviceError::cannot_open("camera 0", "unplugged")));
    let delegate = RecordingDelegate::new();
    let mut rt = camera_runtime(&backend, CameraConfig::default(), &delegate);
    let input = rt.input();
    rt.start();

    input.submit(CameraEvent::Trigger);
    input.submit(CameraEvent::Trigger);
    rt.drain();

    let err = rt.shutdown().unwrap_err();
    assert_eq!(
        err,
        RuntimeError::Halted {
            reactor: "camera".into(),
            source: DeviceError::cannot_open("camera 0", "unplugged"),
        }
    );
    assert_eq!(delegate.errors().len(), 1);
    assert!(!input.submit(CameraEvent::Trigger));
}

#[test]
fn slow_consumer_loses_oldest_audio() {
    let backend = MockAudioBackend::new();
    let delegate = RecordingDelegate::new();
    let config = MicrophoneConfig {
        bridge_capacity: BridgeCapacity::Bounded(2),
        ..Default::default()
    };
    let mic = Microphone::new(backend.clone(), config, delegate.clone()).unwrap();
    let mut rt = Runtime::new(mic, stepping());
    rt.start();
    rt.drain();

    for level in [0.1, 0.2, 0.3, 0.4, 0.5] {
        backend.emit(&[level; 4], 16000, 1);
    }
    rt.drain();

    assert_eq!(delegate.audio().len(), 2);
    assert_eq!(rt.stats().physical_dropped, 3);
}
