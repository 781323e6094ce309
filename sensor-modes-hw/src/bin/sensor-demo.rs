//! Demo host: runs the configured devices and maps stdin lines to inputs.
//!
//! ```text
//! sensor-demo [config.json]
//!   on | off            microphone TurnOn / TurnOff
//!   trigger | low_power camera Trigger / LowPower
//!   quit                stop every runtime
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::io::BufRead;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use serde::Deserialize;
use thiserror::Error;

use sensor_modes_core::models::config::load_json;
use sensor_modes_core::{
    AudioBackend, Camera, CameraConfig, CameraEvent, DeviceError, LoggingDelegate, Microphone,
    MicrophoneConfig, MicrophoneEvent, PhysicalAction, Reactor, Runtime, RuntimeConfig,
    RuntimeError, RuntimeHandle, VideoBackend,
};

#[derive(Debug, Error)]
enum DemoError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error("{0} runtime thread panicked")]
    Panicked(String),
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemoConfig {
    runtime: RuntimeConfig,
    microphone: Option<MicrophoneConfig>,
    camera: Option<CameraConfig>,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            microphone: Some(MicrophoneConfig::default()),
            camera: Some(CameraConfig::default()),
        }
    }
}

/// Final result of one device runtime, sent when its thread finishes.
type Exit = (String, Result<(), RuntimeError>);

/// A device runtime running on its own thread.
struct Running<E> {
    name: String,
    input: PhysicalAction<E>,
    handle: RuntimeHandle<E>,
    thread: thread::JoinHandle<()>,
}

fn spawn<R>(
    reactor: R,
    config: RuntimeConfig,
    exits: &Sender<Exit>,
) -> Result<Running<R::Event>, DemoError>
where
    R: Reactor + Send + 'static,
{
    let name = reactor.name().to_string();
    let mut runtime = Runtime::new(reactor, config);
    let input = runtime.input();
    let handle = runtime.handle();
    let exits = exits.clone();
    let exit_name = name.clone();
    let thread = thread::Builder::new()
        .name(format!("{}-runtime", name))
        .spawn(move || {
            let result = runtime.run();
            let _ = exits.send((exit_name, result));
        })
        .map_err(|e| DeviceError::Backend(format!("failed to spawn runtime thread: {}", e)))?;
    Ok(Running {
        name,
        input,
        handle,
        thread,
    })
}

/// The device runtimes started from one `DemoConfig`.
struct Devices {
    mic: Option<Running<MicrophoneEvent>>,
    camera: Option<Running<CameraEvent>>,
}

impl Devices {
    fn count(&self) -> usize {
        usize::from(self.mic.is_some()) + usize::from(self.camera.is_some())
    }

    fn stop_all(&self) {
        if let Some(mic) = &self.mic {
            mic.handle.request_stop();
        }
        if let Some(camera) = &self.camera {
            camera.handle.request_stop();
        }
    }

    fn join(self) -> Result<(), DemoError> {
        let mut result = Ok(());
        if let Some(mic) = self.mic {
            result = result.and(join(mic.name, mic.thread));
        }
        if let Some(camera) = self.camera {
            result = result.and(join(camera.name, camera.thread));
        }
        result
    }
}

fn join(name: String, thread: thread::JoinHandle<()>) -> Result<(), DemoError> {
    thread.join().map_err(|_| DemoError::Panicked(name))
}

/// Start a runtime thread for every configured device.
fn launch<A, V>(
    config: DemoConfig,
    mic_backend: impl FnOnce(&MicrophoneConfig) -> A,
    camera_backend: V,
    exits: &Sender<Exit>,
) -> Result<Devices, DemoError>
where
    A: AudioBackend + 'static,
    V: VideoBackend + 'static,
{
    let mic = match config.microphone {
        Some(mic_config) => {
            let backend = mic_backend(&mic_config);
            log::info!("microphone backend: {}", backend.describe());
            let mic = Microphone::new(backend, mic_config, Arc::new(LoggingDelegate))?;
            Some(spawn(mic, config.runtime.clone(), exits)?)
        }
        None => None,
    };
    let camera = match config.camera {
        Some(camera_config) => {
            log::info!("camera backend: {}", camera_backend.describe());
            let camera = Camera::new(camera_backend, camera_config, Arc::new(LoggingDelegate))?;
            Some(spawn(camera, config.runtime.clone(), exits)?)
        }
        None => None,
    };
    Ok(Devices { mic, camera })
}

/// Wait for every runtime to finish. A halted runtime stops all the others,
/// and its error becomes the result.
fn supervise(devices: Devices, exits: Receiver<Exit>) -> Result<(), DemoError> {
    let mut outcome = Ok(());
    for _ in 0..devices.count() {
        let Ok((name, result)) = exits.recv() else {
            break;
        };
        match result {
            Ok(()) => log::info!("{} stopped", name),
            Err(e) => {
                log::error!("{} halted, stopping all devices", name);
                devices.stop_all();
                if outcome.is_ok() {
                    outcome = Err(DemoError::Runtime(e));
                }
            }
        }
    }
    let joined = devices.join();
    outcome.and(joined)
}

#[cfg(target_os = "windows")]
fn microphone_backend(_config: &MicrophoneConfig) -> sensor_modes_hw::WasapiMicBackend {
    sensor_modes_hw::WasapiMicBackend::new()
}

#[cfg(not(target_os = "windows"))]
fn microphone_backend(config: &MicrophoneConfig) -> sensor_modes_core::mock::MockAudioBackend {
    let period = std::time::Duration::from_secs_f64(
        f64::from(config.buffer_size) / f64::from(config.sample_rate),
    );
    sensor_modes_core::mock::MockAudioBackend::with_generator(period)
}

#[cfg(feature = "opencv")]
fn camera_backend() -> sensor_modes_hw::OpenCvCameraBackend {
    sensor_modes_hw::OpenCvCameraBackend::new()
}

#[cfg(not(feature = "opencv"))]
fn camera_backend() -> sensor_modes_core::mock::MockVideoBackend {
    sensor_modes_core::mock::MockVideoBackend::new()
}

fn control_loop(
    mic: Option<(PhysicalAction<MicrophoneEvent>, RuntimeHandle<MicrophoneEvent>)>,
    camera: Option<(PhysicalAction<CameraEvent>, RuntimeHandle<CameraEvent>)>,
) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let accepted = match line.trim() {
            "" => continue,
            "on" => mic.as_ref().map(|(input, _)| input.submit(MicrophoneEvent::TurnOn)),
            "off" => mic.as_ref().map(|(input, _)| input.submit(MicrophoneEvent::TurnOff)),
            "trigger" => camera.as_ref().map(|(input, _)| input.submit(CameraEvent::Trigger)),
            "low_power" => camera.as_ref().map(|(input, _)| input.submit(CameraEvent::LowPower)),
            "quit" => break,
            other => {
                log::warn!("unknown command: {}", other);
                continue;
            }
        };
        match accepted {
            None => log::warn!("no device for command {:?}", line.trim()),
            Some(false) => log::warn!("device already stopped"),
            Some(true) => {}
        }
    }

    if let Some((_, handle)) = &mic {
        handle.request_stop();
    }
    if let Some((_, handle)) = &camera {
        handle.request_stop();
    }
}

fn run() -> Result<(), DemoError> {
    let config: DemoConfig = match std::env::args().nth(1) {
        Some(path) => load_json(Path::new(&path))?,
        None => DemoConfig::default(),
    };

    let (exits_tx, exits_rx) = crossbeam_channel::unbounded();
    let devices = launch(config, microphone_backend, camera_backend(), &exits_tx)?;
    drop(exits_tx);

    let mic_control = devices.mic.as_ref().map(|r| (r.input.clone(), r.handle.clone()));
    let camera_control = devices.camera.as_ref().map(|r| (r.input.clone(), r.handle.clone()));
    // Never joined: a blocked stdin read must not keep the process alive.
    thread::spawn(move || control_loop(mic_control, camera_control));

    supervise(devices, exits_rx)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sensor_modes_core::mock::{MockAudioBackend, MockVideoBackend};
    use sensor_modes_core::CameraMode;

    use super::*;

    fn keepalive() -> RuntimeConfig {
        RuntimeConfig {
            fast: true,
            keepalive: true,
            timeout_ms: None,
        }
    }

    fn host(config: DemoConfig, camera: MockVideoBackend) -> Result<(), DemoError> {
        let (exits_tx, exits_rx) = crossbeam_channel::unbounded();
        let devices = launch(config, |_| MockAudioBackend::new(), camera, &exits_tx);
        drop(exits_tx);
        supervise(devices?, exits_rx)
    }

    #[test]
    fn camera_open_failure_stops_every_device() {
        let camera = MockVideoBackend::new();
        camera.fail_open(Some(DeviceError::cannot_open("camera 0", "unplugged")));
        let config = DemoConfig {
            runtime: keepalive(),
            microphone: Some(MicrophoneConfig::default()),
            camera: Some(CameraConfig {
                initial_mode: CameraMode::Active,
                ..Default::default()
            }),
        };

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        thread::spawn(move || {
            let _ = done_tx.send(host(config, camera));
        });

        let result = done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("microphone kept running after the camera halted");
        assert!(matches!(
            result,
            Err(DemoError::Runtime(RuntimeError::Halted { .. }))
        ));
    }

    #[test]
    fn demo_config_accepts_numeric_camera_mode() {
        let config: DemoConfig = sensor_modes_core::models::config::parse_json(
            r#"{"microphone": null, "camera": {"initial_mode": 1}}"#,
        )
        .unwrap();
        assert!(config.microphone.is_none());
        assert_eq!(
            config.camera.map(|camera| camera.initial_mode),
            Some(CameraMode::Active)
        );
    }
}
