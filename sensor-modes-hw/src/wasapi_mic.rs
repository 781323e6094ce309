//! WASAPI microphone backend.
//!
//! Captures from a WASAPI capture endpoint in shared mode on a dedicated
//! thread and delivers interleaved f32 buffers of `buffer_size` frames via
//! the `AudioBufferCallback`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;
use windows::core::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;
use windows::Win32::System::Threading::*;

use sensor_modes_core::models::config::MicrophoneConfig;
use sensor_modes_core::models::error::DeviceError;
use sensor_modes_core::traits::audio_backend::{AudioBackend, AudioBufferCallback};
use sensor_modes_core::traits::session::Session;

use crate::device_enumerator::DeviceEnumerator;
use crate::permissions::check_microphone_permission;

/// Opens shared-mode capture streams on the default or an indexed endpoint.
#[derive(Debug, Default)]
pub struct WasapiMicBackend;

impl WasapiMicBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for WasapiMicBackend {
    type Stream = WasapiMicStream;

    fn open(
        &mut self,
        config: &MicrophoneConfig,
        callback: AudioBufferCallback,
    ) -> std::result::Result<WasapiMicStream, DeviceError> {
        if !check_microphone_permission()? {
            return Err(DeviceError::PermissionDenied);
        }

        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let params = CaptureParams {
            device_index: config.device_index,
            frames_per_buffer: config.buffer_size as usize,
            requested_rate: config.sample_rate,
        };

        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("wasapi-mic-capture".into())
            .spawn(move || {
                if let Err(e) = mic_capture_loop(&flag, params, callback, &ready_tx) {
                    log::error!("mic capture error: {}", e);
                    let _ = ready_tx.try_send(Err(e));
                }
                flag.store(false, Ordering::SeqCst);
            })
            .map_err(|e| DeviceError::Backend(format!("failed to spawn mic thread: {}", e)))?;

        let mut stream = WasapiMicStream {
            running,
            handle: Some(handle),
        };
        match ready_rx.recv() {
            Ok(Ok(())) => Ok(stream),
            Ok(Err(e)) => {
                stream.stop();
                Err(e)
            }
            Err(_) => {
                stream.stop();
                Err(DeviceError::Backend("mic thread exited before starting".into()))
            }
        }
    }

    fn describe(&self) -> String {
        "WASAPI microphone".into()
    }
}

/// A running capture thread. Closing stops and joins it.
pub struct WasapiMicStream {
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WasapiMicStream {
    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Session for WasapiMicStream {
    fn close(&mut self) -> std::result::Result<(), DeviceError> {
        self.stop();
        Ok(())
    }
}

impl Drop for WasapiMicStream {
    fn drop(&mut self) {
        self.stop();
    }
}

struct CaptureParams {
    device_index: Option<usize>,
    frames_per_buffer: usize,
    requested_rate: u32,
}

/// Capture loop on the dedicated thread.
///
/// Sequence:
/// 1. CoInitializeEx (MTA)
/// 2. Resolve the endpoint (default or by index)
/// 3. Activate IAudioClient and initialize in shared mode
/// 4. Register with MMCSS, start, report readiness
/// 5. Poll packets and re-chunk them to `frames_per_buffer`
fn mic_capture_loop(
    running: &AtomicBool,
    params: CaptureParams,
    callback: AudioBufferCallback,
    ready: &Sender<std::result::Result<(), DeviceError>>,
) -> std::result::Result<(), DeviceError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| DeviceError::Backend(format!("CoInitializeEx failed: {}", e)))?;

        let _com_guard = CoUninitializeGuard;

        let enumerator: IMMDeviceEnumerator =
            CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|_| DeviceError::DeviceNotAvailable)?;

        let device = match params.device_index {
            Some(index) => {
                let id = DeviceEnumerator::new()?.capture_device_id(index)?;
                let wide_id: Vec<u16> = id.encode_utf16().chain(std::iter::once(0)).collect();
                enumerator
                    .GetDevice(PCWSTR(wide_id.as_ptr()))
                    .map_err(|_| DeviceError::DeviceNotAvailable)?
            }
            None => enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .map_err(|_| DeviceError::DeviceNotAvailable)?,
        };

        let audio_client: IAudioClient = device
            .Activate(CLSCTX_ALL, None)
            .map_err(|e| DeviceError::cannot_open("microphone", format!("Activate failed: {}", e)))?;

        let mix_format_ptr = audio_client.GetMixFormat().map_err(|e| {
            DeviceError::ConfigurationFailed(format!("GetMixFormat failed: {}", e))
        })?;
        let mix_format = &*mix_format_ptr;
        let sample_rate = mix_format.nSamplesPerSec;
        let channels = mix_format.nChannels;

        if sample_rate != params.requested_rate {
            log::warn!(
                "microphone runs at {} Hz (requested {} Hz); buffers carry the device rate",
                sample_rate,
                params.requested_rate
            );
        }

        // 100 ms in 100-nanosecond units
        let buffer_duration = 1_000_000;

        let initialized = audio_client.Initialize(
            AUDCLNT_SHAREMODE_SHARED,
            AUDCLNT_STREAMFLAGS_NOPERSIST,
            buffer_duration,
            0,
            mix_format,
            None,
        );
        if let Err(e) = initialized {
            CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));
            return Err(DeviceError::ConfigurationFailed(format!(
                "IAudioClient::Initialize failed: {}",
                e
            )));
        }
        CoTaskMemFree(Some(mix_format_ptr as *const _ as *const _));

        let capture_client: IAudioCaptureClient = audio_client
            .GetService()
            .map_err(|e| DeviceError::ConfigurationFailed(format!("GetService failed: {}", e)))?;

        let mut task_index: u32 = 0;
        let task_name: Vec<u16> = "Pro Audio\0".encode_utf16().collect();
        let _mmcss_handle = AvSetMmThreadCharacteristicsW(PCWSTR(task_name.as_ptr()), &mut task_index);

        audio_client
            .Start()
            .map_err(|e| DeviceError::cannot_open("microphone", format!("Start failed: {}", e)))?;
        let _ = ready.try_send(Ok(()));

        let chunk = params.frames_per_buffer * channels as usize;
        let mut pending: Vec<f32> = Vec::with_capacity(chunk * 2);

        while running.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));

            let mut packet_length = capture_client
                .GetNextPacketSize()
                .map_err(|e| DeviceError::Backend(format!("GetNextPacketSize failed: {}", e)))?;

            while packet_length > 0 {
                let mut buffer_ptr: *mut u8 = std::ptr::null_mut();
                let mut num_frames: u32 = 0;
                let mut flags: u32 = 0;

                capture_client
                    .GetBuffer(&mut buffer_ptr, &mut num_frames, &mut flags, None, None)
                    .map_err(|e| DeviceError::Backend(format!("GetBuffer failed: {}", e)))?;

                if num_frames > 0 && !buffer_ptr.is_null() {
                    let total_samples = num_frames as usize * channels as usize;
                    if flags & (AUDCLNT_BUFFERFLAGS_SILENT.0 as u32) != 0 {
                        pending.resize(pending.len() + total_samples, 0.0);
                    } else {
                        // Shared mode delivers f32.
                        let samples = std::slice::from_raw_parts(buffer_ptr as *const f32, total_samples);
                        pending.extend_from_slice(samples);
                    }
                }

                capture_client
                    .ReleaseBuffer(num_frames)
                    .map_err(|e| DeviceError::Backend(format!("ReleaseBuffer failed: {}", e)))?;

                while pending.len() >= chunk {
                    callback(&pending[..chunk], sample_rate, channels);
                    pending.drain(..chunk);
                }

                packet_length = capture_client
                    .GetNextPacketSize()
                    .map_err(|e| DeviceError::Backend(format!("GetNextPacketSize failed: {}", e)))?;
            }
        }

        let _ = audio_client.Stop();
    }

    Ok(())
}

/// Calls CoUninitialize when dropped.
struct CoUninitializeGuard;

impl Drop for CoUninitializeGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}
