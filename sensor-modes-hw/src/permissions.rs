//! Windows microphone privacy check.
//!
//! Microphone access is governed by Settings > Privacy > Microphone. Unpackaged
//! desktop apps get no consent prompt; a disabled toggle surfaces as an
//! access-denied activation.

use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::*;

use sensor_modes_core::models::error::DeviceError;

const E_ACCESSDENIED: i32 = -2147024891;
const AUDCLNT_E_DEVICE_IN_USE: i32 = -2004287478;

/// Whether the default capture endpoint can be activated.
///
/// Returns `Ok(false)` when there is no capture device or access is denied.
pub fn check_microphone_permission() -> Result<bool, DeviceError> {
    unsafe {
        CoInitializeEx(None, COINIT_MULTITHREADED)
            .ok()
            .map_err(|e| DeviceError::Backend(format!("CoInitializeEx failed: {}", e)))?;

        let result = check_mic_access_inner();

        CoUninitialize();
        result
    }
}

unsafe fn check_mic_access_inner() -> Result<bool, DeviceError> {
    let enumerator: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
        .map_err(|e| DeviceError::Backend(format!("failed to create enumerator: {}", e)))?;

    let Ok(device) = enumerator.GetDefaultAudioEndpoint(eCapture, eConsole) else {
        return Ok(false);
    };

    let activated: windows::core::Result<IAudioClient> = device.Activate(CLSCTX_ALL, None);
    match activated {
        Ok(_) => Ok(true),
        Err(e) => {
            let code = e.code().0;
            if code == E_ACCESSDENIED || code == AUDCLNT_E_DEVICE_IN_USE {
                Ok(false)
            } else {
                log::warn!("unexpected error checking microphone permission: {}", e);
                Ok(true)
            }
        }
    }
}
