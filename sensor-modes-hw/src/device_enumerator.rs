//! Capture endpoint enumeration via the MMDevice API.
//!
//! `MicrophoneConfig::device_index` indexes into
//! [`DeviceEnumerator::list_capture_devices`].

use windows::Win32::Devices::FunctionDiscovery::*;
use windows::Win32::Media::Audio::*;
use windows::Win32::System::Com::StructuredStorage::PropVariantClear;
use windows::Win32::System::Com::*;
use windows::Win32::System::Variant::*;

use sensor_modes_core::models::error::DeviceError;

/// An active capture endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub struct DeviceEnumerator {
    enumerator: IMMDeviceEnumerator,
}

impl DeviceEnumerator {
    /// Requires COM to be initialized on the calling thread.
    pub fn new() -> Result<Self, DeviceError> {
        unsafe {
            let enumerator: IMMDeviceEnumerator =
                CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL).map_err(|e| {
                    DeviceError::Backend(format!("failed to create enumerator: {}", e))
                })?;
            Ok(Self { enumerator })
        }
    }

    /// Active capture endpoints, in MMDevice enumeration order.
    pub fn list_capture_devices(&self) -> Result<Vec<CaptureDevice>, DeviceError> {
        unsafe {
            let collection = self
                .enumerator
                .EnumAudioEndpoints(eCapture, DEVICE_STATE_ACTIVE)
                .map_err(|e| DeviceError::Backend(format!("EnumAudioEndpoints failed: {}", e)))?;

            let count = collection
                .GetCount()
                .map_err(|e| DeviceError::Backend(format!("GetCount failed: {}", e)))?;

            let default_id = self.default_capture_device_id().ok();

            let mut devices = Vec::new();
            for i in 0..count {
                let Ok(device) = collection.Item(i) else {
                    continue;
                };
                let id = match device.GetId() {
                    Ok(id) => id.to_string().unwrap_or_default(),
                    Err(_) => continue,
                };
                let name = friendly_name(&device).unwrap_or_else(|| format!("Microphone {}", i));
                let is_default = default_id.as_deref() == Some(id.as_str());
                devices.push(CaptureDevice {
                    id,
                    name,
                    is_default,
                });
            }
            Ok(devices)
        }
    }

    pub fn default_capture_device_id(&self) -> Result<String, DeviceError> {
        unsafe {
            let device = self
                .enumerator
                .GetDefaultAudioEndpoint(eCapture, eConsole)
                .map_err(|_| DeviceError::DeviceNotAvailable)?;

            let id = device
                .GetId()
                .map_err(|e| DeviceError::Backend(format!("GetId failed: {}", e)))?;

            Ok(id.to_string().unwrap_or_default())
        }
    }

    /// Endpoint id for a configured device index.
    pub fn capture_device_id(&self, index: usize) -> Result<String, DeviceError> {
        let devices = self.list_capture_devices()?;
        devices
            .into_iter()
            .nth(index)
            .map(|device| device.id)
            .ok_or_else(|| {
                DeviceError::cannot_open(
                    format!("microphone {}", index),
                    "no capture endpoint at this index",
                )
            })
    }
}

/// Read `PKEY_Device_FriendlyName` from the device's property store.
fn friendly_name(device: &IMMDevice) -> Option<String> {
    unsafe {
        let store = device.OpenPropertyStore(STGM_READ).ok()?;

        let mut prop = std::mem::zeroed::<PROPVARIANT>();
        store.GetValue(&PKEY_Device_FriendlyName, &mut prop).ok()?;

        let name = if prop.Anonymous.Anonymous.vt == VT_LPWSTR {
            let pwsz = prop.Anonymous.Anonymous.Anonymous.pwszVal;
            if pwsz.is_null() {
                None
            } else {
                let len = (0..).take_while(|&i| *pwsz.offset(i) != 0).count();
                Some(String::from_utf16_lossy(std::slice::from_raw_parts(pwsz, len)))
            }
        } else {
            None
        };

        PropVariantClear(&mut prop).ok();
        name
    }
}
