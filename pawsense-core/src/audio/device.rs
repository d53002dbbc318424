//! Input device enumeration and selection.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
}

/// Order devices for display: default first, then by case-insensitive name.
pub fn sort_devices(devices: &mut [DeviceInfo]) {
    devices.sort_by_key(|d| (!d.is_default, d.name.to_ascii_lowercase()));
}

/// Case-insensitive, whitespace-trimmed device name comparison.
pub fn device_name_matches(candidate: &str, preferred: &str) -> bool {
    candidate.trim().eq_ignore_ascii_case(preferred.trim())
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if enumeration fails and no default device exists.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut list = match host.input_devices() {
        Ok(devices) => devices
            .enumerate()
            .map(|(idx, device)| {
                let name = device
                    .name()
                    .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                let is_default = default_name.as_deref() == Some(name.as_str());
                DeviceInfo { name, is_default }
            })
            .collect::<Vec<_>>(),
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            default_name
                .map(|name| {
                    vec![DeviceInfo {
                        name,
                        is_default: true,
                    }]
                })
                .unwrap_or_default()
        }
    };
    sort_devices(&mut list);
    list
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

/// Resolve the device to capture from: the preferred name if present, else
/// the default input, else the first input the host reports.
#[cfg(feature = "audio-cpal")]
pub(crate) fn select_input_device(
    host: &cpal::Host,
    preferred: Option<&str>,
) -> crate::error::Result<cpal::Device> {
    use crate::error::PawsenseError;
    use cpal::traits::{DeviceTrait, HostTrait};
    use tracing::warn;

    if let Some(preferred) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(found) = devices.find(|d| {
                    d.name()
                        .map(|name| device_name_matches(&name, preferred))
                        .unwrap_or(false)
                }) {
                    return Ok(found);
                }
                warn!(
                    preferred,
                    "preferred input device not found, falling back to default"
                );
            }
            Err(e) => warn!("failed to list input devices while resolving preference: {e}"),
        }
    }

    if let Some(default) = host.default_input_device() {
        return Ok(default);
    }

    let mut devices = host
        .input_devices()
        .map_err(|e| PawsenseError::AudioDevice(e.to_string()))?;
    let fallback = devices.next().ok_or(PawsenseError::NoDefaultInputDevice)?;
    warn!("no default input device, falling back to first available input");
    Ok(fallback)
}
