use ab_core::config::{DeviceStrategy, PipelineConfig};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::AudioError;

/// Name fragments of inputs that carry what the system is playing, best first.
///
/// The last two only exist as inputs on drivers that expose output monitoring.
pub const LOOPBACK_PRIORITY: &[&str] = &[
    "stereo mix",
    "loopback",
    "what u hear",
    "monitor",
    "speakers",
    "headphones",
];

/// An input device as seen by selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Position in the host's input enumeration.
    pub index: usize,
    /// Name reported by the host.
    pub name: String,
    /// Highest channel count among supported input configs (0 if none).
    pub max_input_channels: u16,
    /// Host default input.
    pub is_default: bool,
}

impl DeviceInfo {
    /// `true` if the name looks like a loopback / stereo-mix input.
    #[must_use]
    pub fn is_loopback(&self) -> bool {
        is_loopback_name(&self.name)
    }

    /// `true` if the device can capture at all.
    #[must_use]
    pub fn has_input(&self) -> bool {
        self.max_input_channels > 0
    }
}

/// `true` if `name` contains one of the dedicated loopback fragments.
///
/// "speakers" and "headphones" are tried by [`LoopbackHeuristic`] but are not
/// loopback names on their own.
///
/// # Example
/// ```
/// use ab_audio::device::is_loopback_name;
/// assert!(is_loopback_name("Stereo Mix (Realtek Audio)"));
/// assert!(is_loopback_name("Monitor of Built-in Audio"));
/// assert!(!is_loopback_name("USB Microphone"));
/// ```
#[must_use]
pub fn is_loopback_name(name: &str) -> bool {
    let lower = name.to_lowercase();
    LOOPBACK_PRIORITY[..4].iter().any(|p| lower.contains(p))
}

/// Strategy choosing one device out of the enumerated inputs.
///
/// Returns a position in `devices`, or `None` when nothing fits.
pub trait DeviceSelector: Send {
    /// Pick a device.
    fn select(&self, devices: &[DeviceInfo]) -> Option<usize>;

    /// Label used in logs.
    fn describe(&self) -> String;
}

/// Host default input.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultDevice;

impl DeviceSelector for DefaultDevice {
    fn select(&self, devices: &[DeviceInfo]) -> Option<usize> {
        devices
            .iter()
            .position(|d| d.is_default && d.has_input())
            .or_else(|| devices.iter().position(DeviceInfo::has_input))
    }

    fn describe(&self) -> String {
        "périphérique par défaut".to_string()
    }
}

/// First input whose name contains the given text (case-insensitive).
#[derive(Clone, Debug)]
pub struct ByName(pub String);

impl DeviceSelector for ByName {
    fn select(&self, devices: &[DeviceInfo]) -> Option<usize> {
        let wanted = self.0.to_lowercase();
        devices
            .iter()
            .position(|d| d.has_input() && d.name.to_lowercase().contains(&wanted))
    }

    fn describe(&self) -> String {
        format!("nom contenant \"{}\"", self.0)
    }
}

/// Device at a given enumeration index.
#[derive(Clone, Copy, Debug)]
pub struct ByIndex(pub usize);

impl DeviceSelector for ByIndex {
    fn select(&self, devices: &[DeviceInfo]) -> Option<usize> {
        devices
            .iter()
            .position(|d| d.index == self.0 && d.has_input())
    }

    fn describe(&self) -> String {
        format!("index {}", self.0)
    }
}

/// Walks [`LOOPBACK_PRIORITY`], then falls back to the default input.
///
/// # Example
/// ```
/// use ab_audio::device::{DeviceInfo, DeviceSelector, LoopbackHeuristic};
///
/// let devices = vec![
///     DeviceInfo { index: 0, name: "Microphone".into(), max_input_channels: 1, is_default: true },
///     DeviceInfo { index: 1, name: "Stereo Mix".into(), max_input_channels: 2, is_default: false },
/// ];
/// assert_eq!(LoopbackHeuristic.select(&devices), Some(1));
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopbackHeuristic;

impl DeviceSelector for LoopbackHeuristic {
    fn select(&self, devices: &[DeviceInfo]) -> Option<usize> {
        for fragment in LOOPBACK_PRIORITY {
            let hit = devices
                .iter()
                .position(|d| d.has_input() && d.name.to_lowercase().contains(fragment));
            if hit.is_some() {
                return hit;
            }
        }
        DefaultDevice.select(devices)
    }

    fn describe(&self) -> String {
        "détection loopback".to_string()
    }
}

/// Selector matching the configuration: index, then name, then strategy.
#[must_use]
pub fn selector_for(config: &PipelineConfig) -> Box<dyn DeviceSelector> {
    if let Some(index) = config.device_index {
        return Box::new(ByIndex(index));
    }
    if let Some(name) = &config.device {
        return Box::new(ByName(name.clone()));
    }
    match config.device_strategy {
        DeviceStrategy::Default => Box::new(DefaultDevice),
        DeviceStrategy::Loopback => Box::new(LoopbackHeuristic),
    }
}

/// Enumerate the host's input devices.
///
/// Devices whose name cannot be read are listed as `"?"`.
///
/// # Errors
/// Returns [`AudioError::SourceUnavailable`] if the host cannot enumerate inputs.
pub fn list_devices() -> Result<Vec<DeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let devices = host
        .input_devices()
        .map_err(|e| AudioError::SourceUnavailable(format!("énumération impossible : {e}")))?;

    Ok(devices
        .enumerate()
        .map(|(index, dev)| {
            let name = dev.name().unwrap_or_else(|_| "?".to_string());
            let max_input_channels = dev
                .supported_input_configs()
                .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0))
                .unwrap_or(0);
            DeviceInfo {
                index,
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                max_input_channels,
            }
        })
        .collect())
}

/// Resolve `selector` against the host and open the chosen device.
///
/// # Errors
/// Returns [`AudioError::SourceUnavailable`] if nothing matches or the device vanished.
pub(crate) fn open_device(
    selector: &dyn DeviceSelector,
) -> Result<(cpal::Device, DeviceInfo), AudioError> {
    let infos = list_devices()?;
    let chosen = selector.select(&infos).ok_or_else(|| {
        AudioError::SourceUnavailable(format!(
            "aucune entrée pour « {} » ({} périphériques)",
            selector.describe(),
            infos.len()
        ))
    })?;
    let info = infos[chosen].clone();

    let host = cpal::default_host();
    let device = host
        .input_devices()
        .map_err(|e| AudioError::SourceUnavailable(format!("énumération impossible : {e}")))?
        .nth(info.index)
        .ok_or_else(|| AudioError::SourceUnavailable(format!("{} a disparu", info.name)))?;

    log::info!("Entrée audio : {} ({})", info.name, selector.describe());
    Ok((device, info))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(index: usize, name: &str, channels: u16, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            index,
            name: name.to_string(),
            max_input_channels: channels,
            is_default,
        }
    }

    fn windows_like() -> Vec<DeviceInfo> {
        vec![
            dev(0, "Microphone (USB Audio)", 1, true),
            dev(1, "Speakers (Realtek)", 0, false),
            dev(2, "Headphones (Realtek)", 2, false),
            dev(3, "Stereo Mix (Realtek)", 2, false),
        ]
    }

    #[test]
    fn loopback_prefers_stereo_mix() {
        assert_eq!(LoopbackHeuristic.select(&windows_like()), Some(3));
    }

    #[test]
    fn loopback_skips_output_only_matches() {
        let devices = vec![
            dev(0, "Microphone", 1, true),
            dev(1, "Speakers", 0, false),
            dev(2, "Headphones", 2, false),
        ];
        assert_eq!(LoopbackHeuristic.select(&devices), Some(2));
    }

    #[test]
    fn loopback_falls_back_to_default() {
        let devices = vec![dev(0, "Line In", 2, false), dev(1, "Microphone", 1, true)];
        assert_eq!(LoopbackHeuristic.select(&devices), Some(1));
    }

    #[test]
    fn pulse_monitor_counts_as_loopback() {
        let devices = vec![
            dev(0, "Built-in Audio Analog Stereo", 2, true),
            dev(1, "Monitor of Built-in Audio Analog Stereo", 2, false),
        ];
        assert_eq!(LoopbackHeuristic.select(&devices), Some(1));
        assert!(devices[1].is_loopback());
        assert!(!devices[0].is_loopback());
    }

    #[test]
    fn nothing_to_capture_from() {
        let devices = vec![dev(0, "Speakers", 0, true)];
        assert_eq!(LoopbackHeuristic.select(&devices), None);
        assert_eq!(DefaultDevice.select(&[]), None);
    }

    #[test]
    fn by_name_is_case_insensitive_substring() {
        assert_eq!(ByName("usb".into()).select(&windows_like()), Some(0));
        assert_eq!(ByName("nope".into()).select(&windows_like()), None);
    }

    #[test]
    fn by_index_requires_input() {
        assert_eq!(ByIndex(2).select(&windows_like()), Some(2));
        assert_eq!(ByIndex(1).select(&windows_like()), None);
        assert_eq!(ByIndex(9).select(&windows_like()), None);
    }

    #[test]
    fn config_picks_selector() {
        let mut config = PipelineConfig::default();
        assert_eq!(selector_for(&config).select(&windows_like()), Some(3));

        config.device_strategy = DeviceStrategy::Default;
        assert_eq!(selector_for(&config).select(&windows_like()), Some(0));

        config.device = Some("headphones".into());
        assert_eq!(selector_for(&config).select(&windows_like()), Some(2));

        config.device_index = Some(3);
        assert_eq!(selector_for(&config).select(&windows_like()), Some(3));
    }
}
