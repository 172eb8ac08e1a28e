//! Capture handle acquisition.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::handle::CaptureHandle;
use crate::audio::monitor_source::{input_device_names, is_monitor_name};
use crate::error::CaptureError;

/// Issues single-use capture handles scoped to a target.
#[async_trait]
pub trait CaptureHandleProvider: Send + Sync {
    async fn acquire(&self, target_id: &str) -> Result<CaptureHandle, CaptureError>;
}

/// Pick the input device a target id refers to.
///
/// `""` and `"monitor"` select the first monitor source; anything else is a
/// case-insensitive substring of the device name, preferring monitors.
pub fn resolve_target(target_id: &str, device_names: &[String]) -> Option<String> {
    let needle = target_id.trim().to_lowercase();

    if needle.is_empty() || needle == "monitor" {
        return device_names.iter().find(|n| is_monitor_name(n)).cloned();
    }

    let mut matches = device_names
        .iter()
        .filter(|name| name.to_lowercase().contains(&needle));
    let first = matches.next()?;
    if is_monitor_name(first) {
        return Some(first.clone());
    }
    matches
        .find(|name| is_monitor_name(name))
        .or(Some(first))
        .cloned()
}

/// Resolves targets against the host's cpal input devices.
pub struct DeviceHandleProvider {
    ttl: Duration,
}

impl DeviceHandleProvider {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

#[async_trait]
impl CaptureHandleProvider for DeviceHandleProvider {
    async fn acquire(&self, target_id: &str) -> Result<CaptureHandle, CaptureError> {
        let names = tokio::task::spawn_blocking(input_device_names)
            .await
            .map_err(|e| CaptureError::Provisioning(format!("device enumeration panicked: {e}")))?
            .map_err(|e| CaptureError::Provisioning(format!("{e:#}")))?;

        debug!("Input devices: {:?}", names);

        let device_name = resolve_target(target_id, &names).ok_or_else(|| {
            CaptureError::Provisioning(format!("no capture source matches target {target_id:?}"))
        })?;

        info!("Capture target {:?} resolved to {:?}", target_id, device_name);
        Ok(CaptureHandle::issue(target_id, device_name, self.ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn devices() -> Vec<String> {
        vec![
            "Built-in Microphone".to_string(),
            "Monitor of Built-in Speakers".to_string(),
            "USB Headset".to_string(),
            "Monitor of USB Headset".to_string(),
        ]
    }

    #[test]
    fn test_default_target_picks_first_monitor() {
        assert_eq!(
            resolve_target("monitor", &devices()),
            Some("Monitor of Built-in Speakers".to_string())
        );
        assert_eq!(
            resolve_target("", &devices()),
            Some("Monitor of Built-in Speakers".to_string())
        );
    }

    #[test]
    fn test_named_target_prefers_monitor() {
        assert_eq!(
            resolve_target("usb headset", &devices()),
            Some("Monitor of USB Headset".to_string())
        );
    }

    #[test]
    fn test_named_target_falls_back_to_plain_input() {
        assert_eq!(
            resolve_target("microphone", &devices()),
            Some("Built-in Microphone".to_string())
        );
    }

    #[test]
    fn test_unknown_target() {
        assert_eq!(resolve_target("zoom", &devices()), None);
        assert_eq!(resolve_target("monitor", &["Mic".to_string()]), None);
    }
}
