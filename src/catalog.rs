//! Camera device catalog.
//!
//! Holds the page-wide list of video inputs and which one is selected. The catalog is shared
//! between camera sessions and the controller as a `SharedCatalog`; only `enumerate()` and a
//! session's camera switch (`advance()`) mutate it.

use anyhow::Result;
use std::sync::{Arc, Mutex};

use crate::platform::{DeviceKind, MediaDevices};

/// Label fragments that mark a rear-facing camera.
const REAR_HINTS: [&str; 3] = ["back", "rear", "environment"];

pub type SharedCatalog = Arc<Mutex<DeviceCatalog>>;

/// A video input as reported by the platform. Never mutated by the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoDevice {
    pub id: String,
    pub label: String,
}

impl VideoDevice {
    /// True when the label names a back, rear or environment-facing camera.
    pub fn is_rear_facing(&self) -> bool {
        let label = self.label.to_lowercase();
        REAR_HINTS.iter().any(|hint| label.contains(hint))
    }
}

/// What the controller needs to render the camera controls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogSummary {
    pub device_count: usize,
    pub selected_index: usize,
    pub selected_label: Option<String>,
    /// False when fewer than two cameras exist; the switch control should be hidden.
    pub can_switch: bool,
}

#[derive(Clone, Debug, Default)]
pub struct DeviceCatalog {
    devices: Vec<VideoDevice>,
    selected_index: usize,
    populated: bool,
}

impl DeviceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCatalog {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Build a catalog from an already known device list.
    pub fn from_devices(devices: Vec<VideoDevice>) -> Self {
        let mut catalog = Self::new();
        catalog.replace(devices);
        catalog
    }

    /// Query the platform and replace the device list with a fresh snapshot.
    ///
    /// Safe to call repeatedly. The selection is re-evaluated on every call: the first
    /// rear-facing camera if any, otherwise index 0. Returns the number of video inputs.
    pub fn enumerate(&mut self, platform: &dyn MediaDevices) -> Result<usize> {
        self.enumerate_keeping(platform, None)
    }

    /// Like `enumerate()`, but when `keep_id` is still listed the selection stays on it.
    ///
    /// Used while a stream is live, so the selection keeps naming the streaming device.
    pub fn enumerate_keeping(
        &mut self,
        platform: &dyn MediaDevices,
        keep_id: Option<&str>,
    ) -> Result<usize> {
        let devices = platform
            .enumerate_devices()?
            .into_iter()
            .filter(|d| d.kind == DeviceKind::VideoInput)
            .map(|d| VideoDevice {
                id: d.device_id,
                label: d.label,
            })
            .collect();
        self.replace(devices);
        if let Some(id) = keep_id {
            self.select(id);
        }
        log::info!(
            "DeviceCatalog: {} video input(s) on {}, selected index {}",
            self.devices.len(),
            platform.name(),
            self.selected_index
        );
        Ok(self.devices.len())
    }

    fn replace(&mut self, devices: Vec<VideoDevice>) {
        self.selected_index = devices
            .iter()
            .position(VideoDevice::is_rear_facing)
            .unwrap_or(0);
        self.devices = devices;
        self.populated = true;
    }

    /// True once `enumerate()` has completed at least once.
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    pub fn devices(&self) -> &[VideoDevice] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected(&self) -> Option<&VideoDevice> {
        self.devices.get(self.selected_index)
    }

    pub fn can_switch(&self) -> bool {
        self.devices.len() >= 2
    }

    /// Select the device with `id`. Returns false, leaving the selection alone, when it is
    /// not listed.
    pub fn select(&mut self, id: &str) -> bool {
        match self.devices.iter().position(|d| d.id == id) {
            Some(index) => {
                self.selected_index = index;
                true
            }
            None => false,
        }
    }

    /// Move the selection to the next device, wrapping around. No-op when empty.
    pub fn advance(&mut self) -> usize {
        if !self.devices.is_empty() {
            self.selected_index = (self.selected_index + 1) % self.devices.len();
        }
        self.selected_index
    }

    pub fn summary(&self) -> CatalogSummary {
        CatalogSummary {
            device_count: self.devices.len(),
            selected_index: self.selected_index,
            selected_label: self.selected().map(|d| d.label.clone()),
            can_switch: self.can_switch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{SyntheticCamera, SyntheticDevices};

    fn device(id: &str, label: &str) -> VideoDevice {
        VideoDevice {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    #[test]
    fn prefers_back_camera() {
        let catalog = DeviceCatalog::from_devices(vec![
            device("a", "Front"),
            device("b", "Back Camera"),
        ]);
        assert_eq!(catalog.selected_index(), 1);
        assert!(catalog.can_switch());
    }

    #[test]
    fn rear_and_environment_labels_match_case_insensitively() {
        let catalog = DeviceCatalog::from_devices(vec![
            device("a", "FaceTime HD"),
            device("b", "USB REAR cam"),
        ]);
        assert_eq!(catalog.selected_index(), 1);

        let catalog = DeviceCatalog::from_devices(vec![
            device("a", "camera2 0, facing front"),
            device("b", "camera2 1, facing Environment"),
            device("c", "back wide"),
        ]);
        assert_eq!(catalog.selected_index(), 1);
    }

    #[test]
    fn defaults_to_first_device() {
        let catalog = DeviceCatalog::from_devices(vec![device("a", "Front"), device("b", "USB")]);
        assert_eq!(catalog.selected_index(), 0);
    }

    #[test]
    fn single_device_cannot_switch() {
        let mut catalog = DeviceCatalog::from_devices(vec![device("a", "Front")]);
        let summary = catalog.summary();
        assert_eq!(summary.device_count, 1);
        assert!(!summary.can_switch);
        assert_eq!(catalog.advance(), 0);
    }

    #[test]
    fn advance_wraps_around() {
        let mut catalog = DeviceCatalog::from_devices(vec![
            device("a", "Front"),
            device("b", "Back"),
            device("c", "USB"),
        ]);
        assert_eq!(catalog.advance(), 2);
        assert_eq!(catalog.advance(), 0);
    }

    #[test]
    fn empty_catalog_has_no_selection() {
        let mut catalog = DeviceCatalog::new();
        assert!(!catalog.is_populated());
        assert!(catalog.selected().is_none());
        assert_eq!(catalog.advance(), 0);
        assert_eq!(catalog.summary().selected_label, None);
    }

    #[test]
    fn enumerate_filters_video_inputs_and_refreshes() -> Result<()> {
        let platform = SyntheticDevices::new(vec![
            SyntheticCamera::new("a", "Front"),
            SyntheticCamera::new("b", "Back Camera"),
        ]);
        let mut catalog = DeviceCatalog::new();
        assert_eq!(catalog.enumerate(&platform)?, 2);
        assert!(catalog.is_populated());
        assert_eq!(catalog.selected().map(|d| d.id.as_str()), Some("b"));

        platform.set_cameras(vec![SyntheticCamera::new("a", "Front")]);
        assert_eq!(catalog.enumerate(&platform)?, 1);
        assert_eq!(catalog.selected_index(), 0);
        assert!(!catalog.can_switch());
        Ok(())
    }

    #[test]
    fn enumerate_keeping_holds_selection_on_listed_device() -> Result<()> {
        let platform = SyntheticDevices::new(vec![SyntheticCamera::new("a", "Front")]);
        let mut catalog = DeviceCatalog::new();
        catalog.enumerate(&platform)?;

        platform.set_cameras(vec![
            SyntheticCamera::new("a", "Front"),
            SyntheticCamera::new("b", "USB Rear Camera"),
        ]);
        catalog.enumerate_keeping(&platform, Some("a"))?;
        assert_eq!(catalog.selected().map(|d| d.id.as_str()), Some("a"));

        // A device that went away falls back to the rear preference.
        platform.set_cameras(vec![
            SyntheticCamera::new("c", "Front"),
            SyntheticCamera::new("b", "USB Rear Camera"),
        ]);
        catalog.enumerate_keeping(&platform, Some("a"))?;
        assert_eq!(catalog.selected().map(|d| d.id.as_str()), Some("b"));
        Ok(())
    }

    #[test]
    fn select_ignores_unknown_ids() {
        let mut catalog =
            DeviceCatalog::from_devices(vec![device("a", "Front"), device("b", "Back")]);
        assert!(catalog.select("a"));
        assert_eq!(catalog.selected_index(), 0);
        assert!(!catalog.select("zzz"));
        assert_eq!(catalog.selected_index(), 0);
    }
}
