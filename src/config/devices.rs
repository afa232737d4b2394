use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{AudioFormat, ModuleConfig};
use crate::core::StreamKind;

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Remembered settings for one physical device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceProfile {
    /// Hardware identifier reported by the device adapter
    pub id: String,

    /// User-friendly name
    pub alias: String,

    pub kind: StreamKind,
    pub record_rate_hz: Option<f64>,
    pub preview_rate_hz: Option<f64>,
    pub audio: Option<AudioFormat>,
    pub metadata: DeviceMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceMetadata {
    pub description: Option<String>,
    pub created_at: u64,  // Unix timestamp
    pub last_used_at: u64, // Unix timestamp
}

impl Default for DeviceMetadata {
    fn default() -> Self {
        let now = unix_now();
        Self {
            description: None,
            created_at: now,
            last_used_at: now,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KnownDevicesFile {
    version: String,
    devices: BTreeMap<String, DeviceProfile>,
}

/// Persistent cache of known devices.
///
/// An explicit object owned by the caller: nothing is loaded or saved behind
/// its back, and two stores on different paths never interact.
pub struct KnownDevices {
    path: PathBuf,
    devices: BTreeMap<String, DeviceProfile>,
}

impl KnownDevices {
    /// Empty store bound to `path`; call [`KnownDevices::load`] to read it
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            devices: BTreeMap::new(),
        }
    }

    /// Bind to `path` and load it if the file exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        if store.path.exists() {
            store.load()?;
        }
        Ok(store)
    }

    pub fn load(&mut self) -> Result<()> {
        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read known devices from {:?}", self.path))?;
        let file: KnownDevicesFile =
            serde_json::from_str(&json).context("Failed to parse known devices JSON")?;
        self.devices = file.devices;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context("Failed to create known devices directory")?;
        }

        let file = KnownDevicesFile {
            version: "1.0".to_string(),
            devices: self.devices.clone(),
        };
        let json = serde_json::to_string_pretty(&file).context("Failed to serialize known devices")?;

        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, json)
            .with_context(|| format!("Failed to write {:?}", temp_path))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to replace {:?}", self.path))?;
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&DeviceProfile> {
        self.devices.get(id)
    }

    pub fn upsert(&mut self, profile: DeviceProfile) {
        self.devices.insert(profile.id.clone(), profile);
    }

    pub fn remove(&mut self, id: &str) -> Option<DeviceProfile> {
        self.devices.remove(id)
    }

    pub fn list(&self) -> impl Iterator<Item = &DeviceProfile> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overlay a remembered profile onto `config` and stamp its last use.
    /// Returns false when the device is unknown.
    pub fn apply_to(&mut self, id: &str, config: &mut ModuleConfig) -> bool {
        let Some(profile) = self.devices.get_mut(id) else {
            return false;
        };

        if profile.kind != config.kind {
            return false;
        }
        if profile.record_rate_hz.is_some() {
            config.record_rate_hz = profile.record_rate_hz;
        }
        if profile.preview_rate_hz.is_some() {
            config.preview_rate_hz = profile.preview_rate_hz;
        }
        if profile.audio.is_some() {
            config.audio = profile.audio;
        }
        profile.metadata.last_used_at = unix_now();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn profile(id: &str) -> DeviceProfile {
        DeviceProfile {
            id: id.to_string(),
            alias: format!("Camera {}", id),
            kind: StreamKind::Video,
            record_rate_hz: Some(15.0),
            preview_rate_hz: None,
            audio: None,
            metadata: DeviceMetadata::default(),
        }
    }

    #[test]
    fn test_save_and_load_profiles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("known_devices.json");

        let mut store = KnownDevices::new(&path);
        for i in 0..3 {
            store.upsert(profile(&format!("usb-{}", i)));
        }
        store.save().unwrap();

        let loaded = KnownDevices::open(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.get("usb-1").unwrap().alias, "Camera usb-1");
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = KnownDevices::open(dir.path().join("none.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_apply_profile_overrides_rates() {
        let dir = tempdir().unwrap();
        let mut store = KnownDevices::new(dir.path().join("known.json"));
        store.upsert(profile("usb-0"));

        let mut config = ModuleConfig::default();
        assert!(store.apply_to("usb-0", &mut config));
        assert_eq!(config.record_rate_hz, Some(15.0));
        assert_eq!(config.preview_rate_hz, Some(10.0));

        assert!(!store.apply_to("usb-9", &mut config));
    }
}
