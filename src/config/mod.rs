pub mod devices;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::core::StreamKind;
use crate::engine::gate::DEFAULT_TOLERANCE;
use crate::error::SyncError;
use crate::resilience::RestartStrategy;

pub use devices::{DeviceMetadata, DeviceProfile, KnownDevices};

/// Sample layout of an audio stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Frame layout of a raw video stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    /// ffmpeg pixel format name, e.g. "gray" or "rgb24"
    pub pixel_format: String,
}

impl Default for VideoFormat {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            pixel_format: "gray".to_string(),
        }
    }
}

/// Configuration of one capture module (one stream)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    pub module: String,
    pub stream_id: String,
    pub kind: StreamKind,

    /// Frame buffer capacity in units
    pub buffer_capacity: usize,

    /// Recording rate; `None` records every unit
    pub record_rate_hz: Option<f64>,
    pub preview_enabled: bool,
    /// Preview rate; `None` previews every unit
    pub preview_rate_hz: Option<f64>,
    /// Fraction of the interval a unit may arrive early
    pub gate_tolerance: f64,

    pub producer_timeout_ms: u64,
    pub metrics_window: usize,
    pub report_interval_ms: u64,
    pub log_flush_rows: usize,
    pub poll_interval_ms: u64,

    pub audio: Option<AudioFormat>,
    pub video: Option<VideoFormat>,
    pub restart: RestartStrategy,

    /// Known-devices store and the profile to apply from it
    pub known_devices: Option<PathBuf>,
    pub device_id: Option<String>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            module: "camera".to_string(),
            stream_id: "cam0".to_string(),
            kind: StreamKind::Video,
            buffer_capacity: crate::buffers::frame_buffer::DEFAULT_CAPACITY,
            record_rate_hz: Some(30.0),
            preview_enabled: true,
            preview_rate_hz: Some(10.0),
            gate_tolerance: DEFAULT_TOLERANCE,
            producer_timeout_ms: 2_000,
            metrics_window: crate::observability::metrics::DEFAULT_WINDOW,
            report_interval_ms: 5_000,
            log_flush_rows: crate::timing::writer::DEFAULT_FLUSH_ROWS,
            poll_interval_ms: 1,
            audio: None,
            video: Some(VideoFormat::default()),
            restart: RestartStrategy::default(),
            known_devices: None,
            device_id: None,
        }
    }
}

fn check_rate(name: &str, rate: Option<f64>) -> Result<(), SyncError> {
    match rate {
        Some(r) if !r.is_finite() || r <= 0.0 => Err(SyncError::Config(format!(
            "{} must be a positive number of hertz, got {}",
            name, r
        ))),
        _ => Ok(()),
    }
}

impl ModuleConfig {
    /// Audio defaults: every chunk recorded, preview at 10 Hz
    pub fn audio(stream_id: &str, format: AudioFormat) -> Self {
        Self {
            module: "audio".to_string(),
            stream_id: stream_id.to_string(),
            kind: StreamKind::Audio,
            record_rate_hz: None,
            audio: Some(format),
            video: None,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.stream_id.is_empty()
            || !self
                .stream_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(SyncError::Config(format!(
                "stream id {:?} must be non-empty and use only [A-Za-z0-9_-]",
                self.stream_id
            )));
        }
        if self.buffer_capacity == 0 {
            return Err(SyncError::Config("buffer_capacity must be at least 1".to_string()));
        }
        check_rate("record_rate_hz", self.record_rate_hz)?;
        check_rate("preview_rate_hz", self.preview_rate_hz)?;
        if !(0.0..1.0).contains(&self.gate_tolerance) {
            return Err(SyncError::Config(format!(
                "gate_tolerance must be in [0, 1), got {}",
                self.gate_tolerance
            )));
        }
        if self.producer_timeout_ms == 0 {
            return Err(SyncError::Config("producer_timeout_ms must be positive".to_string()));
        }
        if self.kind == StreamKind::Audio && self.audio.is_none() {
            return Err(SyncError::Config(format!(
                "audio stream {} needs an audio format",
                self.stream_id
            )));
        }
        Ok(())
    }

    pub fn producer_timeout(&self) -> Duration {
        Duration::from_millis(self.producer_timeout_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: ModuleConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let json = serde_json::to_string_pretty(self)?;

        // Write to temporary file first
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, json)
            .await
            .context("Failed to write temporary config file")?;

        fs::rename(&temp_path, path)
            .await
            .context("Failed to atomically update config file")?;

        Ok(())
    }
}
