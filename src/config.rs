//! Configuration file loading.
//!
//! Every key is optional; an empty file (or no file) yields the defaults
//! for a 96x96 RGB565 sensor writing `IMAGE<N>.BIN` files to `/sdcard`.
//!
//! ```toml
//! [camera]
//! device_index = 0
//! width = 96
//! height = 96
//! pixel_format = "RGB565"
//!
//! [storage]
//! mount_point = "/sdcard"
//! counter_file = "config.txt"
//! require_mount_point = true
//!
//! [pipeline]
//! warmup_frames = 10
//! counter_write_policy = "tolerate"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::pipeline::DEFAULT_WARMUP_FRAMES;
use crate::sequence::{CounterRecovery, CounterWritePolicy, ImageNaming, SequenceCounter};
use crate::storage::DirectoryStorage;
use crate::traits::{CameraSettings, Format, FourCC};

/// Largest uncompressed frame accepted from configuration (64 MiB).
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Error types for config loading.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    /// File read error.
    #[error("Failed to read config file {}: {source}", .path.display())]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Parse error (invalid TOML or wrong types).
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Values parsed but are unusable.
    #[error("Config validation failed: {0}")]
    Invalid(String),
}

/// Camera section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSection {
    /// Device index (e.g., 0 for /dev/video0).
    pub device_index: u32,
    /// Sensor clock in hertz.
    pub xclk_freq_hz: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format name or four-character code.
    pub pixel_format: String,
    /// Driver frame buffers.
    pub buffer_count: u32,
    /// Acquire timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for CameraSection {
    fn default() -> Self {
        let defaults = CameraSettings::default();
        Self {
            device_index: defaults.device_index,
            xclk_freq_hz: defaults.xclk_freq_hz,
            width: defaults.format.width,
            height: defaults.format.height,
            pixel_format: "RGB565".to_owned(),
            buffer_count: defaults.buffer_count,
            timeout_ms: u64::try_from(defaults.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

/// Storage section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageSection {
    /// Directory the card is mounted at.
    pub mount_point: PathBuf,
    /// Counter file name, relative to the mount point.
    pub counter_file: String,
    /// Image file name prefix.
    pub prefix: String,
    /// Image file extension, including the dot.
    pub extension: String,
    /// Refuse to mount unless `mount_point` is a filesystem mount point.
    pub require_mount_point: bool,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/sdcard"),
            counter_file: "config.txt".to_owned(),
            prefix: "IMAGE".to_owned(),
            extension: ".BIN".to_owned(),
            require_mount_point: true,
        }
    }
}

/// Pipeline section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    /// Frames discarded before the real capture.
    pub warmup_frames: u32,
    /// Behaviour when the counter cannot be written back.
    pub counter_write_policy: CounterWritePolicy,
    /// Where numbering restarts when the counter is missing or corrupt.
    pub counter_recovery: CounterRecovery,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            warmup_frames: DEFAULT_WARMUP_FRAMES,
            counter_write_policy: CounterWritePolicy::default(),
            counter_recovery: CounterRecovery::default(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CaptureConfig {
    /// Camera settings.
    pub camera: CameraSection,
    /// Storage settings.
    pub storage: StorageSection,
    /// Pipeline settings.
    pub pipeline: PipelineSection,
}

impl CaptureConfig {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text)?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Parse and validate configuration text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigLoadError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        let camera = &self.camera;
        if camera.width == 0 || camera.height == 0 {
            return Err(ConfigLoadError::Invalid(
                "camera resolution must be non-zero".to_owned(),
            ));
        }
        if camera.buffer_count == 0 {
            return Err(ConfigLoadError::Invalid(
                "camera.buffer_count must be at least 1".to_owned(),
            ));
        }
        if camera.timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid(
                "camera.timeout_ms must be positive".to_owned(),
            ));
        }
        self.format()?;

        let storage = &self.storage;
        if storage.counter_file.is_empty() || storage.counter_file.contains('/') {
            return Err(ConfigLoadError::Invalid(
                "storage.counter_file must be a plain file name".to_owned(),
            ));
        }
        if storage.prefix.contains('/') || storage.extension.contains('/') {
            return Err(ConfigLoadError::Invalid(
                "storage.prefix and storage.extension must not contain '/'".to_owned(),
            ));
        }
        let naming = self.naming();
        if naming.parse_sequence(&storage.counter_file).is_some() {
            return Err(ConfigLoadError::Invalid(
                "storage.counter_file collides with image names".to_owned(),
            ));
        }
        Ok(())
    }

    fn pixel_format(&self) -> Result<FourCC, ConfigLoadError> {
        self.camera
            .pixel_format
            .parse()
            .map_err(ConfigLoadError::Invalid)
    }

    fn format(&self) -> Result<Format, ConfigLoadError> {
        let camera = &self.camera;
        Format::checked_new(camera.width, camera.height, self.pixel_format()?)
            .filter(|format| format.size <= MAX_FRAME_BYTES)
            .ok_or_else(|| {
                ConfigLoadError::Invalid(format!(
                    "camera resolution {}x{} exceeds the {MAX_FRAME_BYTES} byte frame limit",
                    camera.width, camera.height
                ))
            })
    }

    /// Settings passed to the camera driver.
    pub fn camera_settings(&self) -> Result<CameraSettings, ConfigLoadError> {
        let camera = &self.camera;
        Ok(CameraSettings {
            device_index: camera.device_index,
            xclk_freq_hz: camera.xclk_freq_hz,
            format: self.format()?,
            buffer_count: camera.buffer_count,
            timeout: Duration::from_millis(camera.timeout_ms),
        })
    }

    /// Image naming scheme.
    pub fn naming(&self) -> ImageNaming {
        ImageNaming::new(self.storage.prefix.clone(), self.storage.extension.clone())
    }

    /// Storage rooted at the configured mount point.
    pub fn directory_storage(&self) -> DirectoryStorage {
        DirectoryStorage::new(self.storage.mount_point.clone())
            .require_mount_point(self.storage.require_mount_point)
    }

    /// Sequence counter with the configured file and policies.
    pub fn sequence_counter(&self) -> SequenceCounter {
        SequenceCounter::new(self.storage.counter_file.clone(), self.naming())
            .with_write_policy(self.pipeline.counter_write_policy)
            .with_recovery(self.pipeline.counter_recovery)
    }
}
