//! Camera, still-capture and application configuration.
//!
//! Everything is loaded from a single TOML file whose sections all
//! fall back to defaults when omitted.

use crate::autocrop::CropConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for streaming capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Camera device index.
    pub device_id: u32,
    /// Requested frame width in pixels.
    pub width: u32,
    /// Requested frame height in pixels.
    pub height: u32,
    /// Requested frames per second from the device.
    pub fps: u32,
    /// Pause between published frames, in milliseconds.
    pub frame_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 1280,
            height: 720,
            fps: 30,
            frame_interval_ms: 60,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Interval between frames published by the stream worker.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::InvalidFrameInterval);
        }
        Ok(())
    }
}

/// Configuration for single-still capture through an external command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StillConfig {
    /// Command template. `{path}` is replaced by the output file path.
    /// The result is split on whitespace; no shell is involved.
    pub command: String,
    /// Output file name template. `{timestamp}` is replaced by unix seconds.
    pub file_name: String,
    /// Directory for still images. A per-process temp dir when unset.
    pub dir: Option<PathBuf>,
    /// Maximum time the command may run.
    pub timeout_secs: u64,
    /// Invert the still (negative to positive) before storing it.
    pub invert: bool,
}

impl Default for StillConfig {
    fn default() -> Self {
        Self {
            command: "fswebcam --no-banner -r 1920x1080 {path}".to_string(),
            file_name: "still-{timestamp}.jpg".to_string(),
            dir: None,
            timeout_secs: 30,
            invert: true,
        }
    }
}

impl StillConfig {
    /// Maximum time the still command may run.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.command.contains("{path}") {
            return Err(ConfigError::InvalidStillCommand(self.command.clone()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Local image cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory; one subdirectory per project.
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("cache"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_addr: SocketAddr,
    /// Scale factor applied to preview frames.
    pub preview_scale: f32,
    /// JPEG quality (1-100) for preview and cached images.
    pub jpeg_quality: u8,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            preview_scale: 0.5,
            jpeg_quality: 85,
        }
    }
}

/// Remote drive configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Folder that holds one subfolder per project.
    pub root_folder: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            root_folder: "Film Scanner".to_string(),
        }
    }
}

/// OAuth client credentials.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct OAuthConfig {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Must match the redirect registered with the provider.
    pub redirect_url: String,
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Camera and stream settings.
    #[serde(default)]
    pub capture: CaptureConfig,
    /// External still command.
    #[serde(default)]
    pub still: StillConfig,
    /// Auto-crop settings.
    #[serde(default)]
    pub crop: CropConfig,
    /// Local cache location.
    #[serde(default)]
    pub cache: CacheConfig,
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Remote drive layout.
    #[serde(default)]
    pub drive: DriveConfig,
    /// OAuth client registration.
    #[serde(default)]
    pub oauth: OAuthConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capture.validate()?;
        self.still.validate()?;
        self.crop.validate()?;
        if !(self.server.preview_scale > 0.0 && self.server.preview_scale <= 1.0) {
            return Err(ConfigError::InvalidPreviewScale(self.server.preview_scale));
        }
        if self.server.jpeg_quality == 0 || self.server.jpeg_quality > 100 {
            return Err(ConfigError::InvalidJpegQuality(self.server.jpeg_quality));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120 fps.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Stream interval is zero.
    #[error("frame interval must be positive")]
    InvalidFrameInterval,
    /// The still command is empty or lacks `{path}`.
    #[error("still command must contain a {{path}} placeholder: {0}")]
    InvalidStillCommand(String),
    /// Still timeout is zero.
    #[error("still capture timeout must be positive")]
    InvalidTimeout,
    /// Ratios must satisfy `0 < min <= max <= 1`.
    #[error("crop ratios must satisfy 0 < min <= max <= 1 (got {min}, {max})")]
    InvalidCropRatio {
        /// Configured minimum ratio.
        min: f64,
        /// Configured maximum ratio.
        max: f64,
    },
    /// Trim fraction outside `[0, 0.5)`.
    #[error("trim fractions must lie in [0, 0.5) (got {0})")]
    InvalidTrim(f64),
    /// Empty threshold range or zero step.
    #[error("invalid threshold sweep {start}..={end} step {step}")]
    InvalidSweep {
        /// First threshold.
        start: u8,
        /// Last threshold.
        end: u8,
        /// Distance between thresholds.
        step: u8,
    },
    /// Working aspect is not positive.
    #[error("working aspect must be positive (got {0})")]
    InvalidAspect(f64),
    /// Unusable mask parameter.
    #[error("invalid ignore-mask parameter: {0}")]
    InvalidMask(String),
    /// Preview scale outside `(0, 1]`.
    #[error("preview scale must lie in (0, 1] (got {0})")]
    InvalidPreviewScale(f32),
    /// JPEG quality outside 1-100.
    #[error("jpeg quality must lie in 1-100 (got {0})")]
    InvalidJpegQuality(u8),
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}
