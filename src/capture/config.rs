//! Capture and application configuration.
//!
//! Resolution and frame-rate values are hints: the device negotiates the
//! actual stream dimensions and the session reports what it got.

use super::FacingMode;
use crate::photo::{ImageFormat, PayloadLimits};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration for stream acquisition and still capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Ideal stream width in pixels.
    pub ideal_width: u32,
    /// Ideal stream height in pixels.
    pub ideal_height: u32,
    /// Frame-rate hint, omitted from the request when `None`.
    pub frame_rate: Option<u32>,
    /// Facing mode requested on first start.
    pub facing: FacingMode,
    /// Encoding of captured stills.
    pub format: ImageFormat,
    /// Encoder quality (1-100), used for JPEG.
    pub quality: u8,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            frame_rate: Some(30),
            facing: FacingMode::Back,
            format: ImageFormat::Jpeg,
            quality: 92,
        }
    }
}

impl CaptureConfig {
    /// Creates a new configuration with the specified ideal dimensions.
    pub fn with_dimensions(ideal_width: u32, ideal_height: u32) -> Self {
        Self {
            ideal_width,
            ideal_height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ideal_width == 0 || self.ideal_height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if let Some(fps) = self.frame_rate {
            if fps == 0 || fps > 120 {
                return Err(ConfigError::InvalidFrameRate);
            }
        }
        if self.quality == 0 || self.quality > 100 {
            return Err(ConfigError::InvalidQuality(self.quality));
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid stream dimensions (width and height must be positive)")]
    InvalidDimensions,
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    #[error("invalid encoder quality {0} (must be 1-100)")]
    InvalidQuality(u8),
    #[error("invalid payload limits: {0}")]
    InvalidPayloadLimits(String),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Delivery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Directory download artifacts are written to.
    pub download_dir: PathBuf,
    /// Limits for the host bridge data channel.
    pub payload: PayloadLimits,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("photos"),
            payload: PayloadLimits::default(),
        }
    }
}

/// Host bridge presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Header color passed to the host on setup.
    pub header_color: String,
    /// Main button label once a photo is ready.
    pub main_button_text: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            header_color: "#2481cc".to_string(),
            main_button_text: "Send photo".to_string(),
        }
    }
}

/// Local image store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    /// Backing file; the store is memory-only when unset.
    pub path: Option<PathBuf>,
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
        config.capture.validate()?;
        config.delivery.payload.validate()?;
        Ok(config)
    }
}
