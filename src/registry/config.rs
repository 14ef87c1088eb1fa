//! Application configuration file.
//!
//! Every section has defaults, so an empty file (or no file at all) yields
//! the built-in two-camera rig with `fswebcam` as the primary tool.

use super::camera::builtin_cameras;
use super::{CameraConfig, Registry};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("no cameras configured")]
    Empty,
    #[error("duplicate camera id `{0}`")]
    DuplicateId(String),
    #[error("camera `{camera}`: `{field}` must not be empty")]
    EmptyField { camera: String, field: &'static str },
    #[error("invalid resolution `{0}` (expected WIDTHxHEIGHT with positive values)")]
    InvalidResolution(String),
    #[error("invalid focus `{0}` (expected `auto` or an integer)")]
    InvalidFocus(String),
    #[error("camera `{camera}`: focus {value} outside {}..={}", super::FOCUS_MIN, super::FOCUS_MAX)]
    FocusOutOfRange { camera: String, value: u32 },
    #[error("invalid setting `{0}`: {1}")]
    InvalidSetting(&'static str, String),
    #[error("no cameras available ({0} configured, none accessible)")]
    NoAccessibleCameras(usize),
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Image formats both the capture tool and the fallback encoder can write.
pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub primary: PrimaryConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    /// Cameras in capture order.
    #[serde(default = "builtin_cameras", rename = "camera")]
    pub cameras: Vec<CameraConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output: OutputConfig::default(),
            primary: PrimaryConfig::default(),
            fallback: FallbackConfig::default(),
            preview: PreviewConfig::default(),
            focus: FocusConfig::default(),
            cameras: builtin_cameras(),
        }
    }
}

/// Where and how still images are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory receiving captured images; created on demand.
    pub directory: PathBuf,
    /// File extension, which also selects the fallback encoder.
    pub extension: String,
    /// JPEG quality (1-100).
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("captures"),
            extension: "jpg".to_owned(),
            jpeg_quality: 95,
        }
    }
}

/// External still-capture tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub enabled: bool,
    /// Executable name or path.
    pub program: String,
    pub timeout_secs: u64,
    /// Frames discarded before the still, letting exposure settle.
    pub skip_frames: u32,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "fswebcam".to_owned(),
            timeout_secs: 30,
            skip_frames: 2,
        }
    }
}

impl PrimaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// In-process camera capture used when the primary tool fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub enabled: bool,
    pub timeout_secs: u64,
    /// Settle time between opening the device and reading the still.
    pub warmup_ms: u64,
    pub fps: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 15,
            warmup_ms: 1000,
            fps: 15,
        }
    }
}

impl FallbackConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn warmup(&self) -> Duration {
        Duration::from_millis(self.warmup_ms)
    }
}

/// Live preview loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    pub enabled: bool,
    pub fps: u32,
    /// Pause after a failed frame read before retrying.
    pub retry_delay_ms: u64,
    /// Pause after a failed open before retrying.
    pub reopen_delay_ms: u64,
    /// How long a still capture waits for a preview to release its device.
    pub release_timeout_ms: u64,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fps: 20,
            retry_delay_ms: 10,
            reopen_delay_ms: 500,
            release_timeout_ms: 3000,
        }
    }
}

impl PreviewConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn reopen_delay(&self) -> Duration {
        Duration::from_millis(self.reopen_delay_ms)
    }

    pub fn release_timeout(&self) -> Duration {
        Duration::from_millis(self.release_timeout_ms)
    }
}

/// Device focus control tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusConfig {
    pub program: String,
    pub timeout_secs: u64,
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            program: "v4l2-ctl".to_owned(),
            timeout_secs: 5,
        }
    }
}

impl FocusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Registry::new(self.cameras.clone())?;

        let extension = self.output.extension.trim_start_matches('.');
        if !SUPPORTED_EXTENSIONS
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
        {
            return Err(ConfigError::InvalidSetting(
                "output.extension",
                format!("`{extension}` is not one of {}", SUPPORTED_EXTENSIONS.join(", ")),
            ));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(ConfigError::InvalidSetting(
                "output.jpeg_quality",
                format!("{} not in 1..=100", self.output.jpeg_quality),
            ));
        }
        if !self.primary.enabled && !self.fallback.enabled {
            return Err(ConfigError::InvalidSetting(
                "primary.enabled",
                "at least one of primary and fallback capture must be enabled".to_owned(),
            ));
        }
        if self.primary.program.trim().is_empty() {
            return Err(ConfigError::InvalidSetting(
                "primary.program",
                "must not be empty".to_owned(),
            ));
        }
        for (name, secs) in [
            ("primary.timeout_secs", self.primary.timeout_secs),
            ("fallback.timeout_secs", self.fallback.timeout_secs),
            ("focus.timeout_secs", self.focus.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidSetting(name, "must be positive".to_owned()));
            }
        }
        for (name, fps) in [("preview.fps", self.preview.fps), ("fallback.fps", self.fallback.fps)] {
            if fps == 0 || fps > 120 {
                return Err(ConfigError::InvalidSetting(
                    name,
                    format!("{fps} not in 1..=120"),
                ));
            }
        }
        Ok(())
    }

    /// Builds the camera registry.
    pub fn registry(&self) -> Result<Registry, ConfigError> {
        Registry::new(self.cameras.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FocusSetting, Resolution};

    #[test]
    fn test_default_config_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.registry().unwrap(), Registry::builtin());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.primary.program, "fswebcam");
        assert_eq!(config.primary.timeout(), Duration::from_secs(30));
        assert_eq!(config.cameras.len(), 2);
    }

    #[test]
    fn test_full_file() {
        let config = AppConfig::from_toml_str(
            r#"
            [output]
            directory = "/tmp/shots"
            extension = "png"

            [primary]
            timeout_secs = 10

            [preview]
            enabled = false

            [[camera]]
            id = "left"
            device = "/dev/video4"
            capture_resolution = "4000x3000"
            preview_resolution = "640x480"
            focus = 64
            name = "Left"

            [[camera]]
            id = "right"
            device = "/dev/video6"
            capture_resolution = "4000x3000"
            preview_resolution = "320x240"
            focus = "auto"
            rotate180 = true
            "#,
        )
        .unwrap();

        assert_eq!(config.output.directory, PathBuf::from("/tmp/shots"));
        assert_eq!(config.output.extension, "png");
        assert_eq!(config.output.jpeg_quality, 95);
        assert_eq!(config.primary.timeout_secs, 10);
        assert_eq!(config.primary.skip_frames, 2);
        assert!(!config.preview.enabled);

        let registry = config.registry().unwrap();
        let left = registry.get("left").unwrap();
        assert_eq!(left.capture_resolution, Resolution::new(4000, 3000));
        assert_eq!(left.focus, FocusSetting::Manual(64));
        assert_eq!(left.display_name(), "Left");
        let right = registry.get("right").unwrap();
        assert_eq!(right.focus, FocusSetting::Auto);
        assert!(right.rotate180);
        assert_eq!(right.display_name(), "right");
    }

    #[test]
    fn test_bad_resolution_is_parse_error() {
        let result = AppConfig::from_toml_str(
            r#"
            [[camera]]
            id = "a"
            device = "/dev/video0"
            capture_resolution = "big"
            preview_resolution = "640x480"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = AppConfig::from_toml_str("[fallback]\ntimeout_secs = 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSetting("fallback.timeout_secs", _))
        ));
    }

    #[test]
    fn test_output_extension_must_be_supported() {
        let result = AppConfig::from_toml_str("[output]\nextension = \"bmp\"\n");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSetting("output.extension", _))
        ));
        assert!(AppConfig::from_toml_str("[output]\nextension = \".JPEG\"\n").is_ok());
    }

    #[test]
    fn test_both_paths_disabled_rejected() {
        let result =
            AppConfig::from_toml_str("[primary]\nenabled = false\n[fallback]\nenabled = false\n");
        assert!(matches!(result, Err(ConfigError::InvalidSetting(_, _))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            AppConfig::from_file("/nonexistent/multicam.toml"),
            Err(ConfigError::FileReadError(_))
        ));
    }
}
