//! Camera registry and application configuration.
//!
//! The registry is built once at startup, validated, and then shared
//! read-only (behind an `Arc`) by every other component.

mod camera;
mod config;

pub use camera::{CameraConfig, FocusSetting, Registry, Resolution, FOCUS_MAX, FOCUS_MIN};
pub use config::{
    AppConfig, ConfigError, FallbackConfig, FocusConfig, OutputConfig, PreviewConfig,
    PrimaryConfig, SUPPORTED_EXTENSIONS,
};
