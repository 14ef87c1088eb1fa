//! Multi-camera still capture
//!
//! Captures a still image from every configured V4L2 camera at the same
//! moment, while keeping a live preview running between captures.
//!
//! # Architecture
//!
//! ```text
//! registry → orchestrator → capture (primary tool → library fallback)
//!                 ↓                 ↑ device locks ↓
//!               panel            preview loops (one thread per camera)
//! ```
//!
//! # Design Principles
//!
//! - **Per-camera isolation**: one camera failing never affects another
//! - **Ordered results**: a batch lists cameras in registry order
//! - **Exclusive devices**: preview and still capture never share a device
//! - **Fallback**: the external tool is tried first, the camera library second
//!
//! # Example
//!
//! ```no_run
//! use multicam_capture::{
//!     camera::{DeviceLocks, MockCameraProvider},
//!     capture::StillCapture,
//!     orchestrator::Orchestrator,
//!     registry::AppConfig,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::default();
//! let registry = Arc::new(config.registry()?);
//! let capture = StillCapture::from_config(
//!     &config,
//!     Arc::new(MockCameraProvider::new()),
//!     Arc::new(DeviceLocks::new()),
//! );
//! let orchestrator = Orchestrator::new(registry, Arc::new(capture));
//!
//! let batch = orchestrator.capture_all().await;
//! for result in &batch {
//!     println!("{}: {:?}", result.camera_id, result.status());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod camera;
pub mod capture;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod panel;
pub mod preview;
pub mod registry;

// Re-export commonly used types at crate root
pub use capture::{BatchCaptureResult, CaptureMethod, CaptureResult, CaptureStatus, StillCapture};
pub use error::StartupError;
pub use orchestrator::{CaptureEvent, Orchestrator};
pub use preview::PreviewManager;
pub use registry::{AppConfig, CameraConfig, FocusSetting, Registry, Resolution};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
