//! Prometheus metrics for capture, preview and focus.
//!
//! # Metrics Exposed
//!
//! ## Capture
//! - `multicam_captures_total{camera,method,status}` - Capture results
//! - `multicam_capture_duration_seconds{camera}` - Per-camera capture time
//! - `multicam_batches_total` - Batches triggered
//! - `multicam_batch_duration_seconds` - Time until the slowest camera finished
//!
//! ## Preview
//! - `multicam_preview_frames_total{camera}` - Frames delivered to the preview slot
//! - `multicam_preview_read_failures_total{camera}` - Failed preview reads
//!
//! ## Focus
//! - `multicam_focus_failures_total{camera}` - Focus changes that failed
//!
//! The collector is always compiled; the HTTP exporter needs the `metrics`
//! feature.
//!
//! # Example
//!
//! ```no_run
//! use multicam_capture::metrics::CaptureMetrics;
//!
//! let metrics = CaptureMetrics::new().expect("Failed to create registry");
//! metrics.record_preview_frame("video0");
//! println!("{}", metrics.encode().unwrap());
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{CaptureMetrics, MetricsError};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
