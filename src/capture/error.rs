//! Capture failure taxonomy.

use crate::camera::{CameraError, DeviceBusy};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Why one capture attempt failed.
///
/// These never escape a camera's capture: they are rendered into the
/// `error_detail` of its `CaptureResult`.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("device {0} not found")]
    DeviceNotFound(String),
    #[error("{0} not installed")]
    ToolMissing(String),
    #[error("{tool} could not be started: {reason}")]
    ToolSpawn { tool: String, reason: String },
    #[error("{tool} exited with {status}{}", stderr_suffix(.stderr))]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("no image written to {}", .0.display())]
    NoOutput(PathBuf),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("failed to encode image: {0}")]
    EncodingFailure(String),
    #[error("cannot prepare output {}: {reason}", .path.display())]
    Output { path: PathBuf, reason: String },
    #[error(transparent)]
    DeviceBusy(#[from] DeviceBusy),
    #[error("capture task failed: {0}")]
    TaskFailed(String),
    #[error("attempt abandoned after its deadline")]
    Abandoned,
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {stderr}")
    }
}
