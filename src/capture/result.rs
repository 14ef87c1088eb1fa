//! Per-camera and per-batch capture outcomes.

use chrono::{DateTime, Local};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which capture path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureMethod {
    /// External command-line capture tool.
    Primary,
    /// In-process camera library.
    Fallback,
}

impl CaptureMethod {
    /// Lowercase label used in logs, metrics and filenames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for CaptureMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success or failure of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Success,
    Failure,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// What a capture left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Image written to `path`.
    Saved { path: PathBuf },
    /// Every path failed; `detail` names each cause.
    Failed { detail: String },
}

/// Result of capturing one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureResult {
    /// Registry id of the camera.
    pub camera_id: String,
    /// Path that produced the outcome (the last one tried on failure).
    pub method: CaptureMethod,
    /// Saved image or failure detail.
    pub outcome: CaptureOutcome,
    /// Wall-clock time spent on this camera, including waiting for the device.
    pub elapsed: Duration,
}

impl CaptureResult {
    /// Builds a successful result.
    pub fn success(
        camera_id: impl Into<String>,
        method: CaptureMethod,
        path: PathBuf,
        elapsed: Duration,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            method,
            outcome: CaptureOutcome::Saved { path },
            elapsed,
        }
    }

    /// Builds a failed result.
    pub fn failure(
        camera_id: impl Into<String>,
        method: CaptureMethod,
        detail: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            method,
            outcome: CaptureOutcome::Failed {
                detail: detail.into(),
            },
            elapsed,
        }
    }

    pub fn status(&self) -> CaptureStatus {
        match self.outcome {
            CaptureOutcome::Saved { .. } => CaptureStatus::Success,
            CaptureOutcome::Failed { .. } => CaptureStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == CaptureStatus::Success
    }

    /// Saved image path; present iff the capture succeeded.
    pub fn image_path(&self) -> Option<&Path> {
        match &self.outcome {
            CaptureOutcome::Saved { path } => Some(path),
            CaptureOutcome::Failed { .. } => None,
        }
    }

    /// Failure detail; present iff the capture failed.
    pub fn error_detail(&self) -> Option<&str> {
        match &self.outcome {
            CaptureOutcome::Saved { .. } => None,
            CaptureOutcome::Failed { detail } => Some(detail),
        }
    }
}

/// One "capture all" trigger and its results in registry order.
#[derive(Debug, Clone)]
pub struct BatchCaptureResult {
    /// Monotonic id per orchestrator.
    pub batch_id: u64,
    /// When the batch was triggered.
    pub started_at: DateTime<Local>,
    /// Time until the last camera finished.
    pub elapsed: Duration,
    results: Vec<CaptureResult>,
}

impl BatchCaptureResult {
    pub fn new(
        batch_id: u64,
        started_at: DateTime<Local>,
        elapsed: Duration,
        results: Vec<CaptureResult>,
    ) -> Self {
        Self {
            batch_id,
            started_at,
            elapsed,
            results,
        }
    }

    pub fn results(&self) -> &[CaptureResult] {
        &self.results
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CaptureResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, camera_id: &str) -> Option<&CaptureResult> {
        self.results.iter().find(|r| r.camera_id == camera_id)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }
}

impl<'a> IntoIterator for &'a BatchCaptureResult {
    type Item = &'a CaptureResult;
    type IntoIter = std::slice::Iter<'a, CaptureResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
