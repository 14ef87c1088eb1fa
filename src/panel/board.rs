//! Per-camera status kept from orchestrator events.

use crate::capture::{BatchCaptureResult, CaptureMethod, CaptureOutcome, CaptureResult};
use crate::orchestrator::CaptureEvent;
use crate::preview::PreviewStats;
use crate::registry::{FocusSetting, Registry};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::time::Duration;

/// What the panel knows about one camera right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Capturing,
    Saved {
        path: PathBuf,
        method: CaptureMethod,
        elapsed: Duration,
    },
    Failed {
        method: CaptureMethod,
        detail: String,
    },
}

#[derive(Debug, Clone)]
pub struct CameraStatus {
    pub camera_id: String,
    pub name: String,
    pub device: String,
    pub focus: FocusSetting,
    pub state: CameraState,
    pub captures: u64,
    pub failures: u64,
    pub preview: Option<PreviewStats>,
}

/// One entry per registered camera, in registry order. Entries are never
/// removed, so a camera whose last capture failed keeps showing why.
#[derive(Debug, Clone)]
pub struct StatusBoard {
    entries: Vec<CameraStatus>,
    last_batch: Option<BatchSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BatchSummary {
    batch_id: u64,
    succeeded: usize,
    failed: usize,
    elapsed: Duration,
}

impl StatusBoard {
    pub fn new(registry: &Registry) -> Self {
        let entries = registry
            .iter()
            .map(|camera| CameraStatus {
                camera_id: camera.id.clone(),
                name: camera.display_name().to_owned(),
                device: camera.device_path.clone(),
                focus: camera.focus,
                state: CameraState::Idle,
                captures: 0,
                failures: 0,
                preview: None,
            })
            .collect();
        Self {
            entries,
            last_batch: None,
        }
    }

    pub fn entries(&self) -> &[CameraStatus] {
        &self.entries
    }

    pub fn get(&self, camera_id: &str) -> Option<&CameraStatus> {
        self.entries.iter().find(|e| e.camera_id == camera_id)
    }

    fn get_mut(&mut self, camera_id: &str) -> Option<&mut CameraStatus> {
        self.entries.iter_mut().find(|e| e.camera_id == camera_id)
    }

    /// Folds one event into the board.
    pub fn apply(&mut self, event: &CaptureEvent) {
        match event {
            CaptureEvent::BatchStarted { .. } => {}
            CaptureEvent::CaptureStarted { camera_id, .. } => {
                if let Some(entry) = self.get_mut(camera_id) {
                    entry.state = CameraState::Capturing;
                }
            }
            CaptureEvent::CaptureFinished { result, .. } => self.record(result),
            CaptureEvent::BatchFinished(batch) => {
                // Results were already folded in as each camera finished.
                self.last_batch = Some(BatchSummary {
                    batch_id: batch.batch_id,
                    succeeded: batch.succeeded(),
                    failed: batch.failed(),
                    elapsed: batch.elapsed,
                });
            }
            CaptureEvent::FocusChanged {
                camera_id, focus, ..
            } => {
                if let Some(entry) = self.get_mut(camera_id) {
                    entry.focus = *focus;
                }
            }
        }
    }

    fn record(&mut self, result: &CaptureResult) {
        let Some(entry) = self.get_mut(&result.camera_id) else {
            return;
        };
        entry.captures += 1;
        entry.state = match &result.outcome {
            CaptureOutcome::Saved { path } => CameraState::Saved {
                path: path.clone(),
                method: result.method,
                elapsed: result.elapsed,
            },
            CaptureOutcome::Failed { detail } => {
                entry.failures += 1;
                CameraState::Failed {
                    method: result.method,
                    detail: detail.clone(),
                }
            }
        };
    }

    /// Copies the latest preview counters onto the board.
    pub fn update_preview(&mut self, stats: &[(String, PreviewStats)]) {
        for (camera_id, stats) in stats {
            if let Some(entry) = self.get_mut(camera_id) {
                entry.preview = Some(*stats);
            }
        }
    }

    /// Multi-line status table.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = write!(
                out,
                "{:<10} {:<12} {:<14} focus {:<12} ",
                entry.camera_id,
                entry.name,
                entry.device,
                entry.focus.to_string()
            );
            let _ = match &entry.state {
                CameraState::Idle => write!(out, "idle"),
                CameraState::Capturing => write!(out, "capturing..."),
                CameraState::Saved {
                    path,
                    method,
                    elapsed,
                } => write!(
                    out,
                    "saved {} ({method}, {:.1}s)",
                    path.display(),
                    elapsed.as_secs_f64()
                ),
                CameraState::Failed { method, detail } => {
                    write!(out, "FAILED via {method}: {detail}")
                }
            };
            let _ = write!(out, " [{} captures, {} failed]", entry.captures, entry.failures);
            if let Some(preview) = &entry.preview {
                let _ = write!(
                    out,
                    " preview {} frames, {} read errors",
                    preview.frames, preview.read_failures
                );
            }
            out.push('\n');
        }
        if let Some(batch) = &self.last_batch {
            let _ = writeln!(
                out,
                "last batch #{}: {} ok, {} failed in {:.1}s",
                batch.batch_id,
                batch.succeeded,
                batch.failed,
                batch.elapsed.as_secs_f64()
            );
        }
        out
    }
}

/// One line per camera for a finished batch.
pub fn render_batch(batch: &BatchCaptureResult) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Batch #{} ({}): {}/{} cameras captured in {:.1}s",
        batch.batch_id,
        batch.started_at.format("%H:%M:%S"),
        batch.succeeded(),
        batch.len(),
        batch.elapsed.as_secs_f64()
    );
    for result in batch {
        let _ = writeln!(out, "  {}", render_result(result));
    }
    out
}

/// One-line summary of a single capture.
pub fn render_result(result: &CaptureResult) -> String {
    match &result.outcome {
        CaptureOutcome::Saved { path } => format!(
            "{}: saved {} via {}",
            result.camera_id,
            path.display(),
            result.method
        ),
        CaptureOutcome::Failed { detail } => format!(
            "{}: FAILED ({}): {}",
            result.camera_id, result.method, detail
        ),
    }
}
