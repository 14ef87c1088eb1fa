//! Progress notifications from the orchestrator to the presentation layer.

use crate::capture::{BatchCaptureResult, CaptureResult};
use crate::registry::FocusSetting;
use tokio::sync::mpsc;

/// Something the panel may want to show.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A capture-all trigger was accepted.
    BatchStarted { batch_id: u64, cameras: usize },
    /// A camera's capture began. `batch_id` is `None` for single captures.
    CaptureStarted {
        batch_id: Option<u64>,
        camera_id: String,
    },
    /// A camera's capture finished, successfully or not.
    CaptureFinished {
        batch_id: Option<u64>,
        result: CaptureResult,
    },
    /// Every camera in the batch has finished.
    BatchFinished(BatchCaptureResult),
    /// A runtime focus override was recorded.
    FocusChanged {
        camera_id: String,
        focus: FocusSetting,
        applied: bool,
    },
}

pub type EventSender = mpsc::UnboundedSender<CaptureEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CaptureEvent>;

/// Creates the single event channel.
pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
