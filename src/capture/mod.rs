//! Still capture for a single camera.
//!
//! A capture runs an ordered chain of [`CaptureStrategy`]s: the external
//! tool first, then the in-process camera library. Every outcome, good or
//! bad, comes back as a [`CaptureResult`].

mod error;
mod fallback;
mod focus;
mod fswebcam;
mod output;
mod result;
mod strategy;
mod tools;

pub use error::CaptureError;
pub use fallback::{save_frame, LibraryCapture};
pub use focus::{focus_args, FocusControl, FocusError, NoFocusControl, V4l2Focus};
pub use fswebcam::ExternalToolCapture;
pub use output::OutputLayout;
pub use result::{BatchCaptureResult, CaptureMethod, CaptureOutcome, CaptureResult, CaptureStatus};
pub use strategy::{AttemptScope, CaptureStrategy, StillCapture};
pub use tools::{preflight, probe_tool, ToolStatus};
