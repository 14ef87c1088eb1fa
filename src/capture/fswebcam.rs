//! Primary capture path: the external `fswebcam` tool.

use super::{AttemptScope, CaptureError, CaptureMethod, CaptureStrategy};
use crate::camera::device_exists;
use crate::registry::{CameraConfig, OutputConfig, PrimaryConfig};
use async_trait::async_trait;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Longest stderr excerpt kept in a failure detail.
const STDERR_LIMIT: usize = 300;

/// Still capture by invoking an external command-line tool.
#[derive(Debug, Clone)]
pub struct ExternalToolCapture {
    program: String,
    jpeg_quality: u8,
    skip_frames: u32,
    timeout: Duration,
}

impl ExternalToolCapture {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            jpeg_quality: 95,
            skip_frames: 2,
            timeout,
        }
    }

    pub fn from_config(primary: &PrimaryConfig, output: &OutputConfig) -> Self {
        Self {
            program: primary.program.clone(),
            jpeg_quality: output.jpeg_quality,
            skip_frames: primary.skip_frames,
            timeout: primary.timeout(),
        }
    }

    pub fn with_skip_frames(mut self, skip_frames: u32) -> Self {
        self.skip_frames = skip_frames;
        self
    }

    /// Arguments for one still of `camera` into `output`.
    ///
    /// The output path is always last.
    pub fn command_args(&self, camera: &CameraConfig, output: &Path) -> Vec<OsString> {
        let is_png = output
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));

        let mut args = vec![
            "-d".to_owned(),
            camera.device_path.clone(),
            "-r".to_owned(),
            camera.capture_resolution.to_string(),
        ];
        if is_png {
            args.extend(["--png".to_owned(), "9".to_owned()]);
        } else {
            args.extend(["--jpeg".to_owned(), self.jpeg_quality.to_string()]);
        }
        args.extend([
            "--no-banner".to_owned(),
            "--skip".to_owned(),
            self.skip_frames.to_string(),
        ]);
        if camera.rotate180 {
            args.extend(["--rotate".to_owned(), "180".to_owned()]);
        }

        let mut args: Vec<OsString> = args.into_iter().map(OsString::from).collect();
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl CaptureStrategy for ExternalToolCapture {
    fn name(&self) -> &str {
        &self.program
    }

    fn method(&self) -> CaptureMethod {
        CaptureMethod::Primary
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(
        &self,
        camera: &CameraConfig,
        output: &Path,
        _scope: &AttemptScope,
    ) -> Result<(), CaptureError> {
        if !device_exists(&camera.device_path) {
            return Err(CaptureError::DeviceNotFound(camera.device_path.clone()));
        }

        let args = self.command_args(camera, output);
        tracing::debug!(camera = %camera.id, program = %self.program, ?args, "Running capture tool");

        // Dropping this future (on timeout) kills the child.
        let result = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => CaptureError::ToolMissing(self.program.clone()),
                _ => CaptureError::ToolSpawn {
                    tool: self.program.clone(),
                    reason: e.to_string(),
                },
            })?;

        if !result.stdout.is_empty() {
            tracing::trace!(
                camera = %camera.id,
                stdout = %String::from_utf8_lossy(&result.stdout),
                "Capture tool output"
            );
        }

        if !result.status.success() {
            return Err(CaptureError::ToolFailed {
                tool: self.program.clone(),
                status: result.status.to_string(),
                stderr: excerpt(&String::from_utf8_lossy(&result.stderr)),
            });
        }
        Ok(())
    }
}

/// Last lines of `text`, trimmed and capped to `STDERR_LIMIT` characters.
fn excerpt(text: &str) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= STDERR_LIMIT {
        return trimmed.replace('\n', " | ");
    }
    let tail: String = trimmed.chars().skip(count - STDERR_LIMIT).collect();
    format!("…{}", tail.replace('\n', " | "))
}
