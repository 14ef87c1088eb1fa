//! Focus control through the device control tool.
//!
//! Focus is best effort: callers log and count failures but never abort a
//! capture because of one.

use crate::registry::{FocusConfig, FocusSetting};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Why a focus change failed.
#[derive(Debug, Error)]
pub enum FocusError {
    #[error("{0} not installed")]
    ToolMissing(String),
    #[error("{tool} could not be started: {reason}")]
    Spawn { tool: String, reason: String },
    #[error("{tool} exited with {status}: {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },
    #[error("focus control timed out after {0:?}")]
    Timeout(Duration),
    #[error("unknown camera `{0}`")]
    UnknownCamera(String),
    #[error("focus {0} out of range")]
    OutOfRange(u32),
}

/// Applies a focus setting to a device.
#[async_trait]
pub trait FocusControl: Send + Sync {
    async fn apply(&self, device: &str, focus: FocusSetting) -> Result<(), FocusError>;
}

/// Arguments for `v4l2-ctl` to apply `focus` on `device`.
pub fn focus_args(device: &str, focus: FocusSetting) -> Vec<String> {
    let mut args = vec!["-d".to_owned(), device.to_owned()];
    match focus {
        FocusSetting::Auto => {
            args.push("--set-ctrl=focus_automatic_continuous=1".to_owned());
        }
        FocusSetting::Manual(value) => {
            args.push("--set-ctrl=focus_automatic_continuous=0".to_owned());
            args.push(format!("--set-ctrl=focus_absolute={value}"));
        }
    }
    args
}

/// Focus control via `v4l2-ctl --set-ctrl`.
#[derive(Debug, Clone)]
pub struct V4l2Focus {
    program: String,
    timeout: Duration,
}

impl V4l2Focus {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    pub fn from_config(config: &FocusConfig) -> Self {
        Self::new(&config.program, config.timeout())
    }
}

#[async_trait]
impl FocusControl for V4l2Focus {
    async fn apply(&self, device: &str, focus: FocusSetting) -> Result<(), FocusError> {
        let output = Command::new(&self.program)
            .args(focus_args(device, focus))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| FocusError::Timeout(self.timeout))?
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => FocusError::ToolMissing(self.program.clone()),
                _ => FocusError::Spawn {
                    tool: self.program.clone(),
                    reason: e.to_string(),
                },
            })?;

        if !output.status.success() {
            return Err(FocusError::Failed {
                tool: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        tracing::info!(device, focus = %focus, "Focus applied");
        Ok(())
    }
}

/// Focus control that does nothing; used for simulated cameras.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFocusControl;

#[async_trait]
impl FocusControl for NoFocusControl {
    async fn apply(&self, device: &str, focus: FocusSetting) -> Result<(), FocusError> {
        tracing::debug!(device, focus = %focus, "Focus control skipped");
        Ok(())
    }
}
