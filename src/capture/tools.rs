//! Startup probe for the external tools.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Whether an external program answered a version probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    /// The program ran; carries the first line it printed.
    Available(String),
    /// The program is not on `PATH`.
    Missing,
    /// The program exists but the probe failed or hung.
    Unusable(String),
}

impl ToolStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, ToolStatus::Available(_))
    }
}

/// Runs `program --version` and reports what happened.
///
/// A missing tool is not fatal; callers warn and rely on the fallback path.
pub async fn probe_tool(program: &str, timeout: Duration) -> ToolStatus {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, output).await {
        Err(_) => ToolStatus::Unusable(format!("no answer within {timeout:?}")),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => ToolStatus::Missing,
        Ok(Err(e)) => ToolStatus::Unusable(e.to_string()),
        Ok(Ok(output)) => {
            // fswebcam prints its banner on stderr.
            let text = if output.stdout.is_empty() {
                &output.stderr
            } else {
                &output.stdout
            };
            let first = String::from_utf8_lossy(text)
                .lines()
                .next()
                .unwrap_or_default()
                .trim()
                .to_owned();
            ToolStatus::Available(first)
        }
    }
}

/// Probes each program and logs the result.
pub async fn preflight(programs: &[&str]) -> Vec<(String, ToolStatus)> {
    let mut report = Vec::with_capacity(programs.len());
    for program in programs {
        let status = probe_tool(program, Duration::from_secs(5)).await;
        match &status {
            ToolStatus::Available(version) => {
                tracing::info!(program, version = %version, "External tool available");
            }
            ToolStatus::Missing => {
                tracing::warn!(program, "External tool not installed");
            }
            ToolStatus::Unusable(reason) => {
                tracing::warn!(program, reason = %reason, "External tool not usable");
            }
        }
        report.push(((*program).to_owned(), status));
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_program() {
        let status = probe_tool("multicam-no-such-tool", Duration::from_secs(1)).await;
        assert_eq!(status, ToolStatus::Missing);
        assert!(!status.is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_present_program() {
        // `true` ignores its arguments and exits cleanly.
        let status = probe_tool("true", Duration::from_secs(5)).await;
        assert!(status.is_available());
    }

    #[tokio::test]
    async fn test_preflight_reports_every_program() {
        let report = preflight(&["multicam-no-such-a", "multicam-no-such-b"]).await;
        let names: Vec<_> = report.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["multicam-no-such-a", "multicam-no-such-b"]);
    }
}
