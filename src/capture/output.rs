//! Output file naming.
//!
//! `<dir>/<camera>_<YYYYmmdd_HHMMSS_mmm>[_fallback].<ext>`, with a `-N`
//! counter appended if that name is already taken.

use super::CaptureMethod;
use crate::registry::OutputConfig;
use chrono::{DateTime, Local};
use std::io;
use std::path::{Path, PathBuf};

/// Directory and extension for captured stills.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    directory: PathBuf,
    extension: String,
}

impl OutputLayout {
    pub fn new(directory: impl Into<PathBuf>, extension: impl AsRef<str>) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.as_ref().trim_start_matches('.').to_ascii_lowercase(),
        }
    }

    pub fn from_config(config: &OutputConfig) -> Self {
        Self::new(&config.directory, &config.extension)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Filename for a capture of `camera_id` taken at `at`.
    pub fn file_name(&self, camera_id: &str, method: CaptureMethod, at: DateTime<Local>) -> String {
        let suffix = match method {
            CaptureMethod::Primary => "",
            CaptureMethod::Fallback => "_fallback",
        };
        format!(
            "{}_{}{}.{}",
            sanitize(camera_id),
            at.format("%Y%m%d_%H%M%S_%3f"),
            suffix,
            self.extension
        )
    }

    /// Creates the directory if needed and returns an unused path.
    pub async fn reserve(
        &self,
        camera_id: &str,
        method: CaptureMethod,
        at: DateTime<Local>,
    ) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.directory).await?;

        let name = self.file_name(camera_id, method, at);
        let candidate = self.directory.join(&name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }

        let stem = name.trim_end_matches(&format!(".{}", self.extension)).to_owned();
        for n in 1..=u32::MAX {
            let candidate = self.directory.join(format!("{stem}-{n}.{}", self.extension));
            if !tokio::fs::try_exists(&candidate).await? {
                return Ok(candidate);
            }
        }
        Err(io::Error::new(io::ErrorKind::AlreadyExists, name))
    }
}

fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
