//! Errors that stop the program before it starts capturing.

use crate::metrics::MetricsError;
use crate::preview::PreviewError;
use crate::registry::ConfigError;
use thiserror::Error;

/// Unrecoverable startup failure; the binary exits with status 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to install Ctrl-C handler: {0}")]
    Signal(String),
}
