//! Live preview loops, one thread per camera.
//!
//! Each loop streams at the camera's preview resolution into a latest-frame
//! slot. A loop gives its device up whenever a still capture is waiting for
//! it and picks the stream back up once the capture is done.

mod stream;

pub use stream::{PreviewSettings, PreviewStats, PreviewStream};

use crate::camera::{CameraProvider, DeviceLocks, Frame};
use crate::metrics::CaptureMetrics;
use crate::registry::Registry;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while starting previews.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("failed to start preview thread for {camera}: {source}")]
    Spawn {
        camera: String,
        #[source]
        source: std::io::Error,
    },
}

/// Owns the preview loops for every camera in a registry.
pub struct PreviewManager {
    provider: Arc<dyn CameraProvider>,
    locks: Arc<DeviceLocks>,
    settings: PreviewSettings,
    metrics: Option<Arc<CaptureMetrics>>,
    streams: Vec<PreviewStream>,
}

impl PreviewManager {
    /// Creates a manager; loops start with [`PreviewManager::start`].
    ///
    /// `locks` must be the table the still-capture side uses.
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        locks: Arc<DeviceLocks>,
        settings: PreviewSettings,
    ) -> Self {
        Self {
            provider,
            locks,
            settings,
            metrics: None,
            streams: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<CaptureMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Starts one loop per camera. Already running loops are stopped first.
    pub fn start(&mut self, registry: &Registry) -> Result<(), PreviewError> {
        self.stop();
        for camera in registry {
            let lock = self.locks.lock_for(&camera.device_path);
            let stream = PreviewStream::spawn(
                camera.clone(),
                Arc::clone(&self.provider),
                lock,
                self.settings,
                self.metrics.clone(),
            )
            .map_err(|source| PreviewError::Spawn {
                camera: camera.id.clone(),
                source,
            })?;
            self.streams.push(stream);
        }
        tracing::info!(streams = self.streams.len(), "Previews started");
        Ok(())
    }

    pub fn streams(&self) -> &[PreviewStream] {
        &self.streams
    }

    pub fn stream(&self, camera_id: &str) -> Option<&PreviewStream> {
        self.streams.iter().find(|s| s.camera_id() == camera_id)
    }

    pub fn latest_frame(&self, camera_id: &str) -> Option<Arc<Frame>> {
        self.stream(camera_id).and_then(PreviewStream::latest_frame)
    }

    /// Per-camera counters in registry order.
    pub fn stats(&self) -> Vec<(String, PreviewStats)> {
        self.streams
            .iter()
            .map(|s| (s.camera_id().to_owned(), s.stats()))
            .collect()
    }

    /// Stops every loop and waits for their devices to be released.
    pub fn stop(&mut self) {
        if self.streams.is_empty() {
            return;
        }
        for stream in &mut self.streams {
            stream.stop();
        }
        self.streams.clear();
        tracing::info!("Previews stopped");
    }
}

impl Drop for PreviewManager {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PreviewManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewManager")
            .field("provider", &self.provider.name())
            .field("settings", &self.settings)
            .field("streams", &self.streams.len())
            .finish()
    }
}
