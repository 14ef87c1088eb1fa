//! `nokhwa`-backed camera used by the fallback capture path and preview.

use super::{Camera, CameraError, CameraProvider, Frame, OpenSettings, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use std::path::PathBuf;

/// Provider creating [`NokhwaCamera`] sessions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaProvider;

impl CameraProvider for NokhwaProvider {
    fn name(&self) -> &str {
        "nokhwa"
    }

    fn create(&self, device_path: &str) -> Box<dyn Camera> {
        Box::new(NokhwaCamera::new(device_path))
    }
}

/// Camera session over the platform's native capture backend.
pub struct NokhwaCamera {
    device: String,
    inner: Option<nokhwa::Camera>,
    sequence: u64,
}

impl NokhwaCamera {
    /// Creates an unopened camera for `device` (e.g. `/dev/video2`).
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            inner: None,
            sequence: 0,
        }
    }

    fn open_failed(&self, reason: impl ToString) -> CameraError {
        CameraError::OpenFailed {
            device: self.device.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Index of a V4L2 node such as `/dev/video2`.
///
/// Symlinks (`/dev/v4l/by-id/...`) are resolved first; anything that does
/// not end up at a `videoN` node has no index.
pub fn device_index(path: &str) -> Option<u32> {
    let resolved = std::fs::canonicalize(path).unwrap_or_else(|_| PathBuf::from(path));
    let digits = resolved.file_name()?.to_str()?.strip_prefix("video")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

impl Camera for NokhwaCamera {
    fn open(&mut self, settings: &OpenSettings) -> Result<(), CameraError> {
        self.close();

        let index = device_index(&settings.device_path)
            .ok_or_else(|| CameraError::DeviceNotFound(settings.device_path.clone()))?;
        let frame_format = match settings.format {
            PixelFormat::Mjpeg => FrameFormat::MJPEG,
            PixelFormat::Yuyv => FrameFormat::YUYV,
        };
        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                Resolution::new(settings.resolution.width, settings.resolution.height),
                frame_format,
                settings.fps,
            ),
        ));

        let mut camera = nokhwa::Camera::new(CameraIndex::Index(index), requested)
            .map_err(|e| self.open_failed(e))?;
        camera.open_stream().map_err(|e| self.open_failed(e))?;

        let actual = camera.resolution();
        tracing::debug!(
            device = %self.device,
            width = actual.width(),
            height = actual.height(),
            "nokhwa stream opened"
        );

        self.inner = Some(camera);
        self.sequence = 0;
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let camera = self.inner.as_mut().ok_or(CameraError::NotInitialized)?;
        let buffer = camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        let (width, height) = (decoded.width(), decoded.height());
        Ok(Frame::new(decoded.into_raw(), width, height, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn close(&mut self) {
        if let Some(mut camera) = self.inner.take() {
            if let Err(e) = camera.stop_stream() {
                tracing::warn!(device = %self.device, error = %e, "Failed to stop nokhwa stream");
            }
        }
    }
}

impl Drop for NokhwaCamera {
    fn drop(&mut self) {
        self.close();
    }
}
