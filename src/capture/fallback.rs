//! Fallback capture path: read one frame through the camera library.

use super::{AttemptScope, CaptureError, CaptureMethod, CaptureStrategy};
use crate::camera::{CameraProvider, Frame, OpenSettings, PixelFormat};
use crate::registry::{CameraConfig, FallbackConfig, OutputConfig};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Still capture through an in-process [`CameraProvider`].
///
/// The device is opened at the capture resolution, given `warmup` to settle
/// exposure, read once and closed before the frame is rotated and encoded.
/// The read runs on the blocking pool and cannot be interrupted; it keeps
/// the device reserved until it returns, and its image is only moved into
/// place if the attempt is still live.
pub struct LibraryCapture {
    provider: Arc<dyn CameraProvider>,
    warmup: Duration,
    fps: u32,
    jpeg_quality: u8,
    timeout: Duration,
}

impl LibraryCapture {
    pub fn new(provider: Arc<dyn CameraProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            warmup: Duration::from_secs(1),
            fps: 15,
            jpeg_quality: 95,
            timeout,
        }
    }

    pub fn from_config(
        provider: Arc<dyn CameraProvider>,
        fallback: &FallbackConfig,
        output: &OutputConfig,
    ) -> Self {
        Self {
            provider,
            warmup: fallback.warmup(),
            fps: fallback.fps,
            jpeg_quality: output.jpeg_quality,
            timeout: fallback.timeout(),
        }
    }

    pub fn with_warmup(mut self, warmup: Duration) -> Self {
        self.warmup = warmup;
        self
    }
}

impl std::fmt::Debug for LibraryCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LibraryCapture")
            .field("provider", &self.provider.name())
            .field("warmup", &self.warmup)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl CaptureStrategy for LibraryCapture {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn method(&self) -> CaptureMethod {
        CaptureMethod::Fallback
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn attempt(
        &self,
        camera: &CameraConfig,
        output: &Path,
        scope: &AttemptScope,
    ) -> Result<(), CaptureError> {
        let provider = Arc::clone(&self.provider);
        let camera = camera.clone();
        let output = output.to_path_buf();
        let settings = OpenSettings {
            device_path: camera.device_path.clone(),
            resolution: camera.capture_resolution,
            fps: self.fps,
            format: PixelFormat::Mjpeg,
        };
        let warmup = self.warmup;
        let quality = self.jpeg_quality;
        let scope = scope.clone();

        tokio::task::spawn_blocking(move || {
            if scope.is_abandoned() {
                return Err(CaptureError::Abandoned);
            }
            let frame = read_frame(provider.as_ref(), &camera, &settings, warmup)?;
            publish(frame, &output, quality, &scope)
        })
        .await
        .map_err(|e| CaptureError::TaskFailed(e.to_string()))?
    }
}

fn read_frame(
    provider: &dyn CameraProvider,
    camera: &CameraConfig,
    settings: &OpenSettings,
    warmup: Duration,
) -> Result<Frame, CaptureError> {
    let mut device = provider.create(&camera.device_path);
    device.open(settings)?;
    if !warmup.is_zero() {
        std::thread::sleep(warmup);
    }
    let frame = device.capture();
    device.close();

    let mut frame = frame?;
    if camera.rotate180 {
        frame.rotate_180();
    }
    tracing::debug!(camera = %camera.id, ?frame, "Fallback frame captured");
    Ok(frame)
}

/// Encodes next to `output` and renames into place unless `scope` was
/// abandoned meanwhile.
fn publish(
    frame: Frame,
    output: &Path,
    jpeg_quality: u8,
    scope: &AttemptScope,
) -> Result<(), CaptureError> {
    let staging = staging_path(output);
    let renamed = save_frame(frame, &staging, jpeg_quality).and_then(|()| {
        scope
            .commit(|| std::fs::rename(&staging, output))
            .ok_or(CaptureError::Abandoned)?
            .map_err(|e| CaptureError::Output {
                path: output.to_path_buf(),
                reason: e.to_string(),
            })
    });
    if renamed.is_err() {
        let _ = std::fs::remove_file(&staging);
    }
    renamed
}

/// Hidden sibling of `output` with the same extension.
fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}"))
}

/// Encodes `frame` to `path`; the format follows the file extension.
pub fn save_frame(frame: Frame, path: &Path, jpeg_quality: u8) -> Result<(), CaptureError> {
    let encoding = |e: &dyn std::fmt::Display| CaptureError::EncodingFailure(e.to_string());

    let format = ImageFormat::from_path(path).map_err(|e| encoding(&e))?;
    let image = frame
        .into_rgb_image()
        .ok_or_else(|| encoding(&"frame buffer does not match its dimensions"))?;

    if format == ImageFormat::Jpeg {
        let file = File::create(path).map_err(|e| encoding(&e))?;
        let mut writer = BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, jpeg_quality)
            .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
            .map_err(|e| encoding(&e))?;
        writer.flush().map_err(|e| encoding(&e))?;
    } else {
        image
            .save_with_format(path, format)
            .map_err(|e| encoding(&e))?;
    }
    Ok(())
}
