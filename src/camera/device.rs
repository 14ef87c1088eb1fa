//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.
//! Cameras are created per session by a [`CameraProvider`] on the thread that
//! will use them, so implementations need not be `Send`.

use super::Frame;
use crate::registry::Resolution;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open {device}: {reason}")]
    OpenFailed { device: String, reason: String },
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera not initialized")]
    NotInitialized,
    #[error("camera backend unavailable: {0}")]
    Unsupported(String),
}

/// Pixel format requested from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion JPEG, used for high-resolution stills.
    Mjpeg,
    /// Packed YUV 4:2:2, used for preview.
    Yuyv,
}

/// Parameters for opening a camera session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSettings {
    /// Device node, e.g. `/dev/video0`.
    pub device_path: String,
    /// Requested frame size.
    pub resolution: Resolution,
    /// Requested frame rate.
    pub fps: u32,
    /// Requested pixel format.
    pub format: PixelFormat,
}

/// Trait for camera implementations.
pub trait Camera {
    /// Opens and initializes the camera with the given settings.
    fn open(&mut self, settings: &OpenSettings) -> Result<(), CameraError>;

    /// Captures a single frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases the device handle.
    fn close(&mut self);
}

/// Creates camera sessions for device paths.
pub trait CameraProvider: Send + Sync {
    /// Short backend name used in diagnostics.
    fn name(&self) -> &str;

    /// Creates an unopened camera for `device_path`.
    fn create(&self, device_path: &str) -> Box<dyn Camera>;
}

/// Provider used when the crate is built without a camera backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedProvider;

impl CameraProvider for UnsupportedProvider {
    fn name(&self) -> &str {
        "none"
    }

    fn create(&self, _device_path: &str) -> Box<dyn Camera> {
        Box::new(UnsupportedCamera)
    }
}

struct UnsupportedCamera;

impl Camera for UnsupportedCamera {
    fn open(&mut self, _settings: &OpenSettings) -> Result<(), CameraError> {
        Err(CameraError::Unsupported(
            "built without the `camera` feature".to_owned(),
        ))
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        Err(CameraError::NotInitialized)
    }

    fn is_open(&self) -> bool {
        false
    }

    fn close(&mut self) {}
}

/// Returns the camera provider compiled into this build.
pub fn default_provider() -> Arc<dyn CameraProvider> {
    #[cfg(feature = "camera")]
    {
        Arc::new(super::NokhwaProvider)
    }
    #[cfg(not(feature = "camera"))]
    {
        Arc::new(UnsupportedProvider)
    }
}

/// Behaviour knobs for [`MockCamera`].
#[derive(Debug, Clone, Default)]
pub struct MockBehavior {
    /// Refuse to open.
    pub fail_open: bool,
    /// Fail every n-th read (1 = every read).
    pub fail_every: Option<u64>,
    /// Simulated per-frame latency.
    pub read_latency: Duration,
}

/// Tracks how many mock sessions hold each device at once.
#[derive(Debug, Default)]
pub struct DeviceUsage {
    devices: Mutex<HashMap<String, Arc<UsageCounters>>>,
}

#[derive(Debug, Default)]
struct UsageCounters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    opens: AtomicUsize,
    reads: AtomicUsize,
}

impl DeviceUsage {
    fn counters(&self, device: &str) -> Arc<UsageCounters> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(devices.entry(device.to_owned()).or_default())
    }

    /// Highest number of simultaneously open sessions seen for `device`.
    pub fn max_concurrent(&self, device: &str) -> usize {
        self.counters(device).max_active.load(Ordering::SeqCst)
    }

    /// Total successful opens for `device`.
    pub fn opens(&self, device: &str) -> usize {
        self.counters(device).opens.load(Ordering::SeqCst)
    }

    /// Total frame reads attempted on `device`.
    pub fn reads(&self, device: &str) -> usize {
        self.counters(device).reads.load(Ordering::SeqCst)
    }
}

/// Mock camera that generates a deterministic synthetic scene.
///
/// Pixel `(x, y)` of frame `n` is `[x, y, x + y + n]` (each wrapping at 256),
/// so the first frame of every session is identical.
#[derive(Debug)]
pub struct MockCamera {
    device: String,
    settings: Option<OpenSettings>,
    behavior: MockBehavior,
    usage: Arc<DeviceUsage>,
    sequence: u64,
}

impl MockCamera {
    /// Creates a mock camera for `device` that always succeeds.
    pub fn new(device: impl Into<String>) -> Self {
        Self::with_behavior(device, MockBehavior::default(), Arc::default())
    }

    /// Creates a mock camera with explicit behaviour and usage tracking.
    pub fn with_behavior(
        device: impl Into<String>,
        behavior: MockBehavior,
        usage: Arc<DeviceUsage>,
    ) -> Self {
        Self {
            device: device.into(),
            settings: None,
            behavior,
            usage,
            sequence: 0,
        }
    }
}

impl Camera for MockCamera {
    fn open(&mut self, settings: &OpenSettings) -> Result<(), CameraError> {
        if self.behavior.fail_open {
            return Err(CameraError::OpenFailed {
                device: self.device.clone(),
                reason: "mock configured to fail".to_owned(),
            });
        }
        if self.settings.is_none() {
            let counters = self.usage.counters(&self.device);
            let active = counters.active.fetch_add(1, Ordering::SeqCst) + 1;
            counters.max_active.fetch_max(active, Ordering::SeqCst);
            counters.opens.fetch_add(1, Ordering::SeqCst);
        }
        self.settings = Some(settings.clone());
        self.sequence = 0;
        tracing::debug!(device = %self.device, resolution = %settings.resolution, "MockCamera opened");
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let settings = self.settings.as_ref().ok_or(CameraError::NotInitialized)?;
        self.usage
            .counters(&self.device)
            .reads
            .fetch_add(1, Ordering::SeqCst);

        if !self.behavior.read_latency.is_zero() {
            std::thread::sleep(self.behavior.read_latency);
        }

        self.sequence += 1;
        if let Some(every) = self.behavior.fail_every {
            if every > 0 && self.sequence % every == 0 {
                return Err(CameraError::CaptureFailed(format!(
                    "mock read {} failed",
                    self.sequence
                )));
            }
        }

        let Resolution { width, height } = settings.resolution;
        let seq = self.sequence;
        let pixels = (0..height)
            .flat_map(|y| {
                (0..width).flat_map(move |x| {
                    [
                        (x % 256) as u8,
                        (y % 256) as u8,
                        ((u64::from(x) + u64::from(y) + seq) % 256) as u8,
                    ]
                })
            })
            .collect();

        Ok(Frame::new(pixels, width, height, seq))
    }

    fn is_open(&self) -> bool {
        self.settings.is_some()
    }

    fn close(&mut self) {
        if self.settings.take().is_some() {
            self.usage
                .counters(&self.device)
                .active
                .fetch_sub(1, Ordering::SeqCst);
            tracing::debug!(device = %self.device, "MockCamera closed");
        }
    }
}

impl Drop for MockCamera {
    fn drop(&mut self) {
        self.close();
    }
}

/// Provider handing out [`MockCamera`]s with per-device behaviour.
#[derive(Debug, Default)]
pub struct MockCameraProvider {
    behaviors: HashMap<String, MockBehavior>,
    default_behavior: MockBehavior,
    usage: Arc<DeviceUsage>,
}

impl MockCameraProvider {
    /// Creates a provider whose cameras always succeed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the behaviour for one device path.
    pub fn with_device(mut self, device: impl Into<String>, behavior: MockBehavior) -> Self {
        self.behaviors.insert(device.into(), behavior);
        self
    }

    /// Sets the behaviour for devices without an override.
    pub fn with_default(mut self, behavior: MockBehavior) -> Self {
        self.default_behavior = behavior;
        self
    }

    /// Shared usage tracker for assertions.
    pub fn usage(&self) -> Arc<DeviceUsage> {
        Arc::clone(&self.usage)
    }
}

impl CameraProvider for MockCameraProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn create(&self, device_path: &str) -> Box<dyn Camera> {
        let behavior = self
            .behaviors
            .get(device_path)
            .cloned()
            .unwrap_or_else(|| self.default_behavior.clone());
        Box::new(MockCamera::with_behavior(
            device_path,
            behavior,
            Arc::clone(&self.usage),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> OpenSettings {
        OpenSettings {
            device_path: "/dev/mock0".to_owned(),
            resolution: Resolution::new(8, 6),
            fps: 20,
            format: PixelFormat::Yuyv,
        }
    }

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new("/dev/mock0");
        assert!(!camera.is_open());

        camera.open(&settings()).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.pixel_at(3, 2), Some([3, 2, 6]));

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new("/dev/mock0");
        assert!(matches!(camera.capture(), Err(CameraError::NotInitialized)));
    }

    #[test]
    fn test_periodic_read_failures() {
        let behavior = MockBehavior {
            fail_every: Some(2),
            ..Default::default()
        };
        let mut camera = MockCamera::with_behavior("/dev/mock0", behavior, Arc::default());
        camera.open(&settings()).unwrap();

        assert!(camera.capture().is_ok());
        assert!(matches!(camera.capture(), Err(CameraError::CaptureFailed(_))));
        assert!(camera.capture().is_ok());
    }

    #[test]
    fn test_usage_tracks_overlapping_sessions() {
        let provider = MockCameraProvider::new();
        let usage = provider.usage();

        let mut first = provider.create("/dev/mock0");
        let mut second = provider.create("/dev/mock0");
        first.open(&settings()).unwrap();
        second.open(&settings()).unwrap();
        second.close();
        drop(first);

        assert_eq!(usage.max_concurrent("/dev/mock0"), 2);
        assert_eq!(usage.opens("/dev/mock0"), 2);
        assert_eq!(usage.max_concurrent("/dev/mock1"), 0);
    }

    #[test]
    fn test_unsupported_provider_refuses_to_open() {
        let mut camera = UnsupportedProvider.create("/dev/video0");
        assert!(matches!(
            camera.open(&settings()),
            Err(CameraError::Unsupported(_))
        ));
    }
}
