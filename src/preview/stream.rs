//! One preview loop on its own thread.

use crate::camera::{CameraProvider, DeviceLock, Frame, OpenSettings, PixelFormat};
use crate::metrics::CaptureMetrics;
use crate::registry::{CameraConfig, PreviewConfig};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long one wait for the device lock lasts before the stop flag is
/// checked again.
const LOCK_POLL: Duration = Duration::from_millis(50);

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Timing knobs for preview loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewSettings {
    pub fps: u32,
    pub retry_delay: Duration,
    pub reopen_delay: Duration,
}

impl PreviewSettings {
    pub fn from_config(config: &PreviewConfig) -> Self {
        Self {
            fps: config.fps,
            retry_delay: config.retry_delay(),
            reopen_delay: config.reopen_delay(),
        }
    }

    fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self::from_config(&PreviewConfig::default())
    }
}

/// Counters for one preview loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    /// Frames published to the latest-frame slot.
    pub frames: u64,
    /// Reads that returned an error and were skipped.
    pub read_failures: u64,
    /// Opens that failed.
    pub open_failures: u64,
    /// Times the loop let go of the device for a still capture.
    pub pauses: u64,
}

#[derive(Debug, Default)]
struct Shared {
    latest: Mutex<Option<Arc<Frame>>>,
    frames: AtomicU64,
    read_failures: AtomicU64,
    open_failures: AtomicU64,
    pauses: AtomicU64,
}

/// A running preview loop for one camera.
#[derive(Debug)]
pub struct PreviewStream {
    camera_id: String,
    stop: Arc<AtomicBool>,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PreviewStream {
    /// Starts the loop on a new thread.
    pub fn spawn(
        camera: CameraConfig,
        provider: Arc<dyn CameraProvider>,
        lock: Arc<DeviceLock>,
        settings: PreviewSettings,
        metrics: Option<Arc<CaptureMetrics>>,
    ) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared::default());
        let camera_id = camera.id.clone();

        let worker = Worker {
            camera,
            provider,
            lock,
            settings,
            metrics,
            stop: Arc::clone(&stop),
            shared: Arc::clone(&shared),
        };
        let handle = thread::Builder::new()
            .name(format!("preview-{camera_id}"))
            .spawn(move || worker.run())?;

        Ok(Self {
            camera_id,
            stop,
            shared,
            handle: Some(handle),
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Most recent frame, already rotated if the camera is mounted upside down.
    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> PreviewStats {
        PreviewStats {
            frames: self.shared.frames.load(Ordering::Relaxed),
            read_failures: self.shared.read_failures.load(Ordering::Relaxed),
            open_failures: self.shared.open_failures.load(Ordering::Relaxed),
            pauses: self.shared.pauses.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Requests the loop to end and waits for it. The device is closed and
    /// released before this returns.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(camera = %self.camera_id, "Preview thread panicked");
            }
        }
    }
}

impl Drop for PreviewStream {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    camera: CameraConfig,
    provider: Arc<dyn CameraProvider>,
    lock: Arc<DeviceLock>,
    settings: PreviewSettings,
    metrics: Option<Arc<CaptureMetrics>>,
    stop: Arc<AtomicBool>,
    shared: Arc<Shared>,
}

impl Worker {
    fn stopping(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn run(self) {
        let open = OpenSettings {
            device_path: self.camera.device_path.clone(),
            resolution: self.camera.preview_resolution,
            fps: self.settings.fps,
            format: PixelFormat::Yuyv,
        };
        tracing::info!(camera = %self.camera.id, device = %open.device_path, "Preview loop started");

        while !self.stopping() {
            let Some(guard) = self.lock.acquire_preview(LOCK_POLL) else {
                continue;
            };

            let mut device = self.provider.create(&self.camera.device_path);
            if let Err(e) = device.open(&open) {
                self.shared.open_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(camera = %self.camera.id, error = %e, "Preview open failed");
                drop(device);
                drop(guard);
                self.sleep(self.settings.reopen_delay);
                continue;
            }

            self.stream(device.as_mut());
            device.close();
            drop(guard);
        }

        tracing::info!(camera = %self.camera.id, "Preview loop stopped");
    }

    /// Reads frames until stopped or a capture wants the device.
    fn stream(&self, device: &mut dyn crate::camera::Camera) {
        let interval = self.settings.frame_interval();
        loop {
            if self.stopping() {
                return;
            }
            if self.lock.capture_pending() {
                self.shared.pauses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(camera = %self.camera.id, "Preview paused for capture");
                return;
            }

            let started = Instant::now();
            match device.capture() {
                Ok(mut frame) => {
                    if self.camera.rotate180 {
                        frame.rotate_180();
                    }
                    *self
                        .shared
                        .latest
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
                    self.shared.frames.fetch_add(1, Ordering::Relaxed);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_preview_frame(&self.camera.id);
                    }
                    if let Some(rest) = interval.checked_sub(started.elapsed()) {
                        self.sleep(rest);
                    }
                }
                Err(e) => {
                    self.shared.read_failures.fetch_add(1, Ordering::Relaxed);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_preview_failure(&self.camera.id);
                    }
                    tracing::debug!(camera = %self.camera.id, error = %e, "Preview read failed");
                    self.sleep(self.settings.retry_delay);
                }
            }
        }
    }

    /// Sleeps for `total`, waking early on stop or a pending capture.
    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            let now = Instant::now();
            if now >= deadline || self.stopping() || self.lock.capture_pending() {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}
