//! Ordered capture strategies for one camera.

use super::{
    CaptureError, CaptureMethod, CaptureResult, ExternalToolCapture, FocusControl,
    LibraryCapture, NoFocusControl, OutputLayout, V4l2Focus,
};
use crate::camera::{CameraProvider, DeviceGuard, DeviceLocks};
use crate::metrics::CaptureMetrics;
use crate::registry::{AppConfig, CameraConfig, FocusSetting};
use async_trait::async_trait;
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One way of producing a still image.
#[async_trait]
pub trait CaptureStrategy: Send + Sync {
    /// Short name used in failure details, e.g. `fswebcam`.
    fn name(&self) -> &str;

    /// Which path this strategy represents.
    fn method(&self) -> CaptureMethod;

    /// Upper bound for one attempt.
    fn timeout(&self) -> Duration;

    /// Writes one still of `camera` to `output`.
    ///
    /// Work that can outlive this future (a blocking read) must hold a clone
    /// of `scope` and publish through [`AttemptScope::commit`].
    async fn attempt(
        &self,
        camera: &CameraConfig,
        output: &Path,
        scope: &AttemptScope,
    ) -> Result<(), CaptureError>;
}

/// One strategy attempt's hold on its device and its output.
///
/// Every clone keeps the device reserved, so blocking work still running
/// after a timeout keeps previews off the device until it ends. Once the
/// attempt is abandoned, [`commit`](Self::commit) refuses to publish.
#[derive(Debug, Clone, Default)]
pub struct AttemptScope {
    _guard: Option<Arc<DeviceGuard>>,
    abandoned: Arc<Mutex<bool>>,
}

impl AttemptScope {
    /// A scope holding no device, for running a strategy on its own.
    pub fn detached() -> Self {
        Self::default()
    }

    fn holding(guard: Arc<DeviceGuard>) -> Self {
        Self {
            _guard: Some(guard),
            abandoned: Arc::default(),
        }
    }

    pub fn is_abandoned(&self) -> bool {
        *self.abandoned.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks the attempt as given up. Waits for a `commit` already in
    /// progress, so after this returns no further output is published.
    pub fn abandon(&self) {
        *self.abandoned.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    /// Runs `publish` unless the attempt was abandoned.
    pub fn commit<T>(&self, publish: impl FnOnce() -> T) -> Option<T> {
        let abandoned = self.abandoned.lock().unwrap_or_else(PoisonError::into_inner);
        if *abandoned {
            return None;
        }
        Some(publish())
    }
}

/// Runs the strategy chain for a single camera.
///
/// Holds the device exclusively for the whole call, applies focus (best
/// effort) and returns the first successful strategy's image. If every
/// strategy fails, the failure detail lists each one's cause in order.
pub struct StillCapture {
    strategies: Vec<Arc<dyn CaptureStrategy>>,
    focus: Arc<dyn FocusControl>,
    layout: OutputLayout,
    locks: Arc<DeviceLocks>,
    lock_timeout: Duration,
    metrics: Option<Arc<CaptureMetrics>>,
}

impl StillCapture {
    /// Creates a chain with no focus control and a private lock table.
    pub fn new(strategies: Vec<Arc<dyn CaptureStrategy>>, layout: OutputLayout) -> Self {
        Self {
            strategies,
            focus: Arc::new(NoFocusControl),
            layout,
            locks: Arc::new(DeviceLocks::new()),
            lock_timeout: Duration::from_secs(3),
            metrics: None,
        }
    }

    /// Builds the primary/fallback chain described by `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn CameraProvider>,
        locks: Arc<DeviceLocks>,
    ) -> Self {
        let mut strategies: Vec<Arc<dyn CaptureStrategy>> = Vec::new();
        if config.primary.enabled {
            strategies.push(Arc::new(ExternalToolCapture::from_config(
                &config.primary,
                &config.output,
            )));
        }
        if config.fallback.enabled {
            strategies.push(Arc::new(LibraryCapture::from_config(
                provider,
                &config.fallback,
                &config.output,
            )));
        }

        Self::new(strategies, OutputLayout::from_config(&config.output))
            .with_focus(Arc::new(V4l2Focus::from_config(&config.focus)))
            .with_locks(locks)
            .with_lock_timeout(config.preview.release_timeout())
    }

    pub fn with_focus(mut self, focus: Arc<dyn FocusControl>) -> Self {
        self.focus = focus;
        self
    }

    /// Shares the device lock table with the preview loops.
    pub fn with_locks(mut self, locks: Arc<DeviceLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CaptureMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn strategies(&self) -> &[Arc<dyn CaptureStrategy>] {
        &self.strategies
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    /// Applies focus to a device without capturing.
    pub async fn apply_focus(
        &self,
        camera: &CameraConfig,
        focus: FocusSetting,
    ) -> Result<(), super::FocusError> {
        let result = self.focus.apply(&camera.device_path, focus).await;
        if let Err(e) = &result {
            tracing::warn!(camera = %camera.id, device = %camera.device_path, error = %e, "Failed to set focus");
            if let Some(metrics) = &self.metrics {
                metrics.record_focus_failure(&camera.id);
            }
        }
        result
    }

    /// Captures one still of `camera` using `focus`.
    pub async fn capture(&self, camera: &CameraConfig, focus: FocusSetting) -> CaptureResult {
        let started = Instant::now();
        let mut method = self
            .strategies
            .first()
            .map_or(CaptureMethod::Primary, |s| s.method());

        if self.strategies.is_empty() {
            return CaptureResult::failure(
                &camera.id,
                method,
                "no capture strategies configured",
                started.elapsed(),
            );
        }

        let lock = self.locks.lock_for(&camera.device_path);
        let wait = self.lock_timeout;
        let acquired = tokio::task::spawn_blocking(move || lock.acquire_capture(wait))
            .await
            .map_err(|e| CaptureError::TaskFailed(e.to_string()))
            .and_then(|r| r.map_err(CaptureError::from));
        let guard = match acquired {
            Ok(guard) => Arc::new(guard),
            Err(e) => {
                tracing::warn!(camera = %camera.id, error = %e, "Device unavailable for capture");
                return CaptureResult::failure(&camera.id, method, e.to_string(), started.elapsed());
            }
        };

        // Focus is best effort; apply_focus already logged the failure.
        let _ = self.apply_focus(camera, focus).await;

        let mut causes = Vec::with_capacity(self.strategies.len());
        for strategy in &self.strategies {
            method = strategy.method();
            match self.attempt(strategy.as_ref(), camera, &guard).await {
                Ok(path) => {
                    let elapsed = started.elapsed();
                    tracing::info!(
                        camera = %camera.id,
                        method = %method,
                        path = %path.display(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Photo saved"
                    );
                    return CaptureResult::success(&camera.id, method, path, elapsed);
                }
                Err(e) => {
                    tracing::warn!(
                        camera = %camera.id,
                        strategy = strategy.name(),
                        error = %e,
                        "Capture attempt failed"
                    );
                    causes.push(format!("{}: {e}", strategy.name()));
                }
            }
        }

        CaptureResult::failure(&camera.id, method, causes.join("; "), started.elapsed())
    }

    async fn attempt(
        &self,
        strategy: &dyn CaptureStrategy,
        camera: &CameraConfig,
        guard: &Arc<DeviceGuard>,
    ) -> Result<PathBuf, CaptureError> {
        let path = self
            .layout
            .reserve(&camera.id, strategy.method(), Local::now())
            .await
            .map_err(|e| CaptureError::Output {
                path: self.layout.directory().to_path_buf(),
                reason: e.to_string(),
            })?;

        tracing::debug!(
            camera = %camera.id,
            strategy = strategy.name(),
            path = %path.display(),
            "Attempting capture"
        );

        let scope = AttemptScope::holding(Arc::clone(guard));
        let timeout = strategy.timeout();
        let outcome = match tokio::time::timeout(timeout, strategy.attempt(camera, &path, &scope)).await {
            Ok(Ok(())) => verify_output(&path).await,
            Ok(Err(e)) => Err(e),
            Err(_) => Err(CaptureError::Timeout(timeout)),
        };

        match outcome {
            Ok(()) => Ok(path),
            Err(e) => {
                scope.abandon();
                if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                    if let Err(remove) = tokio::fs::remove_file(&path).await {
                        tracing::debug!(path = %path.display(), error = %remove, "Could not remove partial output");
                    }
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for StillCapture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.strategies.iter().map(|s| s.name()).collect();
        f.debug_struct("StillCapture")
            .field("strategies", &names)
            .field("layout", &self.layout)
            .field("lock_timeout", &self.lock_timeout)
            .finish()
    }
}

async fn verify_output(path: &Path) -> Result<(), CaptureError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(CaptureError::NoOutput(path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Holder, MockCameraProvider};
    use crate::capture::{CaptureStatus, FocusError};
    use crate::registry::Resolution;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Strategy with scripted behaviour.
    struct Scripted {
        name: &'static str,
        method: CaptureMethod,
        delay: Duration,
        timeout: Duration,
        write: bool,
        fail: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(name: &'static str, method: CaptureMethod) -> Self {
            Self {
                name,
                method,
                delay: Duration::ZERO,
                timeout: Duration::from_secs(5),
                write: true,
                fail: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(name: &'static str, method: CaptureMethod, reason: &'static str) -> Self {
            Self {
                fail: Some(reason),
                ..Self::ok(name, method)
            }
        }
    }

    #[async_trait]
    impl CaptureStrategy for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn method(&self) -> CaptureMethod {
            self.method
        }

        fn timeout(&self) -> Duration {
            self.timeout
        }

        async fn attempt(
            &self,
            _camera: &CameraConfig,
            output: &Path,
            _scope: &AttemptScope,
        ) -> Result<(), CaptureError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if let Some(reason) = self.fail {
                return Err(CaptureError::EncodingFailure(reason.to_owned()));
            }
            if self.write {
                tokio::fs::write(output, b"image").await.unwrap();
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingFocus {
        applied: Mutex<Vec<(String, FocusSetting)>>,
        fail: bool,
    }

    #[async_trait]
    impl FocusControl for RecordingFocus {
        async fn apply(&self, device: &str, focus: FocusSetting) -> Result<(), FocusError> {
            self.applied.lock().unwrap().push((device.to_owned(), focus));
            if self.fail {
                return Err(FocusError::ToolMissing("v4l2-ctl".to_owned()));
            }
            Ok(())
        }
    }

    fn camera() -> CameraConfig {
        CameraConfig::new(
            "video0",
            "/dev/mock0",
            Resolution::new(32, 24),
            Resolution::new(16, 12),
        )
    }

    fn chain(dir: &Path, strategies: Vec<Arc<dyn CaptureStrategy>>) -> StillCapture {
        StillCapture::new(strategies, OutputLayout::new(dir, "jpg"))
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let fallback = Arc::new(Scripted::ok("camera", CaptureMethod::Fallback));
        let capture = chain(
            dir.path(),
            vec![
                Arc::new(Scripted::ok("fswebcam", CaptureMethod::Primary)),
                fallback.clone(),
            ],
        );

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert_eq!(result.status(), CaptureStatus::Success);
        assert_eq!(result.method, CaptureMethod::Primary);
        assert!(result.image_path().unwrap().exists());
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_primary_failure_uses_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let capture = chain(
            dir.path(),
            vec![
                Arc::new(Scripted::failing("fswebcam", CaptureMethod::Primary, "exit 1")),
                Arc::new(Scripted::ok("camera", CaptureMethod::Fallback)),
            ],
        );

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert_eq!(result.status(), CaptureStatus::Success);
        assert_eq!(result.method, CaptureMethod::Fallback);
        let name = result.image_path().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(name.ends_with("_fallback.jpg"), "{name}");
    }

    #[tokio::test]
    async fn test_both_failures_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let capture = chain(
            dir.path(),
            vec![
                Arc::new(Scripted::failing("fswebcam", CaptureMethod::Primary, "primary broke")),
                Arc::new(Scripted::failing("camera", CaptureMethod::Fallback, "fallback broke")),
            ],
        );

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert_eq!(result.status(), CaptureStatus::Failure);
        assert_eq!(result.method, CaptureMethod::Fallback);
        let detail = result.error_detail().unwrap();
        assert!(detail.contains("fswebcam") && detail.contains("primary broke"), "{detail}");
        assert!(detail.contains("camera") && detail.contains("fallback broke"), "{detail}");
    }

    #[tokio::test]
    async fn test_missing_output_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let silent = Scripted {
            write: false,
            ..Scripted::ok("fswebcam", CaptureMethod::Primary)
        };
        let capture = chain(
            dir.path(),
            vec![
                Arc::new(silent),
                Arc::new(Scripted::ok("camera", CaptureMethod::Fallback)),
            ],
        );

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert_eq!(result.method, CaptureMethod::Fallback);
        assert!(result.is_success());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_primary_timeout_falls_back_within_bound() {
        let dir = tempfile::tempdir().unwrap();
        let slow = Scripted {
            delay: Duration::from_secs(10),
            timeout: Duration::from_millis(200),
            ..Scripted::ok("fswebcam", CaptureMethod::Primary)
        };
        let quick = Scripted {
            delay: Duration::from_millis(50),
            timeout: Duration::from_millis(500),
            ..Scripted::ok("camera", CaptureMethod::Fallback)
        };
        let capture = chain(dir.path(), vec![Arc::new(slow), Arc::new(quick)]);

        let started = Instant::now();
        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        let elapsed = started.elapsed();

        assert!(result.is_success());
        assert_eq!(result.method, CaptureMethod::Fallback);
        assert!(
            elapsed < Duration::from_millis(200 + 500 + 300),
            "took {elapsed:?}"
        );
    }

    #[tokio::test]
    async fn test_timeout_detail_mentions_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let slow = Scripted {
            delay: Duration::from_secs(10),
            timeout: Duration::from_millis(50),
            ..Scripted::ok("fswebcam", CaptureMethod::Primary)
        };
        let capture = chain(dir.path(), vec![Arc::new(slow)]);

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert!(result.error_detail().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_focus_applied_and_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let focus = Arc::new(RecordingFocus {
            fail: true,
            ..Default::default()
        });
        let capture = chain(
            dir.path(),
            vec![Arc::new(Scripted::ok("fswebcam", CaptureMethod::Primary))],
        )
        .with_focus(focus.clone());

        let result = capture.capture(&camera(), FocusSetting::Manual(42)).await;
        assert!(result.is_success());
        assert_eq!(
            *focus.applied.lock().unwrap(),
            [("/dev/mock0".to_owned(), FocusSetting::Manual(42))]
        );
    }

    #[tokio::test]
    async fn test_busy_device_fails_without_attempt() {
        let dir = tempfile::tempdir().unwrap();
        let locks = Arc::new(DeviceLocks::new());
        let primary = Arc::new(Scripted::ok("fswebcam", CaptureMethod::Primary));
        let capture = chain(dir.path(), vec![primary.clone()])
            .with_locks(Arc::clone(&locks))
            .with_lock_timeout(Duration::from_millis(50));

        let lock = locks.lock_for("/dev/mock0");
        let preview = lock.acquire_preview(Duration::ZERO).unwrap();
        assert_eq!(preview.holder(), Holder::Preview);

        let result = capture.capture(&camera(), FocusSetting::Auto).await;
        assert!(!result.is_success());
        assert!(result.error_detail().unwrap().contains("busy"));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_from_config_builds_primary_then_fallback() {
        let config = AppConfig::default();
        let capture = StillCapture::from_config(
            &config,
            Arc::new(MockCameraProvider::new()),
            Arc::new(DeviceLocks::new()),
        );
        let methods: Vec<_> = capture.strategies().iter().map(|s| s.method()).collect();
        assert_eq!(methods, [CaptureMethod::Primary, CaptureMethod::Fallback]);
        assert_eq!(capture.strategies()[0].name(), "fswebcam");
        assert_eq!(capture.strategies()[1].name(), "mock");
    }
}
