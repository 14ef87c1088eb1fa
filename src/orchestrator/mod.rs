//! Fan-out of still captures across every configured camera.
//!
//! A batch spawns one task per camera, so the batch takes about as long as
//! the slowest camera. Results come back in registry order no matter which
//! camera finishes first, and a failing or panicking camera never takes its
//! siblings down.

mod events;

pub use events::{channel, CaptureEvent, EventReceiver, EventSender};

use crate::capture::{
    BatchCaptureResult, CaptureError, CaptureMethod, CaptureResult, FocusError, StillCapture,
};
use crate::metrics::CaptureMetrics;
use crate::registry::{CameraConfig, FocusSetting, Registry};
use chrono::Local;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::task::JoinHandle;

/// Runs captures for the whole registry or a single camera.
pub struct Orchestrator {
    registry: Arc<Registry>,
    capture: Arc<StillCapture>,
    focus_overrides: RwLock<HashMap<String, FocusSetting>>,
    next_batch: AtomicU64,
    events: Option<EventSender>,
    metrics: Option<Arc<CaptureMetrics>>,
}

impl Orchestrator {
    pub fn new(registry: Arc<Registry>, capture: Arc<StillCapture>) -> Self {
        Self {
            registry,
            capture,
            focus_overrides: RwLock::new(HashMap::new()),
            next_batch: AtomicU64::new(0),
            events: None,
            metrics: None,
        }
    }

    /// Sends progress events to `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CaptureMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Focus used for the next capture of `camera`: the runtime override if
    /// one was set, else the configured value.
    pub fn focus_for(&self, camera: &CameraConfig) -> FocusSetting {
        self.focus_overrides
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&camera.id)
            .copied()
            .unwrap_or(camera.focus)
    }

    /// Captures every camera concurrently.
    pub async fn capture_all(&self) -> BatchCaptureResult {
        let batch_id = self.next_batch.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = Local::now();
        let started = Instant::now();
        let cameras = self.registry.len();

        tracing::info!(batch_id, cameras, "Capturing all cameras");
        self.emit(CaptureEvent::BatchStarted { batch_id, cameras });

        let handles: Vec<_> = self
            .registry
            .iter()
            .map(|camera| (camera.id.clone(), self.spawn_capture(camera, Some(batch_id))))
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for (camera_id, handle) in handles {
            results.push(self.join(camera_id, handle, Some(batch_id), started).await);
        }

        let batch = BatchCaptureResult::new(batch_id, started_at, started.elapsed(), results);
        if let Some(metrics) = &self.metrics {
            metrics.record_batch(&batch);
        }
        tracing::info!(
            batch_id,
            succeeded = batch.succeeded(),
            failed = batch.failed(),
            elapsed_ms = batch.elapsed.as_millis() as u64,
            "Batch finished"
        );
        self.emit(CaptureEvent::BatchFinished(batch.clone()));
        batch
    }

    /// Captures a single camera. Returns `None` for an unknown id.
    pub async fn capture_one(&self, camera_id: &str) -> Option<CaptureResult> {
        let camera = self.registry.get(camera_id)?;
        let started = Instant::now();
        let handle = self.spawn_capture(camera, None);
        Some(self.join(camera.id.clone(), handle, None, started).await)
    }

    /// Applies `focus` to a camera now and uses it for later captures.
    ///
    /// The override is kept even if applying it fails; the next capture
    /// tries again.
    pub async fn adjust_focus(&self, camera_id: &str, focus: FocusSetting) -> Result<(), FocusError> {
        let camera = self
            .registry
            .get(camera_id)
            .ok_or_else(|| FocusError::UnknownCamera(camera_id.to_owned()))?;
        if let FocusSetting::Manual(value) = focus {
            if !focus.in_range() {
                return Err(FocusError::OutOfRange(value));
            }
        }

        self.focus_overrides
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(camera.id.clone(), focus);

        let result = self.capture.apply_focus(camera, focus).await;
        tracing::info!(camera = %camera.id, focus = %focus, applied = result.is_ok(), "Focus override set");
        self.emit(CaptureEvent::FocusChanged {
            camera_id: camera.id.clone(),
            focus,
            applied: result.is_ok(),
        });
        result
    }

    fn spawn_capture(
        &self,
        camera: &CameraConfig,
        batch_id: Option<u64>,
    ) -> JoinHandle<CaptureResult> {
        let capture = Arc::clone(&self.capture);
        let camera = camera.clone();
        let focus = self.focus_for(&camera);
        let events = self.events.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            send(
                &events,
                CaptureEvent::CaptureStarted {
                    batch_id,
                    camera_id: camera.id.clone(),
                },
            );
            let result = capture.capture(&camera, focus).await;
            if let Some(metrics) = &metrics {
                metrics.record_capture(&result);
            }
            send(
                &events,
                CaptureEvent::CaptureFinished {
                    batch_id,
                    result: result.clone(),
                },
            );
            result
        })
    }

    async fn join(
        &self,
        camera_id: String,
        handle: JoinHandle<CaptureResult>,
        batch_id: Option<u64>,
        started: Instant,
    ) -> CaptureResult {
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(camera = %camera_id, error = %e, "Capture task failed");
                let method = self
                    .capture
                    .strategies()
                    .first()
                    .map_or(CaptureMethod::Primary, |s| s.method());
                let result = CaptureResult::failure(
                    camera_id,
                    method,
                    CaptureError::TaskFailed(e.to_string()).to_string(),
                    started.elapsed(),
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_capture(&result);
                }
                self.emit(CaptureEvent::CaptureFinished {
                    batch_id,
                    result: result.clone(),
                });
                result
            }
        }
    }

    fn emit(&self, event: CaptureEvent) {
        send(&self.events, event);
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cameras", &self.registry.len())
            .field("capture", &self.capture)
            .field("next_batch", &self.next_batch)
            .finish_non_exhaustive()
    }
}

fn send(events: &Option<EventSender>, event: CaptureEvent) {
    if let Some(tx) = events {
        // A closed receiver only means nobody is watching.
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AttemptScope, CaptureStrategy, OutputLayout};
    use crate::registry::Resolution;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::path::Path;
    use std::time::Duration;

    /// Sleeps per camera, then writes a file; panics or fails on request.
    #[derive(Default)]
    struct Sleepy {
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        panicking: Vec<String>,
    }

    #[async_trait]
    impl CaptureStrategy for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn method(&self) -> CaptureMethod {
            CaptureMethod::Primary
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(10)
        }

        async fn attempt(
            &self,
            camera: &CameraConfig,
            output: &Path,
            _scope: &AttemptScope,
        ) -> Result<(), CaptureError> {
            if let Some(delay) = self.delays.get(&camera.id) {
                tokio::time::sleep(*delay).await;
            }
            if self.panicking.contains(&camera.id) {
                panic!("driver crashed");
            }
            if self.failing.contains(&camera.id) {
                return Err(CaptureError::DeviceNotFound(camera.device_path.clone()));
            }
            tokio::fs::write(output, b"jpeg").await.unwrap();
            Ok(())
        }
    }

    fn registry(n: usize) -> Arc<Registry> {
        let cameras = (0..n)
            .map(|i| {
                CameraConfig::new(
                    format!("video{i}"),
                    format!("/dev/mock{i}"),
                    Resolution::new(64, 48),
                    Resolution::new(32, 24),
                )
            })
            .collect();
        Arc::new(Registry::new(cameras).unwrap())
    }

    fn orchestrator(registry: Arc<Registry>, strategy: Sleepy, dir: &Path) -> Orchestrator {
        let capture = StillCapture::new(vec![Arc::new(strategy)], OutputLayout::new(dir, "jpg"));
        Orchestrator::new(registry, Arc::new(capture))
    }

    fn ids(batch: &BatchCaptureResult) -> Vec<String> {
        batch.iter().map(|r| r.camera_id.clone()).collect()
    }

    #[tokio::test]
    async fn test_results_follow_registry_order() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = Sleepy {
            delays: [
                ("video0".to_owned(), Duration::from_millis(120)),
                ("video1".to_owned(), Duration::from_millis(60)),
                ("video2".to_owned(), Duration::ZERO),
            ]
            .into(),
            ..Default::default()
        };
        let orch = orchestrator(registry(3), strategy, dir.path());

        let batch = orch.capture_all().await;
        assert_eq!(ids(&batch), ["video0", "video1", "video2"]);
        assert!(batch.all_succeeded());
        assert_eq!(batch.batch_id, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cameras_capture_concurrently() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = Sleepy {
            delays: (0..3)
                .map(|i| (format!("video{i}"), Duration::from_secs(1)))
                .collect(),
            ..Default::default()
        };
        let orch = orchestrator(registry(3), strategy, dir.path());

        let started = Instant::now();
        let batch = orch.capture_all().await;
        let elapsed = started.elapsed();

        assert_eq!(batch.succeeded(), 3);
        assert!(elapsed < Duration::from_millis(1800), "took {elapsed:?}");
    }

    #[tokio::test]
    async fn test_failure_and_panic_do_not_affect_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let strategy = Sleepy {
            failing: vec!["video0".to_owned()],
            panicking: vec!["video1".to_owned()],
            ..Default::default()
        };
        let orch = orchestrator(registry(3), strategy, dir.path());

        let batch = orch.capture_all().await;
        assert_eq!(ids(&batch), ["video0", "video1", "video2"]);
        assert!(batch.results()[0].error_detail().unwrap().contains("not found"));
        assert!(batch.results()[1].error_detail().unwrap().contains("task failed"));
        assert!(batch.results()[2].is_success());
        assert_eq!((batch.succeeded(), batch.failed()), (1, 2));
    }

    #[tokio::test]
    async fn test_events_bracket_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, mut rx) = channel();
        let orch = orchestrator(registry(2), Sleepy::default(), dir.path()).with_events(tx);

        orch.capture_all().await;
        drop(orch);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(
            events.first(),
            Some(CaptureEvent::BatchStarted { batch_id: 1, cameras: 2 })
        ));
        assert!(matches!(events.last(), Some(CaptureEvent::BatchFinished(b)) if b.len() == 2));
        let finished = events
            .iter()
            .filter(|e| matches!(e, CaptureEvent::CaptureFinished { batch_id: Some(1), .. }))
            .count();
        assert_eq!(finished, 2);
    }

    #[tokio::test]
    async fn test_capture_one() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(registry(2), Sleepy::default(), dir.path());

        let result = orch.capture_one("video1").await.unwrap();
        assert_eq!(result.camera_id, "video1");
        assert!(result.is_success());
        assert!(orch.capture_one("video9").await.is_none());
    }

    #[tokio::test]
    async fn test_adjust_focus_records_override() {
        let dir = tempfile::tempdir().unwrap();
        let orch = orchestrator(registry(1), Sleepy::default(), dir.path());
        let camera = orch.registry().get("video0").unwrap().clone();
        assert_eq!(orch.focus_for(&camera), FocusSetting::Auto);

        orch.adjust_focus("video0", FocusSetting::Manual(64))
            .await
            .unwrap();
        assert_eq!(orch.focus_for(&camera), FocusSetting::Manual(64));
        assert_eq!(orch.registry().get("video0").unwrap().focus, FocusSetting::Auto);

        assert!(matches!(
            orch.adjust_focus("video0", FocusSetting::Manual(500)).await,
            Err(FocusError::OutOfRange(500))
        ));
        assert!(matches!(
            orch.adjust_focus("nope", FocusSetting::Auto).await,
            Err(FocusError::UnknownCamera(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_batch_has_one_result_per_camera_in_order(
            delays in prop::collection::vec(0u64..20, 1..6)
        ) {
            let dir = tempfile::tempdir().unwrap();
            let n = delays.len();
            let strategy = Sleepy {
                delays: delays
                    .iter()
                    .enumerate()
                    .map(|(i, ms)| (format!("video{i}"), Duration::from_millis(*ms)))
                    .collect(),
                ..Default::default()
            };
            let registry = registry(n);
            let expected: Vec<String> = registry.iter().map(|c| c.id.clone()).collect();
            let orch = orchestrator(registry, strategy, dir.path());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let batch = runtime.block_on(orch.capture_all());

            prop_assert_eq!(batch.len(), n);
            prop_assert_eq!(ids(&batch), expected);
        }
    }
}
