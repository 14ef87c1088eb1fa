//! Metrics collection and registry.

use crate::capture::{BatchCaptureResult, CaptureResult};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Buckets for capture durations, in seconds. Full-resolution stills take a
/// few seconds; the top buckets catch timeouts.
const DURATION_BUCKETS: &[f64] = &[0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 15.0, 30.0, 60.0];

/// Prometheus metrics for capture, preview and focus.
pub struct CaptureMetrics {
    registry: Registry,

    // Capture metrics
    captures_total: IntCounterVec,
    capture_duration: HistogramVec,
    batches_total: IntCounter,
    batch_duration: Histogram,

    // Preview metrics
    preview_frames: IntCounterVec,
    preview_read_failures: IntCounterVec,

    // Focus metrics
    focus_failures: IntCounterVec,
}

impl CaptureMetrics {
    /// Creates a registry with every metric registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let captures_total = IntCounterVec::new(
            Opts::new(
                "multicam_captures_total",
                "Capture results by camera, method and status",
            ),
            &["camera", "method", "status"],
        )?;
        let capture_duration = HistogramVec::new(
            HistogramOpts::new(
                "multicam_capture_duration_seconds",
                "Wall time of one camera capture including fallback",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["camera"],
        )?;
        let batches_total =
            IntCounter::new("multicam_batches_total", "Number of capture batches run")?;
        let batch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "multicam_batch_duration_seconds",
                "Wall time of one batch across all cameras",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
        )?;

        let preview_frames = IntCounterVec::new(
            Opts::new(
                "multicam_preview_frames_total",
                "Preview frames delivered per camera",
            ),
            &["camera"],
        )?;
        let preview_read_failures = IntCounterVec::new(
            Opts::new(
                "multicam_preview_read_failures_total",
                "Failed preview reads per camera",
            ),
            &["camera"],
        )?;

        let focus_failures = IntCounterVec::new(
            Opts::new(
                "multicam_focus_failures_total",
                "Focus changes that could not be applied",
            ),
            &["camera"],
        )?;

        registry.register(Box::new(captures_total.clone()))?;
        registry.register(Box::new(capture_duration.clone()))?;
        registry.register(Box::new(batches_total.clone()))?;
        registry.register(Box::new(batch_duration.clone()))?;
        registry.register(Box::new(preview_frames.clone()))?;
        registry.register(Box::new(preview_read_failures.clone()))?;
        registry.register(Box::new(focus_failures.clone()))?;

        Ok(Self {
            registry,
            captures_total,
            capture_duration,
            batches_total,
            batch_duration,
            preview_frames,
            preview_read_failures,
            focus_failures,
        })
    }

    /// Records one camera's capture outcome.
    pub fn record_capture(&self, result: &CaptureResult) {
        self.captures_total
            .with_label_values(&[
                result.camera_id.as_str(),
                result.method.as_str(),
                result.status().as_str(),
            ])
            .inc();
        self.capture_duration
            .with_label_values(&[result.camera_id.as_str()])
            .observe(result.elapsed.as_secs_f64());
    }

    /// Records a finished batch. Per-camera results are recorded separately.
    pub fn record_batch(&self, batch: &BatchCaptureResult) {
        self.batches_total.inc();
        self.batch_duration.observe(batch.elapsed.as_secs_f64());
    }

    pub fn record_preview_frame(&self, camera_id: &str) {
        self.preview_frames.with_label_values(&[camera_id]).inc();
    }

    pub fn record_preview_failure(&self, camera_id: &str) {
        self.preview_read_failures
            .with_label_values(&[camera_id])
            .inc();
    }

    pub fn record_focus_failure(&self, camera_id: &str) {
        self.focus_failures.with_label_values(&[camera_id]).inc();
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl std::fmt::Debug for CaptureMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureMetrics")
            .field("batches_total", &self.batches_total.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::CaptureMethod;
    use chrono::Local;
    use std::time::Duration;

    #[test]
    fn test_registry_creation() {
        assert!(CaptureMetrics::new().is_ok());
    }

    #[test]
    fn test_capture_counts_by_label() {
        let metrics = CaptureMetrics::new().unwrap();
        let ok = CaptureResult::success(
            "video0",
            CaptureMethod::Primary,
            "captures/a.jpg".into(),
            Duration::from_millis(1200),
        );
        let failed = CaptureResult::failure(
            "video2",
            CaptureMethod::Fallback,
            "fswebcam: not installed; mock: open failed",
            Duration::from_millis(300),
        );
        metrics.record_capture(&ok);
        metrics.record_capture(&failed);
        metrics.record_batch(&BatchCaptureResult::new(
            1,
            Local::now(),
            Duration::from_secs(2),
            vec![ok, failed],
        ));

        let output = metrics.encode().unwrap();
        assert!(output.contains(
            r#"multicam_captures_total{camera="video0",method="primary",status="success"} 1"#
        ));
        assert!(output.contains(
            r#"multicam_captures_total{camera="video2",method="fallback",status="failure"} 1"#
        ));
        assert!(output.contains("multicam_batches_total 1"));
        assert!(output.contains(r#"multicam_capture_duration_seconds_count{camera="video0"} 1"#));
    }

    #[test]
    fn test_preview_and_focus_counters() {
        let metrics = CaptureMetrics::new().unwrap();
        metrics.record_preview_frame("video0");
        metrics.record_preview_frame("video0");
        metrics.record_preview_failure("video0");
        metrics.record_focus_failure("video2");

        let output = metrics.encode().unwrap();
        assert!(output.contains(r#"multicam_preview_frames_total{camera="video0"} 2"#));
        assert!(output.contains(r#"multicam_preview_read_failures_total{camera="video0"} 1"#));
        assert!(output.contains(r#"multicam_focus_failures_total{camera="video2"} 1"#));
    }
}
