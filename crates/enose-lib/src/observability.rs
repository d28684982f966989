//! Observability for the detection pipeline
//!
//! Provides:
//! - Prometheus metrics (sample intake, scoring latency, outcomes, loaded models)
//! - Structured JSON log events with tracing

use crate::models::{DetectionReport, EnsembleOutcome};
use prometheus::{
    register_gauge, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, Gauge, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for scoring latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5,
];

/// Histogram buckets for detection window length (in seconds)
const WINDOW_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 15.0, 20.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<DetectorMetricsInner> = OnceLock::new();

struct DetectorMetricsInner {
    samples_accepted: IntCounter,
    samples_rejected: IntCounter,
    detections: IntCounterVec,
    scoring_latency_seconds: Histogram,
    detection_duration_seconds: Histogram,
    votes_cast: IntCounter,
    votes_skipped: IntCounter,
    last_confidence: Gauge,
    models_loaded: IntGauge,
    artifacts_rejected: IntCounter,
    device_connected: IntGauge,
    collecting: IntGauge,
}

impl DetectorMetricsInner {
    fn new() -> Self {
        Self {
            samples_accepted: register_int_counter!(
                "enose_samples_accepted_total",
                "Device lines accepted into a detection window"
            )
            .expect("Failed to register samples_accepted"),

            samples_rejected: register_int_counter!(
                "enose_samples_rejected_total",
                "Malformed device lines dropped while collecting"
            )
            .expect("Failed to register samples_rejected"),

            detections: register_int_counter_vec!(
                "enose_detections_total",
                "Closed detection windows by outcome",
                &["outcome"]
            )
            .expect("Failed to register detections"),

            scoring_latency_seconds: register_histogram!(
                "enose_scoring_latency_seconds",
                "Time spent extracting features and scoring the ensemble",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scoring_latency_seconds"),

            detection_duration_seconds: register_histogram!(
                "enose_detection_duration_seconds",
                "Wall time from window open to window close",
                WINDOW_BUCKETS.to_vec()
            )
            .expect("Failed to register detection_duration_seconds"),

            votes_cast: register_int_counter!(
                "enose_votes_cast_total",
                "Artifact votes counted towards a consensus"
            )
            .expect("Failed to register votes_cast"),

            votes_skipped: register_int_counter!(
                "enose_votes_skipped_total",
                "Active artifacts that could not score a window"
            )
            .expect("Failed to register votes_skipped"),

            last_confidence: register_gauge!(
                "enose_last_confidence_percent",
                "Ensemble confidence of the most recent consensus"
            )
            .expect("Failed to register last_confidence"),

            models_loaded: register_int_gauge!(
                "enose_models_loaded",
                "Model artifacts currently registered"
            )
            .expect("Failed to register models_loaded"),

            artifacts_rejected: register_int_counter!(
                "enose_artifacts_rejected_total",
                "Artifact files refused at load time"
            )
            .expect("Failed to register artifacts_rejected"),

            device_connected: register_int_gauge!(
                "enose_device_connected",
                "1 while the sensor device stream is open"
            )
            .expect("Failed to register device_connected"),

            collecting: register_int_gauge!(
                "enose_window_collecting",
                "1 while a detection window is collecting"
            )
            .expect("Failed to register collecting"),
        }
    }
}

/// Handle to the process-wide detector metrics
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct DetectorMetrics {
    _private: (),
}

impl Default for DetectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &DetectorMetricsInner {
        GLOBAL_METRICS.get_or_init(DetectorMetricsInner::new)
    }

    pub fn inc_samples_accepted(&self) {
        self.inner().samples_accepted.inc();
    }

    pub fn inc_samples_rejected(&self) {
        self.inner().samples_rejected.inc();
    }

    pub fn observe_scoring_latency(&self, duration_secs: f64) {
        self.inner().scoring_latency_seconds.observe(duration_secs);
    }

    pub fn observe_detection_duration(&self, duration_secs: f64) {
        self.inner()
            .detection_duration_seconds
            .observe(duration_secs);
    }

    pub fn record_votes(&self, cast: usize, skipped: usize) {
        self.inner().votes_cast.inc_by(cast as u64);
        self.inner().votes_skipped.inc_by(skipped as u64);
    }

    /// Count a closed window and remember its confidence
    pub fn record_outcome(&self, outcome: &EnsembleOutcome) {
        self.inner()
            .detections
            .with_label_values(&[outcome.kind()])
            .inc();
        if let Some(result) = outcome.result() {
            self.inner().last_confidence.set(result.confidence);
        }
    }

    pub fn set_models_loaded(&self, count: usize) {
        self.inner().models_loaded.set(count as i64);
    }

    pub fn inc_artifacts_rejected(&self, count: usize) {
        self.inner().artifacts_rejected.inc_by(count as u64);
    }

    pub fn set_device_connected(&self, connected: bool) {
        self.inner().device_connected.set(i64::from(connected));
    }

    pub fn set_collecting(&self, collecting: bool) {
        self.inner().collecting.set(i64::from(collecting));
    }
}

/// Structured logger for detector events
#[derive(Clone)]
pub struct StructuredLogger {
    device: String,
}

impl StructuredLogger {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn log_window_started(&self, generation: u64, duration_secs: u64) {
        info!(
            event = "window_started",
            device = %self.device,
            generation = generation,
            duration_secs = duration_secs,
            "Detection window opened"
        );
    }

    pub fn log_window_cancelled(&self, generation: u64, reason: &str) {
        info!(
            event = "window_cancelled",
            device = %self.device,
            generation = generation,
            reason = %reason,
            "Detection window cancelled"
        );
    }

    /// Log a scored window
    pub fn log_detection(&self, report: &DetectionReport) {
        match &report.outcome {
            EnsembleOutcome::Consensus(result) => {
                info!(
                    event = "detection_completed",
                    device = %self.device,
                    generation = report.id,
                    samples = report.samples_accepted,
                    rejected = report.samples_rejected,
                    label = %result.label,
                    confidence = result.confidence,
                    votes = result.votes.len(),
                    "Ensemble reached consensus"
                );
            }
            outcome => {
                warn!(
                    event = "detection_completed",
                    device = %self.device,
                    generation = report.id,
                    samples = report.samples_accepted,
                    rejected = report.samples_rejected,
                    outcome = outcome.kind(),
                    "Detection produced no consensus"
                );
            }
        }
    }

    pub fn log_models_loaded(&self, loaded: usize, rejected: usize) {
        if rejected > 0 {
            warn!(
                event = "models_loaded",
                device = %self.device,
                loaded = loaded,
                rejected = rejected,
                "Some model artifacts were rejected"
            );
        } else {
            info!(
                event = "models_loaded",
                device = %self.device,
                loaded = loaded,
                "Model artifacts loaded"
            );
        }
    }

    pub fn log_device_state(&self, connected: bool, detail: &str) {
        if connected {
            info!(
                event = "device_connected",
                device = %self.device,
                detail = %detail,
                "Sensor device stream open"
            );
        } else {
            warn!(
                event = "device_disconnected",
                device = %self.device,
                detail = %detail,
                "Sensor device stream closed"
            );
        }
    }

    pub fn log_startup(&self, version: &str, models: usize) {
        info!(
            event = "agent_started",
            device = %self.device,
            agent_version = %version,
            models = models,
            "E-nose agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            device = %self.device,
            reason = %reason,
            "E-nose agent shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnsembleResult, Vote};

    #[test]
    fn test_detector_metrics_usable() {
        let metrics = DetectorMetrics::new();
        metrics.inc_samples_accepted();
        metrics.inc_samples_rejected();
        metrics.observe_scoring_latency(0.002);
        metrics.observe_detection_duration(15.0);
        metrics.record_votes(2, 1);
        metrics.set_models_loaded(3);
        metrics.inc_artifacts_rejected(1);
        metrics.set_device_connected(true);
        metrics.set_collecting(false);
        metrics.record_outcome(&EnsembleOutcome::Consensus(EnsembleResult {
            label: "clean".to_string(),
            confidence: 87.5,
            votes: vec![Vote {
                model: "m.json".to_string(),
                label: "clean".to_string(),
                confidence: 87.5,
            }],
        }));
        metrics.record_outcome(&EnsembleOutcome::NoModels);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "enose_detections_total"));
    }

    #[test]
    fn test_structured_logger_device() {
        let logger = StructuredLogger::new("/dev/ttyUSB0");
        assert_eq!(logger.device(), "/dev/ttyUSB0");
        logger.log_window_started(1, 15);
        logger.log_window_cancelled(1, "test");
    }
}
