//! Timed detection windows over a live sample stream
//!
//! The runner owns the session state machine, feeds it device lines, closes
//! windows when their timer fires and scores them on the blocking pool.

use super::state::{DetectionSession, LineOutcome, SessionState};
use crate::artifact::{resolve_active, ArtifactRegistry};
use crate::error::SessionError;
use crate::health::{components, HealthRegistry};
use crate::models::{DetectionReport, EnsembleOutcome, EnvironmentReading};
use crate::observability::{DetectorMetrics, StructuredLogger};
use crate::predictor::{EnsembleConfig, EnsemblePredictor};
use crate::sensor::{SampleMatrix, SampleSource};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default length of a detection window
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15);

/// Longest window a request or the configuration may ask for
pub const MAX_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Capacity of the report channel
const REPORT_CHANNEL_CAPACITY: usize = 32;

/// Runner configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// How long a window collects before it is scored
    pub window: Duration,
    /// Default artifact whitelist; empty means all
    pub whitelist: Vec<String>,
    pub ensemble: EnsembleConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            whitelist: Vec::new(),
            ensemble: EnsembleConfig::default(),
        }
    }
}

/// Per-window overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRequest {
    #[serde(default)]
    pub duration_secs: Option<f64>,
    #[serde(default, alias = "models")]
    pub whitelist: Option<Vec<String>>,
}

impl DetectionRequest {
    fn duration(&self, default: Duration) -> Result<Duration, SessionError> {
        match self.duration_secs {
            Some(secs) => window_from_secs(secs),
            None => Ok(default),
        }
    }
}

/// Validate a window length given in seconds
pub fn window_from_secs(secs: f64) -> Result<Duration, SessionError> {
    if secs.is_nan() || secs <= 0.0 {
        return Err(SessionError::InvalidDuration);
    }
    Duration::try_from_secs_f64(secs)
        .ok()
        .filter(|window| *window <= MAX_WINDOW)
        .ok_or(SessionError::InvalidDuration)
}

/// Snapshot of the runner for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerStatus {
    pub state: SessionState,
    pub generation: u64,
    pub samples: usize,
    pub rejected: usize,
    pub environment: Option<EnvironmentReading>,
    pub models: Vec<String>,
    pub window_secs: f64,
}

struct ActiveWindow {
    session: DetectionSession,
    whitelist: Vec<String>,
}

pub struct DetectionRunner {
    active: Mutex<ActiveWindow>,
    registry: Arc<ArtifactRegistry>,
    ensemble: Arc<EnsemblePredictor>,
    config: DetectionConfig,
    latest: RwLock<Option<DetectionReport>>,
    report_tx: mpsc::Sender<DetectionReport>,
    metrics: DetectorMetrics,
    logger: StructuredLogger,
    health: Option<HealthRegistry>,
}

impl DetectionRunner {
    pub fn new(
        registry: Arc<ArtifactRegistry>,
        config: DetectionConfig,
        logger: StructuredLogger,
    ) -> (Self, mpsc::Receiver<DetectionReport>) {
        let (tx, rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let runner = Self {
            active: Mutex::new(ActiveWindow {
                session: DetectionSession::new(config.ensemble.min_samples),
                whitelist: config.whitelist.clone(),
            }),
            registry,
            ensemble: Arc::new(EnsemblePredictor::new(&config.ensemble)),
            config,
            latest: RwLock::new(None),
            report_tx: tx,
            metrics: DetectorMetrics::new(),
            logger,
            health: None,
        };
        (runner, rx)
    }

    /// Report scoring failures on the `detector` health component
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        &self.registry
    }

    /// Open a window; fails if one is already collecting
    pub async fn start(self: &Arc<Self>, request: DetectionRequest) -> Result<u64, SessionError> {
        let duration = request.duration(self.config.window)?;
        let generation = {
            let mut active = self.active.lock().await;
            let generation = active.session.start()?;
            active.whitelist = request
                .whitelist
                .clone()
                .unwrap_or_else(|| self.config.whitelist.clone());
            generation
        };
        self.arm_timer(generation, duration);
        Ok(generation)
    }

    /// Cancel any collecting window and open a new one
    pub async fn restart(self: &Arc<Self>, request: DetectionRequest) -> Result<u64, SessionError> {
        let duration = request.duration(self.config.window)?;
        let generation = {
            let mut active = self.active.lock().await;
            if active.session.is_collecting() {
                self.logger
                    .log_window_cancelled(active.session.generation(), "restarted");
            }
            let generation = active.session.restart();
            active.whitelist = request
                .whitelist
                .clone()
                .unwrap_or_else(|| self.config.whitelist.clone());
            generation
        };
        self.arm_timer(generation, duration);
        Ok(generation)
    }

    fn arm_timer(self: &Arc<Self>, generation: u64, duration: Duration) {
        self.metrics.set_collecting(true);
        self.logger
            .log_window_started(generation, duration.as_secs());

        let runner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            if runner.close_and_score(generation).await.is_none() {
                debug!(generation, "Window timer fired after window ended");
            }
        });
    }

    /// Discard the collecting window
    pub async fn cancel(&self) -> Result<(), SessionError> {
        let mut active = self.active.lock().await;
        active.session.cancel()?;
        self.metrics.set_collecting(false);
        self.logger
            .log_window_cancelled(active.session.generation(), "requested");
        Ok(())
    }

    /// Close the collecting window now and score it
    pub async fn stop(&self) -> Result<DetectionReport, SessionError> {
        let generation = {
            let active = self.active.lock().await;
            if !active.session.is_collecting() {
                return Err(SessionError::NotCollecting);
            }
            active.session.generation()
        };
        self.close_and_score(generation)
            .await
            .ok_or(SessionError::NotCollecting)
    }

    /// Feed one raw device line
    pub async fn feed_line(&self, line: &str) -> LineOutcome {
        let outcome = self.active.lock().await.session.push_line(line);
        match &outcome {
            LineOutcome::Accepted => self.metrics.inc_samples_accepted(),
            LineOutcome::Rejected(e) => {
                self.metrics.inc_samples_rejected();
                debug!(error = %e, "Dropped malformed sample line");
            }
            LineOutcome::Ignored => {}
        }
        outcome
    }

    /// Pump a sample source until it ends or shutdown is signalled
    ///
    /// A source that ends or fails cancels the collecting window.
    pub async fn run_source<S: SampleSource>(
        &self,
        mut source: S,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let label = source.describe().to_string();
        self.metrics.set_device_connected(true);
        self.logger.log_device_state(true, &label);

        loop {
            tokio::select! {
                line = source.next_line() => match line {
                    Ok(Some(line)) => {
                        self.feed_line(&line).await;
                    }
                    Ok(None) => {
                        self.device_lost("end of stream").await;
                        return Ok(());
                    }
                    Err(e) => {
                        self.device_lost(&format!("{e:#}")).await;
                        return Err(e);
                    }
                },
                _ = shutdown.recv() => {
                    info!(source = %label, "Stopping sample reader");
                    return Ok(());
                }
            }
        }
    }

    async fn device_lost(&self, detail: &str) {
        self.metrics.set_device_connected(false);
        self.logger.log_device_state(false, detail);
        let mut active = self.active.lock().await;
        if active.session.cancel().is_ok() {
            self.metrics.set_collecting(false);
            self.logger
                .log_window_cancelled(active.session.generation(), "device disconnected");
        }
    }

    /// Close window `generation` if it is still collecting, then score it
    async fn close_and_score(&self, generation: u64) -> Option<DetectionReport> {
        let (closed, whitelist) = {
            let mut active = self.active.lock().await;
            if active.session.generation() != generation || !active.session.is_collecting() {
                return None;
            }
            let closed = active.session.close().ok()?;
            active.session.begin_scoring(generation);
            (closed, active.whitelist.clone())
        };
        self.metrics.set_collecting(false);

        let outcome = self.score(closed.window, whitelist).await;
        self.active.lock().await.session.complete(generation);

        let report = DetectionReport {
            id: generation,
            started_at: closed.started_at.timestamp(),
            finished_at: closed.closed_at.timestamp(),
            samples_accepted: closed.stats.accepted,
            samples_rejected: closed.stats.rejected,
            outcome,
        };
        self.metrics.record_outcome(&report.outcome);
        self.report_health(&report.outcome).await;
        self.metrics.observe_detection_duration(
            (closed.closed_at - closed.started_at).num_milliseconds() as f64 / 1000.0,
        );
        self.logger.log_detection(&report);

        *self.latest.write().await = Some(report.clone());
        if let Err(e) = self.report_tx.try_send(report.clone()) {
            warn!(error = %e, "Detection report not delivered");
        }
        Some(report)
    }

    async fn score(&self, window: SampleMatrix, whitelist: Vec<String>) -> EnsembleOutcome {
        let artifacts = self.registry.list();
        let attempted = resolve_active(&artifacts, &whitelist).len();
        let ensemble = Arc::clone(&self.ensemble);

        let start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            ensemble.predict_ensemble(&window, &artifacts, &whitelist)
        })
        .await;
        self.metrics
            .observe_scoring_latency(start.elapsed().as_secs_f64());

        let outcome = result.unwrap_or_else(|e| {
            warn!(error = %e, "Scoring task failed");
            EnsembleOutcome::PredictionFailed { attempted }
        });
        match &outcome {
            EnsembleOutcome::Consensus(result) => self
                .metrics
                .record_votes(result.votes.len(), attempted.saturating_sub(result.votes.len())),
            EnsembleOutcome::PredictionFailed { attempted } => {
                self.metrics.record_votes(0, *attempted)
            }
            _ => {}
        }
        outcome
    }

    async fn report_health(&self, outcome: &EnsembleOutcome) {
        let Some(health) = &self.health else {
            return;
        };
        match outcome {
            EnsembleOutcome::Consensus(_) => health.set_healthy(components::DETECTOR).await,
            EnsembleOutcome::PredictionFailed { attempted } => {
                health
                    .set_degraded(
                        components::DETECTOR,
                        format!("all {attempted} active artifacts failed to score"),
                    )
                    .await
            }
            EnsembleOutcome::NoModels | EnsembleOutcome::InsufficientData { .. } => {}
        }
    }

    pub async fn latest(&self) -> Option<DetectionReport> {
        self.latest.read().await.clone()
    }

    pub async fn status(&self) -> RunnerStatus {
        let active = self.active.lock().await;
        let stats = active.session.stats();
        RunnerStatus {
            state: active.session.state(),
            generation: active.session.generation(),
            samples: active.session.len(),
            rejected: stats.rejected,
            environment: active.session.environment(),
            models: self.registry.names(),
            window_secs: self.config.window.as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{LinearModel, LogisticClassifier, ModelArtifact, StandardScaler};
    use crate::health::ComponentStatus;
    use crate::sensor::LineSource;

    const LINE: &str = "20,21,22,23,24,25,26,27,25.0,50.0,101325";

    fn registry_with_model() -> Arc<ArtifactRegistry> {
        let registry = ArtifactRegistry::new();
        let model = LinearModel::new(vec![vec![0.0]], vec![2.0], 1).unwrap();
        registry.register(ModelArtifact::new(
            "fixed.json",
            Box::new(LogisticClassifier::new(model)),
            StandardScaler::identity(1),
            vec!["MQ2_mean".to_string()],
            Some(vec!["clean".to_string(), "contaminated".to_string()]),
        ));
        Arc::new(registry)
    }

    fn runner(
        registry: Arc<ArtifactRegistry>,
    ) -> (Arc<DetectionRunner>, mpsc::Receiver<DetectionReport>) {
        let (runner, rx) = DetectionRunner::new(
            registry,
            DetectionConfig::default(),
            StructuredLogger::new("test"),
        );
        (Arc::new(runner), rx)
    }

    #[tokio::test]
    async fn test_stop_scores_window() {
        let (runner, mut rx) = runner(registry_with_model());
        let id = runner.start(DetectionRequest::default()).await.unwrap();
        for _ in 0..12 {
            assert_eq!(runner.feed_line(LINE).await, LineOutcome::Accepted);
        }
        assert!(matches!(runner.feed_line("oops").await, LineOutcome::Rejected(_)));

        let report = runner.stop().await.unwrap();
        assert_eq!(report.id, id);
        assert_eq!(report.samples_accepted, 12);
        assert_eq!(report.samples_rejected, 1);
        let result = report.outcome.result().unwrap();
        assert_eq!(result.label, "contaminated");

        assert_eq!(rx.recv().await.unwrap().id, id);
        assert_eq!(runner.latest().await.unwrap().id, id);
        assert_eq!(runner.status().await.state, SessionState::Completed);
    }

    #[tokio::test]
    async fn test_single_window_at_a_time() {
        let (runner, _rx) = runner(registry_with_model());
        runner.start(DetectionRequest::default()).await.unwrap();
        assert_eq!(
            runner.start(DetectionRequest::default()).await,
            Err(SessionError::AlreadyCollecting)
        );
        assert_eq!(runner.restart(DetectionRequest::default()).await, Ok(2));
    }

    #[tokio::test]
    async fn test_timer_closes_window() {
        let (runner, mut rx) = runner(registry_with_model());
        let request = DetectionRequest {
            duration_secs: Some(0.05),
            whitelist: None,
        };
        runner.start(request).await.unwrap();
        for _ in 0..10 {
            runner.feed_line(LINE).await;
        }
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.samples_accepted, 10);
        assert!(matches!(report.outcome, EnsembleOutcome::Consensus(_)));
    }

    #[tokio::test]
    async fn test_cancelled_window_never_scored() {
        let (runner, mut rx) = runner(registry_with_model());
        let request = DetectionRequest {
            duration_secs: Some(0.05),
            whitelist: None,
        };
        runner.start(request).await.unwrap();
        runner.feed_line(LINE).await;
        runner.cancel().await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(rx.try_recv().is_err());
        assert!(runner.latest().await.is_none());
        assert_eq!(runner.status().await.state, SessionState::Cancelled);
        assert_eq!(runner.cancel().await, Err(SessionError::NotCollecting));
    }

    #[tokio::test]
    async fn test_short_window_reports_insufficient_data() {
        let (runner, _rx) = runner(registry_with_model());
        runner.start(DetectionRequest::default()).await.unwrap();
        for _ in 0..9 {
            runner.feed_line(LINE).await;
        }
        let report = runner.stop().await.unwrap();
        assert_eq!(
            report.outcome,
            EnsembleOutcome::InsufficientData {
                samples: 9,
                required: 10
            }
        );
    }

    #[tokio::test]
    async fn test_empty_registry_reports_no_models() {
        let (runner, _rx) = runner(Arc::new(ArtifactRegistry::new()));
        runner.start(DetectionRequest::default()).await.unwrap();
        for _ in 0..10 {
            runner.feed_line(LINE).await;
        }
        assert_eq!(runner.stop().await.unwrap().outcome, EnsembleOutcome::NoModels);
    }

    #[tokio::test]
    async fn test_device_disconnect_cancels_window() {
        let (runner, _rx) = runner(registry_with_model());
        runner.start(DetectionRequest::default()).await.unwrap();

        let reader = tokio_test::io::Builder::new()
            .read(format!("{LINE}\n{LINE}\n").as_bytes())
            .build();
        let (_tx, shutdown) = broadcast::channel(1);
        runner
            .run_source(LineSource::new(reader, "mock"), shutdown)
            .await
            .unwrap();

        let status = runner.status().await;
        assert_eq!(status.state, SessionState::Cancelled);
        assert_eq!(status.environment.unwrap().humidity_pct, 50.0);
        assert_eq!(runner.stop().await.unwrap_err(), SessionError::NotCollecting);
    }

    #[tokio::test]
    async fn test_failed_scoring_degrades_detector_health() {
        let registry = registry_with_model();
        let health = HealthRegistry::new();
        health.register(components::DETECTOR).await;
        let (runner, _rx) = DetectionRunner::new(
            Arc::clone(&registry),
            DetectionConfig::default(),
            StructuredLogger::new("test"),
        );
        let runner = Arc::new(runner.with_health(health.clone()));
        let detector = || async {
            health.health().await.components[components::DETECTOR].clone()
        };

        // scaler wider than the column list, so every request is skipped
        let model = LinearModel::new(vec![vec![0.0, 0.0]], vec![2.0], 2).unwrap();
        registry.register(ModelArtifact::new(
            "fixed.json",
            Box::new(LogisticClassifier::new(model)),
            StandardScaler::identity(2),
            vec!["MQ2_mean".to_string()],
            None,
        ));
        runner.start(DetectionRequest::default()).await.unwrap();
        for _ in 0..10 {
            runner.feed_line(LINE).await;
        }
        assert_eq!(
            runner.stop().await.unwrap().outcome,
            EnsembleOutcome::PredictionFailed { attempted: 1 }
        );
        let status = detector().await;
        assert_eq!(status.status, ComponentStatus::Degraded);
        assert_eq!(
            status.message.as_deref(),
            Some("all 1 active artifacts failed to score")
        );

        registry.register(ModelArtifact::new(
            "fixed.json",
            Box::new(LogisticClassifier::new(
                LinearModel::new(vec![vec![0.0]], vec![2.0], 1).unwrap(),
            )),
            StandardScaler::identity(1),
            vec!["MQ2_mean".to_string()],
            None,
        ));
        runner.start(DetectionRequest::default()).await.unwrap();
        for _ in 0..10 {
            runner.feed_line(LINE).await;
        }
        assert!(matches!(
            runner.stop().await.unwrap().outcome,
            EnsembleOutcome::Consensus(_)
        ));
        assert_eq!(detector().await.status, ComponentStatus::Healthy);
    }

    #[test]
    fn test_request_duration() {
        let default = Duration::from_secs(15);
        assert_eq!(DetectionRequest::default().duration(default), Ok(default));
        let request = DetectionRequest {
            duration_secs: Some(2.5),
            whitelist: None,
        };
        assert_eq!(request.duration(default), Ok(Duration::from_millis(2500)));
        for secs in [-1.0, 0.0, f64::NAN, f64::INFINITY, 86_401.0, 1e300] {
            let request = DetectionRequest {
                duration_secs: Some(secs),
                whitelist: None,
            };
            assert_eq!(request.duration(default), Err(SessionError::InvalidDuration));
        }
        assert_eq!(window_from_secs(86_400.0), Ok(MAX_WINDOW));
    }

    #[tokio::test]
    async fn test_out_of_range_duration_leaves_session_idle() {
        let (runner, _rx) = runner(registry_with_model());
        let request = DetectionRequest {
            duration_secs: Some(1e300),
            whitelist: None,
        };
        assert_eq!(
            runner.start(request.clone()).await,
            Err(SessionError::InvalidDuration)
        );
        assert_eq!(runner.restart(request).await, Err(SessionError::InvalidDuration));
        assert_eq!(runner.status().await.state, SessionState::Idle);
        assert_eq!(runner.start(DetectionRequest::default()).await, Ok(1));
    }
}
