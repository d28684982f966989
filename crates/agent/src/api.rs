//! HTTP API for health, metrics and detection control

use enose_lib::{
    artifact::{ArtifactInfo, ArtifactRegistry},
    health::{ComponentStatus, HealthRegistry},
    observability::DetectorMetrics,
    session::{DetectionRequest, DetectionRunner},
    SessionError,
};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: DetectorMetrics,
    pub runner: Arc<DetectionRunner>,
    pub model_dir: PathBuf,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: DetectorMetrics,
        runner: Arc<DetectionRunner>,
        model_dir: PathBuf,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            runner,
            model_dir,
        }
    }

    fn registry(&self) -> &Arc<ArtifactRegistry> {
        self.runner.registry()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn session_error(e: SessionError) -> Response {
    let status = match e {
        SessionError::AlreadyCollecting => StatusCode::CONFLICT,
        SessionError::NotCollecting => StatusCode::NOT_FOUND,
        SessionError::InvalidDuration => StatusCode::BAD_REQUEST,
    };
    error(status, e.to_string())
}

/// Returns 200 while operational, 503 once a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;
    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<ArtifactInfo>> {
    Json(state.registry().list().iter().map(|a| a.info()).collect())
}

/// Rescan the model directory
async fn reload_models(State(state): State<Arc<AppState>>) -> Response {
    match state
        .registry()
        .load_dir_blocking(state.model_dir.clone())
        .await
    {
        Ok(report) => {
            let loaded = state.registry().len();
            state.metrics.set_models_loaded(loaded);
            state.metrics.inc_artifacts_rejected(report.rejected.len());
            state
                .health_registry
                .report_models(loaded, report.rejected.len())
                .await;
            (StatusCode::OK, Json(report)).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Model reload failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct StartParams {
    #[serde(default)]
    restart: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartedBody {
    pub id: u64,
}

/// Open a detection window; 409 while one is collecting unless `?restart=true`
///
/// An empty body uses the agent defaults.
async fn start_detection(
    State(state): State<Arc<AppState>>,
    Query(params): Query<StartParams>,
    body: Bytes,
) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        DetectionRequest::default()
    } else {
        match serde_json::from_slice::<DetectionRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                return error(
                    StatusCode::BAD_REQUEST,
                    format!("invalid detection request: {e}"),
                )
            }
        }
    };
    let started = if params.restart {
        state.runner.restart(request).await
    } else {
        state.runner.start(request).await
    };
    match started {
        Ok(id) => {
            info!(id, "Detection started via API");
            (StatusCode::ACCEPTED, Json(StartedBody { id })).into_response()
        }
        Err(e) => session_error(e),
    }
}

async fn cancel_detection(State(state): State<Arc<AppState>>) -> Response {
    match state.runner.cancel().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => session_error(e),
    }
}

/// Close the collecting window early and return its report
async fn stop_detection(State(state): State<Arc<AppState>>) -> Response {
    match state.runner.stop().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => session_error(e),
    }
}

async fn latest_detection(State(state): State<Arc<AppState>>) -> Response {
    match state.runner.latest().await {
        Some(report) => (StatusCode::OK, Json(report)).into_response(),
        None => error(StatusCode::NOT_FOUND, "no detection has completed yet"),
    }
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runner.status().await)
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/v1/models", get(list_models))
        .route("/v1/models/reload", post(reload_models))
        .route("/v1/detections", post(start_detection))
        .route("/v1/detections/current", delete(cancel_detection))
        .route("/v1/detections/current/stop", post(stop_detection))
        .route("/v1/detections/latest", get(latest_detection))
        .route("/v1/status", get(status))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
