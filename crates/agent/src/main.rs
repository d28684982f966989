//! E-nose agent
//!
//! Reads sensor lines from a device (or stdin), runs timed detection
//! windows against the loaded model ensemble and serves the HTTP control
//! API. Logs go to stderr as JSON; detection reports go to stdout.

use enose_lib::{
    artifact::{ArtifactRegistry, ModelDirWatcher},
    health::{components, HealthRegistry},
    observability::{DetectorMetrics, StructuredLogger},
    sensor::{open_device, stdin_source},
    session::DetectionRunner,
    DetectionReport,
};
use anyhow::Result;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let config = config::AgentConfig::load()?;
    let detection = config.detection_config()?;
    info!(
        device = %config.device_label(),
        model_dir = %config.model_dir.display(),
        window_secs = config.window_secs,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::DEVICE).await;
    health_registry.register(components::MODELS).await;
    health_registry.register(components::DETECTOR).await;

    let metrics = DetectorMetrics::new();
    let logger = StructuredLogger::new(config.device_label());

    let registry = Arc::new(ArtifactRegistry::new());
    let mut rejected = Vec::new();
    match registry.load_dir_blocking(config.model_dir.clone()).await {
        Ok(report) => {
            logger.log_models_loaded(report.loaded.len(), report.rejected.len());
            metrics.inc_artifacts_rejected(report.rejected.len());
            health_registry
                .report_models(report.loaded.len(), report.rejected.len())
                .await;
            rejected = report.rejected.into_iter().map(|r| r.name).collect();
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "Starting without model artifacts");
            health_registry
                .set_degraded(components::MODELS, format!("{e:#}"))
                .await;
        }
    }
    metrics.set_models_loaded(registry.len());

    let _watcher = if config.watch_models {
        match ModelDirWatcher::new(config.model_dir.clone(), Arc::clone(&registry))
            .with_health(health_registry.clone())
            .with_rejected(rejected)
            .start()
            .await
        {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Model directory watch disabled");
                None
            }
        }
    } else {
        None
    };

    let (runner, reports) = DetectionRunner::new(Arc::clone(&registry), detection, logger.clone());
    let runner = Arc::new(runner.with_health(health_registry.clone()));
    tokio::spawn(emit_reports(reports, config.emit_reports));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let device_handle = tokio::spawn(read_device(
        config.clone(),
        Arc::clone(&runner),
        health_registry.clone(),
        shutdown_tx.subscribe(),
    ));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        Arc::clone(&runner),
        config.model_dir.clone(),
    ));

    health_registry.set_ready(true).await;
    logger.log_startup(AGENT_VERSION, registry.len());

    let listen_addr = config.listen_addr();
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(listen_addr, app_state).await {
            error!(error = %e, "API server failed");
        }
    });

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    if tokio::time::timeout(Duration::from_secs(2), device_handle)
        .await
        .is_err()
    {
        warn!("Device reader did not stop in time");
    }
    api_handle.abort();

    Ok(())
}

/// Print each report as one JSON line on stdout
async fn emit_reports(mut reports: mpsc::Receiver<DetectionReport>, enabled: bool) {
    while let Some(report) = reports.recv().await {
        if !enabled {
            continue;
        }
        match serde_json::to_string(&report) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{line}").and_then(|_| stdout.flush()) {
                    warn!(error = %e, "Failed to write detection report");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize detection report"),
        }
    }
}

/// Pump device lines into the runner, reopening the device after it drops
async fn read_device(
    config: config::AgentConfig,
    runner: Arc<DetectionRunner>,
    health: HealthRegistry,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let result = if config.reads_stdin() {
            health.set_healthy(components::DEVICE).await;
            runner.run_source(stdin_source(), shutdown.resubscribe()).await
        } else {
            match open_device(&PathBuf::from(&config.device)).await {
                Ok(source) => {
                    health.set_healthy(components::DEVICE).await;
                    runner.run_source(source, shutdown.resubscribe()).await
                }
                Err(e) => Err(e),
            }
        };

        if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
            return;
        }
        let reason = match result {
            Ok(()) => "device stream ended".to_string(),
            Err(e) => format!("{e:#}"),
        };
        warn!(device = %config.device_label(), reason = %reason, "Sensor device unavailable");
        health.set_unhealthy(components::DEVICE, reason).await;

        // stdin cannot be reopened
        if config.reads_stdin() || config.reconnect_secs == 0 {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(config.reconnect_secs)) => {}
            _ = shutdown.recv() => return,
        }
    }
}
