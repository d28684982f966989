//! Hot reload of the model directory

use super::registry::{is_manifest, ArtifactRegistry};
use crate::health::HealthRegistry;
use crate::observability::DetectorMetrics;
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Effect of a filesystem event on one manifest
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ManifestChange {
    Loaded(String),
    Rejected(String),
    Removed(String),
}

/// Keeps the model gauges and the `models` health component in step with
/// the registry as reloads land
pub(crate) struct ReloadTracker {
    registry: Arc<ArtifactRegistry>,
    metrics: DetectorMetrics,
    health: Option<HealthRegistry>,
    rejected: BTreeSet<String>,
}

impl ReloadTracker {
    pub(crate) async fn apply(&mut self, changes: &[ManifestChange]) {
        if changes.is_empty() {
            return;
        }
        let mut newly_rejected = 0;
        for change in changes {
            match change {
                ManifestChange::Loaded(name) | ManifestChange::Removed(name) => {
                    self.rejected.remove(name);
                }
                ManifestChange::Rejected(name) => {
                    self.rejected.insert(name.clone());
                    newly_rejected += 1;
                }
            }
        }

        let loaded = self.registry.len();
        self.metrics.set_models_loaded(loaded);
        self.metrics.inc_artifacts_rejected(newly_rejected);
        if let Some(health) = &self.health {
            health.report_models(loaded, self.rejected.len()).await;
        }
        debug!(loaded, rejected = self.rejected.len(), "Model registry updated");
    }
}

/// Watches a model directory and keeps the registry in step with it
pub struct ModelDirWatcher {
    dir: PathBuf,
    registry: Arc<ArtifactRegistry>,
    health: Option<HealthRegistry>,
    rejected: BTreeSet<String>,
}

impl ModelDirWatcher {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<ArtifactRegistry>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            health: None,
            rejected: BTreeSet::new(),
        }
    }

    /// Refresh the `models` health component after every reload
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Manifests the initial scan rejected
    pub fn with_rejected(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.rejected.extend(names);
        self
    }

    fn tracker(&self) -> ReloadTracker {
        ReloadTracker {
            registry: Arc::clone(&self.registry),
            metrics: DetectorMetrics::new(),
            health: self.health.clone(),
            rejected: self.rejected.clone(),
        }
    }

    /// Start watching; events stop when the handle is dropped
    pub async fn start(self) -> Result<WatcherHandle> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create filesystem watcher")?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", self.dir.display()))?;
        info!(path = %self.dir.display(), "Watching model directory");

        let mut tracker = self.tracker();
        let registry = self.registry;
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let registry = Arc::clone(&registry);
                let result =
                    tokio::task::spawn_blocking(move || process_event(&event, &registry)).await;
                match result {
                    Ok(changes) => tracker.apply(&changes).await,
                    Err(e) => warn!(error = %e, "Model reload task failed"),
                }
            }
            debug!("Model watcher channel closed");
        });

        Ok(WatcherHandle {
            _watcher: watcher,
            _task: handle,
        })
    }
}

/// Apply one filesystem event to the registry
pub(crate) fn process_event(event: &Event, registry: &ArtifactRegistry) -> Vec<ManifestChange> {
    let mut changes = Vec::new();
    for path in event.paths.iter().filter(|p| is_manifest(p)) {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => {
                if !path.exists() {
                    // renamed away
                    remove(name, registry);
                    changes.push(ManifestChange::Removed(name.to_string()));
                    continue;
                }
                match registry.load_file(path) {
                    Ok(name) => changes.push(ManifestChange::Loaded(name)),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Reload rejected model artifact");
                        changes.push(ManifestChange::Rejected(name.to_string()));
                    }
                }
            }
            EventKind::Remove(_) => {
                remove(name, registry);
                changes.push(ManifestChange::Removed(name.to_string()));
            }
            _ => {}
        }
    }
    changes
}

fn remove(name: &str, registry: &ArtifactRegistry) {
    if registry.unregister(name).is_some() {
        info!(artifact = %name, "Unloaded removed model artifact");
    }
}

/// Keeps the watcher alive
pub struct WatcherHandle {
    _watcher: RecommendedWatcher,
    _task: tokio::task::JoinHandle<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::{components, ComponentStatus};
    use notify::event::{CreateKind, ModifyKind, RemoveKind};

    const MANIFEST: &str = r#"{
        "classifier": {"type": "logistic", "coefficients": [[1.0]], "intercepts": [0.0]},
        "scaler": {"mean": [0.0], "scale": [1.0]},
        "columns": ["MQ2_mean"]
    }"#;

    #[test]
    fn test_create_modify_remove() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("live.json");
        let registry = ArtifactRegistry::new();

        std::fs::write(&path, MANIFEST).unwrap();
        let changes = process_event(
            &Event::new(EventKind::Create(CreateKind::File)).add_path(path.clone()),
            &registry,
        );
        assert_eq!(registry.names(), vec!["live.json"]);
        assert_eq!(changes, vec![ManifestChange::Loaded("live.json".to_string())]);

        std::fs::write(&path, "garbage").unwrap();
        let changes = process_event(
            &Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone()),
            &registry,
        );
        assert!(registry.is_empty());
        assert_eq!(changes, vec![ManifestChange::Rejected("live.json".to_string())]);

        std::fs::write(&path, MANIFEST).unwrap();
        process_event(
            &Event::new(EventKind::Modify(ModifyKind::Any)).add_path(path.clone()),
            &registry,
        );
        std::fs::remove_file(&path).unwrap();
        process_event(
            &Event::new(EventKind::Remove(RemoveKind::File)).add_path(path),
            &registry,
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_non_manifest_files_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        std::fs::write(&path, b"bytes").unwrap();
        let registry = ArtifactRegistry::new();
        let changes = process_event(
            &Event::new(EventKind::Create(CreateKind::File)).add_path(path),
            &registry,
        );
        assert!(registry.is_empty());
        assert!(changes.is_empty());
    }

    #[tokio::test]
    async fn test_reloads_refresh_models_health() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        let registry = Arc::new(ArtifactRegistry::new());
        let health = HealthRegistry::new();
        health.register(components::MODELS).await;
        let mut tracker = ModelDirWatcher::new(dir.path(), Arc::clone(&registry))
            .with_health(health.clone())
            .with_rejected(["bad.json".to_string()])
            .tracker();
        let models = || async { health.health().await.components[components::MODELS].clone() };

        std::fs::write(&good, MANIFEST).unwrap();
        let changes = process_event(
            &Event::new(EventKind::Create(CreateKind::File)).add_path(good.clone()),
            &registry,
        );
        tracker.apply(&changes).await;
        let status = models().await;
        assert_eq!(status.status, ComponentStatus::Degraded);
        assert_eq!(status.message.as_deref(), Some("1 artifacts loaded, 1 rejected"));

        std::fs::write(&bad, MANIFEST).unwrap();
        let changes = process_event(
            &Event::new(EventKind::Modify(ModifyKind::Any)).add_path(bad.clone()),
            &registry,
        );
        tracker.apply(&changes).await;
        assert_eq!(models().await.status, ComponentStatus::Healthy);

        std::fs::remove_file(&good).unwrap();
        std::fs::remove_file(&bad).unwrap();
        let changes = process_event(
            &Event::new(EventKind::Remove(RemoveKind::File))
                .add_path(good)
                .add_path(bad),
            &registry,
        );
        tracker.apply(&changes).await;
        let status = models().await;
        assert!(registry.is_empty());
        assert_eq!(status.status, ComponentStatus::Degraded);
        assert_eq!(status.message.as_deref(), Some("no model artifacts loaded"));
    }

    #[tokio::test]
    async fn test_watch_missing_dir_fails() {
        let watcher = ModelDirWatcher::new("/nonexistent/models", Arc::new(ArtifactRegistry::new()));
        assert!(watcher.start().await.is_err());
    }
}
