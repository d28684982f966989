//! Registry of loaded artifacts keyed by file name

use super::loader::{load_artifact, MANIFEST_EXTENSION};
use super::ModelArtifact;
use crate::error::ArtifactError;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// An artifact file that could not be loaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedArtifact {
    pub name: String,
    pub reason: String,
}

/// Result of scanning a model directory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadReport {
    pub loaded: Vec<String>,
    pub rejected: Vec<RejectedArtifact>,
}

/// Concurrent map of loaded artifacts
///
/// Readers take `Arc` snapshots, so a reload never disturbs a scoring pass
/// already in flight.
#[derive(Debug, Default)]
pub struct ArtifactRegistry {
    artifacts: DashMap<String, Arc<ModelArtifact>>,
}

impl ArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an artifact, returning the one it displaced
    pub fn register(&self, artifact: ModelArtifact) -> Option<Arc<ModelArtifact>> {
        let name = artifact.name().to_string();
        self.artifacts.insert(name, Arc::new(artifact))
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<ModelArtifact>> {
        self.artifacts.remove(name).map(|(_, artifact)| artifact)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelArtifact>> {
        self.artifacts.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sorted artifact names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.artifacts.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of every artifact, sorted by name
    pub fn list(&self) -> Vec<Arc<ModelArtifact>> {
        let mut artifacts: Vec<Arc<ModelArtifact>> = self
            .artifacts
            .iter()
            .map(|e| Arc::clone(e.value()))
            .collect();
        artifacts.sort_by(|a, b| a.name().cmp(b.name()));
        artifacts
    }

    /// Load one manifest; a failure drops any stale copy under the same name
    pub fn load_file(&self, path: &Path) -> Result<String, ArtifactError> {
        match load_artifact(path) {
            Ok(artifact) => {
                let name = artifact.name().to_string();
                info!(
                    artifact = %name,
                    kind = artifact.kind(),
                    columns = artifact.columns().len(),
                    "Loaded model artifact"
                );
                self.register(artifact);
                Ok(name)
            }
            Err(e) => {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if self.unregister(name).is_some() {
                        warn!(artifact = %name, "Dropped previously loaded artifact");
                    }
                }
                Err(e)
            }
        }
    }

    /// Load every manifest in `dir`; unreadable files are reported, not fatal
    pub fn load_dir(&self, dir: &Path) -> Result<LoadReport> {
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read model directory {}", dir.display()))?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_manifest(path))
            .collect();
        paths.sort();

        let mut report = LoadReport::default();
        for path in paths {
            match self.load_file(&path) {
                Ok(name) => report.loaded.push(name),
                Err(e) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    warn!(artifact = %name, error = %e, "Rejected model artifact");
                    report.rejected.push(RejectedArtifact {
                        name,
                        reason: e.to_string(),
                    });
                }
            }
        }
        debug!(
            dir = %dir.display(),
            loaded = report.loaded.len(),
            rejected = report.rejected.len(),
            "Model directory scanned"
        );
        Ok(report)
    }

    /// Artifacts selected by `whitelist`, falling back to all of them
    pub fn resolve(&self, whitelist: &[String]) -> Vec<Arc<ModelArtifact>> {
        resolve_active(&self.list(), whitelist)
    }

    /// `load_dir` on the blocking pool; ONNX compilation can take a while
    pub async fn load_dir_blocking(self: &Arc<Self>, dir: PathBuf) -> Result<LoadReport> {
        let registry = Arc::clone(self);
        tokio::task::spawn_blocking(move || registry.load_dir(&dir))
            .await
            .context("Model loading task panicked")?
    }
}

/// Restrict artifacts to a whitelist
///
/// An empty whitelist, or one matching nothing, selects every artifact.
pub fn resolve_active(
    available: &[Arc<ModelArtifact>],
    whitelist: &[String],
) -> Vec<Arc<ModelArtifact>> {
    if whitelist.is_empty() {
        return available.to_vec();
    }
    let selected: Vec<Arc<ModelArtifact>> = available
        .iter()
        .filter(|a| whitelist.iter().any(|name| name == a.name()))
        .cloned()
        .collect();
    if selected.is_empty() {
        warn!(
            whitelist = ?whitelist,
            available = available.len(),
            "Whitelist matched no artifacts, using all"
        );
        return available.to_vec();
    }
    selected
}

pub(crate) fn is_manifest(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(MANIFEST_EXTENSION)
}
