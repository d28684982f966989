//! Artifact manifest parsing
//!
//! A manifest is a JSON object with the keys `classifier` (or `model`),
//! `scaler`, `columns` and, optionally, `classes`.

use super::classifier::ClassifierSpec;
use super::scaler::StandardScaler;
use super::ModelArtifact;
use crate::error::ArtifactError;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

/// File extension of artifact manifests
pub const MANIFEST_EXTENSION: &str = "json";

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(alias = "model")]
    classifier: ClassifierSpec,
    scaler: StandardScaler,
    columns: Vec<String>,
    #[serde(default)]
    classes: Option<Vec<String>>,
}

/// Hex SHA-256 of a byte slice
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Load an artifact manifest from disk; the artifact is named by file name
pub fn load_artifact(path: &Path) -> Result<ModelArtifact, ArtifactError> {
    let bytes = std::fs::read(path).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_artifact(&name, &bytes, base_dir)
}

/// Parse manifest bytes; relative ONNX paths resolve against `base_dir`
pub fn parse_artifact(
    name: &str,
    bytes: &[u8],
    base_dir: &Path,
) -> Result<ModelArtifact, ArtifactError> {
    let value: serde_json::Value = serde_json::from_slice(bytes)?;
    let object = value.as_object().ok_or(ArtifactError::NotAnObject)?;
    if !object.contains_key("classifier") && !object.contains_key("model") {
        return Err(ArtifactError::MissingKey("classifier"));
    }
    for key in ["scaler", "columns"] {
        if !object.contains_key(key) {
            return Err(ArtifactError::MissingKey(key));
        }
    }

    let manifest: Manifest = serde_json::from_value(value)?;
    if manifest.columns.is_empty() {
        return Err(ArtifactError::NoColumns);
    }
    manifest.scaler.validate()?;
    if manifest.columns.len() != manifest.scaler.n_features() {
        return Err(ArtifactError::ColumnMismatch {
            columns: manifest.columns.len(),
            features: manifest.scaler.n_features(),
        });
    }
    if let Some(classes) = &manifest.classes {
        if classes.is_empty() {
            return Err(ArtifactError::InvalidClassifier(
                "empty class list".to_string(),
            ));
        }
        if let ClassifierSpec::Knn { labels, .. } = &manifest.classifier {
            if let Some(label) = labels.iter().find(|l| **l >= classes.len()) {
                return Err(ArtifactError::InvalidClassifier(format!(
                    "kNN label {label} has no entry in the {} classes",
                    classes.len()
                )));
            }
        }
    }

    let classifier = manifest
        .classifier
        .build(base_dir, manifest.scaler.n_features())?;
    Ok(ModelArtifact::new(
        name,
        classifier,
        manifest.scaler,
        manifest.columns,
        manifest.classes,
    )
    .with_fingerprint(compute_checksum(bytes)))
}
