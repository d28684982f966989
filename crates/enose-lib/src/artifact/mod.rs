//! Trained model artifacts
//!
//! An artifact bundles a fitted classifier, the scaler it was trained
//! behind, and the ordered feature columns it expects. Artifacts are
//! immutable once loaded and shared read-only across scoring threads.

mod classifier;
mod loader;
mod onnx;
mod registry;
mod scaler;
mod watcher;

pub use classifier::{
    ClassScores, Classifier, ClassifierSpec, KNearestClassifier, LinearModel, LinearSvmClassifier,
    LogisticClassifier,
};
pub use loader::{compute_checksum, load_artifact, parse_artifact, MANIFEST_EXTENSION};
pub use onnx::OnnxClassifier;
pub use registry::{resolve_active, ArtifactRegistry, LoadReport, RejectedArtifact};
pub use scaler::StandardScaler;
pub use watcher::{ModelDirWatcher, WatcherHandle};

pub(crate) use classifier::argmax;

use crate::error::PredictError;
use serde::{Deserialize, Serialize};

/// Label reported for class index 1 when an artifact has no class list
pub const LEGACY_POSITIVE_LABEL: &str = "Halal";
/// Label reported for class index 0 when an artifact has no class list
pub const LEGACY_NEGATIVE_LABEL: &str = "Non-Halal";

/// Human-readable label for a class index of a list-less binary model
pub fn legacy_label(index: usize) -> String {
    match index {
        0 => LEGACY_NEGATIVE_LABEL.to_string(),
        1 => LEGACY_POSITIVE_LABEL.to_string(),
        other => other.to_string(),
    }
}

/// A loaded, immutable model artifact
#[derive(Debug)]
pub struct ModelArtifact {
    name: String,
    classifier: Box<dyn Classifier>,
    scaler: StandardScaler,
    columns: Vec<String>,
    classes: Option<Vec<String>>,
    fingerprint: Option<String>,
}

impl ModelArtifact {
    pub fn new(
        name: impl Into<String>,
        classifier: Box<dyn Classifier>,
        scaler: StandardScaler,
        columns: Vec<String>,
        classes: Option<Vec<String>>,
    ) -> Self {
        Self {
            name: name.into(),
            classifier,
            scaler,
            columns,
            classes,
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    /// Training feature order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn classes(&self) -> Option<&[String]> {
        self.classes.as_deref()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    pub fn kind(&self) -> &'static str {
        self.classifier.kind()
    }

    /// Resolve a class index to the label reported in votes
    pub fn class_label(&self, index: usize) -> Result<String, PredictError> {
        match &self.classes {
            Some(classes) => classes
                .get(index)
                .cloned()
                .ok_or(PredictError::UnknownClass {
                    index,
                    classes: classes.len(),
                }),
            None => Ok(legacy_label(index)),
        }
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            name: self.name.clone(),
            kind: self.kind().to_string(),
            provides_probabilities: self.classifier.provides_probabilities(),
            columns: self.columns.clone(),
            classes: self.classes.clone(),
            fingerprint: self.fingerprint.clone(),
        }
    }
}

/// Serializable summary of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub name: String,
    pub kind: String,
    pub provides_probabilities: bool,
    pub columns: Vec<String>,
    #[serde(default)]
    pub classes: Option<Vec<String>>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(classes: Option<Vec<String>>) -> ModelArtifact {
        let clf = KNearestClassifier::new(1, vec![vec![0.0]], vec![0], 1).unwrap();
        ModelArtifact::new(
            "m.json",
            Box::new(clf),
            StandardScaler::identity(1),
            vec!["MQ2_mean".to_string()],
            classes,
        )
    }

    #[test]
    fn test_legacy_labels() {
        let artifact = artifact(None);
        assert_eq!(artifact.class_label(1).unwrap(), "Halal");
        assert_eq!(artifact.class_label(0).unwrap(), "Non-Halal");
        assert_eq!(artifact.class_label(4).unwrap(), "4");
    }

    #[test]
    fn test_explicit_classes() {
        let artifact = artifact(Some(vec!["clean".into(), "spoiled".into()]));
        assert_eq!(artifact.class_label(1).unwrap(), "spoiled");
        assert_eq!(
            artifact.class_label(2),
            Err(PredictError::UnknownClass {
                index: 2,
                classes: 2
            })
        );
    }

    #[test]
    fn test_info() {
        let info = artifact(None).with_fingerprint("abc").info();
        assert_eq!(info.kind, "knn");
        assert!(info.provides_probabilities);
        assert_eq!(info.fingerprint.as_deref(), Some("abc"));
    }
}
