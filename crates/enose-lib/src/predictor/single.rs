//! Scoring one feature vector with one artifact

use crate::artifact::{argmax, ClassScores, ModelArtifact};
use crate::error::PredictError;
use crate::models::{FeatureVector, Vote};
use tracing::{debug, warn};

/// Confidence given to votes from classifiers without probabilities
pub const DEFAULT_HARD_LABEL_CONFIDENCE: f64 = 100.0;

/// Order features by an artifact's training columns
///
/// Columns absent from the vector are filled with zero; extra features are
/// ignored.
pub fn reindex(features: &FeatureVector, columns: &[String]) -> Vec<f64> {
    columns
        .iter()
        .map(|column| features.get(column).unwrap_or(0.0))
        .collect()
}

/// Applies one artifact to one feature vector
#[derive(Debug, Clone)]
pub struct SingleModelPredictor {
    hard_label_confidence: f64,
}

impl Default for SingleModelPredictor {
    fn default() -> Self {
        Self::new(DEFAULT_HARD_LABEL_CONFIDENCE)
    }
}

impl SingleModelPredictor {
    pub fn new(hard_label_confidence: f64) -> Self {
        Self {
            hard_label_confidence: hard_label_confidence.clamp(0.0, 100.0),
        }
    }

    pub fn hard_label_confidence(&self) -> f64 {
        self.hard_label_confidence
    }

    /// Score, reporting why the artifact could not vote
    pub fn try_predict(
        &self,
        artifact: &ModelArtifact,
        features: &FeatureVector,
    ) -> Result<Vote, PredictError> {
        if features.is_empty() {
            return Err(PredictError::EmptyFeatures);
        }
        if let Some((name, _)) = features.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PredictError::NonFiniteFeature(name.to_string()));
        }

        let row = reindex(features, artifact.columns());
        let scaled = artifact.scaler().transform(&row)?;

        let (index, confidence) = match artifact.classifier().classify(&scaled)? {
            ClassScores::Probabilities(probabilities) => {
                if probabilities.iter().any(|p| !p.is_finite()) {
                    return Err(PredictError::Classifier(
                        "non-finite probability".to_string(),
                    ));
                }
                let index = argmax(&probabilities).ok_or_else(|| {
                    PredictError::Classifier("empty probability vector".to_string())
                })?;
                (index, (probabilities[index] * 100.0).clamp(0.0, 100.0))
            }
            ClassScores::Label(index) => (index, self.hard_label_confidence),
        };

        Ok(Vote {
            model: artifact.name().to_string(),
            label: artifact.class_label(index)?,
            confidence,
        })
    }

    /// Score, or `None` when the artifact cannot vote on this vector
    pub fn predict_one(&self, artifact: &ModelArtifact, features: &FeatureVector) -> Option<Vote> {
        match self.try_predict(artifact, features) {
            Ok(vote) => {
                debug!(
                    artifact = %vote.model,
                    label = %vote.label,
                    confidence = vote.confidence,
                    "Artifact voted"
                );
                Some(vote)
            }
            Err(e) => {
                warn!(artifact = %artifact.name(), error = %e, "Skipping artifact");
                None
            }
        }
    }
}
