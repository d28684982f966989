//! Core data models for the detection pipeline

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ambient conditions reported after the gas channels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentReading {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
}

/// Named statistical features computed from one sample window
///
/// Keys are kept sorted so serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    values: BTreeMap<String, f64>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl FromIterator<(String, f64)> for FeatureVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// One artifact's prediction within an ensemble run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub model: String,
    pub label: String,
    /// Confidence on a 0-100 scale
    pub confidence: f64,
}

/// Consensus across all artifacts that produced a vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub label: String,
    /// Mean winner confidence scaled by the winners' vote share (0-100)
    pub confidence: f64,
    pub votes: Vec<Vote>,
}

/// Outcome of one ensemble request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnsembleOutcome {
    /// At least one artifact voted
    Consensus(EnsembleResult),
    /// Window smaller than the configured minimum; never scored
    InsufficientData { samples: usize, required: usize },
    /// No artifacts are registered
    NoModels,
    /// Every active artifact failed to score
    PredictionFailed { attempted: usize },
}

impl EnsembleOutcome {
    pub fn result(&self) -> Option<&EnsembleResult> {
        match self {
            EnsembleOutcome::Consensus(result) => Some(result),
            _ => None,
        }
    }

    pub fn into_result(self) -> Option<EnsembleResult> {
        match self {
            EnsembleOutcome::Consensus(result) => Some(result),
            _ => None,
        }
    }

    /// Short machine-readable tag, used for metric labels and logs
    pub fn kind(&self) -> &'static str {
        match self {
            EnsembleOutcome::Consensus(_) => "consensus",
            EnsembleOutcome::InsufficientData { .. } => "insufficient_data",
            EnsembleOutcome::NoModels => "no_models",
            EnsembleOutcome::PredictionFailed { .. } => "prediction_failed",
        }
    }
}

/// A closed detection window and how it was scored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionReport {
    pub id: u64,
    pub started_at: i64,
    pub finished_at: i64,
    pub samples_accepted: usize,
    pub samples_rejected: usize,
    pub outcome: EnsembleOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_vector_serializes_sorted() {
        let mut features = FeatureVector::new();
        features.insert("b", 2.0);
        features.insert("a", 1.0);
        let json = serde_json::to_string(&features).unwrap();
        assert_eq!(json, r#"{"a":1.0,"b":2.0}"#);
    }

    #[test]
    fn test_outcome_tagging() {
        let outcome = EnsembleOutcome::InsufficientData {
            samples: 9,
            required: 10,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "insufficient_data");
        assert_eq!(json["samples"], 9);
        assert_eq!(outcome.kind(), "insufficient_data");
        assert!(outcome.result().is_none());
    }

    #[test]
    fn test_consensus_flattens_result() {
        let outcome = EnsembleOutcome::Consensus(EnsembleResult {
            label: "clean".to_string(),
            confidence: 91.5,
            votes: vec![Vote {
                model: "svm.json".to_string(),
                label: "clean".to_string(),
                confidence: 91.5,
            }],
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "consensus");
        assert_eq!(json["label"], "clean");
        assert_eq!(json["votes"][0]["model"], "svm.json");
    }
}
