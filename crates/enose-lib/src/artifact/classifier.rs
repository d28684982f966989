//! Classifier families an artifact can carry
//!
//! Each family maps a standardized row to either a probability per class or
//! a bare class index. Families that only emit an index are "blind": the
//! caller decides what confidence such a vote gets.

use super::onnx::OnnxClassifier;
use crate::error::{ArtifactError, PredictError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Raw classifier output for one row
#[derive(Debug, Clone, PartialEq)]
pub enum ClassScores {
    /// One probability per class, in class-index order
    Probabilities(Vec<f64>),
    /// Predicted class index without any probability
    Label(usize),
}

/// A fitted classifier over standardized rows
pub trait Classifier: Send + Sync + fmt::Debug {
    fn classify(&self, row: &[f64]) -> Result<ClassScores, PredictError>;

    /// Family name as written in the manifest
    fn kind(&self) -> &'static str;

    /// Whether `classify` yields probabilities
    fn provides_probabilities(&self) -> bool;
}

/// Classifier section of an artifact manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClassifierSpec {
    /// Binary (one row) or multinomial logistic regression
    Logistic {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// Linear SVM decision function; emits labels only
    LinearSvm {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
    /// k-nearest-neighbours over stored training points
    Knn {
        k: usize,
        points: Vec<Vec<f64>>,
        labels: Vec<usize>,
    },
    /// External ONNX graph, path relative to the manifest
    Onnx {
        path: PathBuf,
        #[serde(default)]
        sha256: Option<String>,
    },
}

impl ClassifierSpec {
    /// Instantiate the classifier for rows of `n_features` values
    pub fn build(
        self,
        base_dir: &Path,
        n_features: usize,
    ) -> Result<Box<dyn Classifier>, ArtifactError> {
        match self {
            ClassifierSpec::Logistic {
                coefficients,
                intercepts,
            } => Ok(Box::new(LogisticClassifier::new(
                LinearModel::new(coefficients, intercepts, n_features)?,
            ))),
            ClassifierSpec::LinearSvm {
                coefficients,
                intercepts,
            } => Ok(Box::new(LinearSvmClassifier::new(
                LinearModel::new(coefficients, intercepts, n_features)?,
            ))),
            ClassifierSpec::Knn { k, points, labels } => Ok(Box::new(KNearestClassifier::new(
                k, points, labels, n_features,
            )?)),
            ClassifierSpec::Onnx { path, sha256 } => {
                let path = if path.is_absolute() {
                    path
                } else {
                    base_dir.join(path)
                };
                Ok(Box::new(OnnxClassifier::load(
                    &path,
                    sha256.as_deref(),
                    n_features,
                )?))
            }
        }
    }
}

/// Weight rows plus intercepts shared by the linear families
#[derive(Debug, Clone)]
pub struct LinearModel {
    coefficients: Vec<Vec<f64>>,
    intercepts: Vec<f64>,
}

impl LinearModel {
    pub fn new(
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
        n_features: usize,
    ) -> Result<Self, ArtifactError> {
        if coefficients.is_empty() {
            return Err(ArtifactError::InvalidClassifier(
                "no coefficient rows".to_string(),
            ));
        }
        if coefficients.len() != intercepts.len() {
            return Err(ArtifactError::InvalidClassifier(format!(
                "{} coefficient rows but {} intercepts",
                coefficients.len(),
                intercepts.len()
            )));
        }
        if let Some(row) = coefficients.iter().find(|r| r.len() != n_features) {
            return Err(ArtifactError::InvalidClassifier(format!(
                "coefficient row has {} weights, expected {}",
                row.len(),
                n_features
            )));
        }
        Ok(Self {
            coefficients,
            intercepts,
        })
    }

    fn n_features(&self) -> usize {
        self.coefficients[0].len()
    }

    fn decision(&self, row: &[f64]) -> Result<Vec<f64>, PredictError> {
        if row.len() != self.n_features() {
            return Err(PredictError::ClassifierShape {
                expected: self.n_features(),
                actual: row.len(),
            });
        }
        Ok(self
            .coefficients
            .iter()
            .zip(&self.intercepts)
            .map(|(weights, b)| weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct LogisticClassifier {
    model: LinearModel,
}

impl LogisticClassifier {
    pub fn new(model: LinearModel) -> Self {
        Self { model }
    }
}

impl Classifier for LogisticClassifier {
    fn classify(&self, row: &[f64]) -> Result<ClassScores, PredictError> {
        let z = self.model.decision(row)?;
        let probabilities = if z.len() == 1 {
            let p = 1.0 / (1.0 + (-z[0]).exp());
            vec![1.0 - p, p]
        } else {
            softmax(&z)
        };
        Ok(ClassScores::Probabilities(probabilities))
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }

    fn provides_probabilities(&self) -> bool {
        true
    }
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / total).collect()
}

#[derive(Debug, Clone)]
pub struct LinearSvmClassifier {
    model: LinearModel,
}

impl LinearSvmClassifier {
    pub fn new(model: LinearModel) -> Self {
        Self { model }
    }
}

impl Classifier for LinearSvmClassifier {
    fn classify(&self, row: &[f64]) -> Result<ClassScores, PredictError> {
        let z = self.model.decision(row)?;
        let index = if z.len() == 1 {
            usize::from(z[0] > 0.0)
        } else {
            argmax(&z).ok_or_else(|| PredictError::Classifier("empty decision".to_string()))?
        };
        Ok(ClassScores::Label(index))
    }

    fn kind(&self) -> &'static str {
        "linear_svm"
    }

    fn provides_probabilities(&self) -> bool {
        false
    }
}

/// Largest class index count a kNN artifact may declare
pub const MAX_KNN_CLASSES: usize = 1024;

/// Majority vote among the `k` closest stored points
#[derive(Debug, Clone)]
pub struct KNearestClassifier {
    k: usize,
    points: Vec<Vec<f64>>,
    labels: Vec<usize>,
    n_classes: usize,
}

impl KNearestClassifier {
    pub fn new(
        k: usize,
        points: Vec<Vec<f64>>,
        labels: Vec<usize>,
        n_features: usize,
    ) -> Result<Self, ArtifactError> {
        if k == 0 {
            return Err(ArtifactError::InvalidClassifier("k must be at least 1".to_string()));
        }
        if points.is_empty() {
            return Err(ArtifactError::InvalidClassifier(
                "no training points".to_string(),
            ));
        }
        if points.len() != labels.len() {
            return Err(ArtifactError::InvalidClassifier(format!(
                "{} points but {} labels",
                points.len(),
                labels.len()
            )));
        }
        if points.iter().any(|p| p.len() != n_features) {
            return Err(ArtifactError::InvalidClassifier(format!(
                "training points must have {} values",
                n_features
            )));
        }
        let n_classes = labels
            .iter()
            .max()
            .and_then(|m| m.checked_add(1))
            .filter(|n| *n <= MAX_KNN_CLASSES)
            .ok_or_else(|| {
                ArtifactError::InvalidClassifier(format!(
                    "kNN labels must be below {MAX_KNN_CLASSES}"
                ))
            })?;
        Ok(Self {
            k,
            points,
            labels,
            n_classes,
        })
    }
}

impl Classifier for KNearestClassifier {
    fn classify(&self, row: &[f64]) -> Result<ClassScores, PredictError> {
        let n_features = self.points[0].len();
        if row.len() != n_features {
            return Err(PredictError::ClassifierShape {
                expected: n_features,
                actual: row.len(),
            });
        }

        let mut distances: Vec<(f64, usize)> = self
            .points
            .iter()
            .zip(&self.labels)
            .map(|(point, label)| {
                let d: f64 = point.iter().zip(row).map(|(p, x)| (p - x).powi(2)).sum();
                (d, *label)
            })
            .collect();
        // stable, so equidistant points keep training order
        distances.sort_by(|a, b| a.0.total_cmp(&b.0));

        let k = self.k.min(distances.len());
        let mut counts = vec![0usize; self.n_classes];
        for (_, label) in &distances[..k] {
            counts[*label] += 1;
        }
        Ok(ClassScores::Probabilities(
            counts.into_iter().map(|c| c as f64 / k as f64).collect(),
        ))
    }

    fn kind(&self) -> &'static str {
        "knn"
    }

    fn provides_probabilities(&self) -> bool {
        true
    }
}

/// Index of the largest value; ties go to the lowest index
pub(crate) fn argmax(values: &[f64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, v)| match best {
            Some((_, b)) if b >= *v => best,
            _ => Some((i, *v)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(coefficients: Vec<Vec<f64>>, intercepts: Vec<f64>) -> LinearModel {
        let n = coefficients[0].len();
        LinearModel::new(coefficients, intercepts, n).unwrap()
    }

    #[test]
    fn test_binary_logistic() {
        let clf = LogisticClassifier::new(linear(vec![vec![1.0, 0.0]], vec![0.0]));
        match clf.classify(&[0.0, 5.0]).unwrap() {
            ClassScores::Probabilities(p) => {
                assert_eq!(p.len(), 2);
                assert!((p[0] - 0.5).abs() < 1e-12);
            }
            other => panic!("unexpected {:?}", other),
        }
        match clf.classify(&[10.0, 0.0]).unwrap() {
            ClassScores::Probabilities(p) => assert!(p[1] > 0.99),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_multinomial_logistic_sums_to_one() {
        let clf = LogisticClassifier::new(linear(
            vec![vec![1.0], vec![0.0], vec![-1.0]],
            vec![0.0, 0.5, 0.0],
        ));
        let ClassScores::Probabilities(p) = clf.classify(&[2.0]).unwrap() else {
            panic!("expected probabilities");
        };
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert_eq!(argmax(&p), Some(0));
    }

    #[test]
    fn test_linear_svm_emits_labels() {
        let clf = LinearSvmClassifier::new(linear(vec![vec![1.0]], vec![-1.0]));
        assert_eq!(clf.classify(&[2.0]).unwrap(), ClassScores::Label(1));
        assert_eq!(clf.classify(&[0.5]).unwrap(), ClassScores::Label(0));
        assert!(!clf.provides_probabilities());
    }

    #[test]
    fn test_knn_vote_fractions() {
        let clf = KNearestClassifier::new(
            3,
            vec![vec![0.0], vec![0.1], vec![5.0], vec![5.1]],
            vec![0, 0, 1, 1],
            1,
        )
        .unwrap();
        assert_eq!(
            clf.classify(&[0.05]).unwrap(),
            ClassScores::Probabilities(vec![2.0 / 3.0, 1.0 / 3.0])
        );
        assert_eq!(
            clf.classify(&[1.0, 2.0]),
            Err(PredictError::ClassifierShape {
                expected: 1,
                actual: 2
            })
        );
    }

    #[test]
    fn test_knn_k_larger_than_training_set() {
        let clf = KNearestClassifier::new(10, vec![vec![0.0], vec![1.0]], vec![0, 1], 1).unwrap();
        assert_eq!(
            clf.classify(&[0.0]).unwrap(),
            ClassScores::Probabilities(vec![0.5, 0.5])
        );
    }

    #[test]
    fn test_invalid_classifiers_rejected() {
        assert!(LinearModel::new(vec![], vec![], 2).is_err());
        assert!(LinearModel::new(vec![vec![1.0, 2.0]], vec![], 2).is_err());
        assert!(LinearModel::new(vec![vec![1.0]], vec![0.0], 2).is_err());
        assert!(KNearestClassifier::new(0, vec![vec![0.0]], vec![0], 1).is_err());
        assert!(KNearestClassifier::new(1, vec![vec![0.0]], vec![], 1).is_err());
        assert!(KNearestClassifier::new(1, vec![vec![0.0]], vec![usize::MAX], 1).is_err());
        assert!(KNearestClassifier::new(1, vec![vec![0.0]], vec![MAX_KNN_CLASSES], 1).is_err());
        assert!(KNearestClassifier::new(1, vec![vec![0.0]], vec![MAX_KNN_CLASSES - 1], 1).is_ok());
    }

    #[test]
    fn test_classifier_tagging() {
        let spec: ClassifierSpec = serde_json::from_str(
            r#"{"type": "knn", "k": 1, "points": [[0.0]], "labels": [0]}"#,
        )
        .unwrap();
        let clf = spec.build(Path::new("."), 1).unwrap();
        assert_eq!(clf.kind(), "knn");

        let bad = serde_json::from_str::<ClassifierSpec>(r#"{"type": "random_forest"}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn test_argmax_ties_go_to_first() {
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }
}
