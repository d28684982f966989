//! End-to-end scoring tests over synthetic windows

use super::*;
use crate::artifact::{
    resolve_active, KNearestClassifier, LinearModel, LinearSvmClassifier, LogisticClassifier,
    ModelArtifact, StandardScaler,
};
use crate::models::{EnsembleOutcome, Vote};
use crate::sensor::{SampleMatrix, NUM_CHANNELS};
use std::sync::Arc;

/// Deterministic uniform values in `[low, high)`
struct Lcg(u64);

impl Lcg {
    fn next(&mut self, low: f64, high: f64) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let unit = (self.0 >> 11) as f64 / (1u64 << 53) as f64;
        low + unit * (high - low)
    }
}

fn window(rng: &mut Lcg, rows: usize, low: f64, high: f64) -> SampleMatrix {
    let mut matrix = SampleMatrix::standard();
    for _ in 0..rows {
        matrix.push_row((0..NUM_CHANNELS).map(|_| rng.next(low, high)).collect());
    }
    matrix
}

fn knn_artifact() -> ModelArtifact {
    let extractor = FeatureExtractor::new();
    let columns = FeatureExtractor::feature_names();
    let mut rng = Lcg(7);

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for _ in 0..20 {
        let clean = extractor.extract(&window(&mut rng, 15, 15.0, 25.0));
        rows.push(reindex(&clean, &columns));
        labels.push(0);
        let contaminated = extractor.extract(&window(&mut rng, 15, 200.0, 300.0));
        rows.push(reindex(&contaminated, &columns));
        labels.push(1);
    }
    let scaler = StandardScaler::fit(&rows);
    let points = rows
        .iter()
        .map(|row| scaler.transform(row).unwrap())
        .collect();
    let clf = KNearestClassifier::new(3, points, labels, columns.len()).unwrap();
    ModelArtifact::new(
        "knn.json",
        Box::new(clf),
        scaler,
        columns,
        Some(vec!["clean".to_string(), "contaminated".to_string()]),
    )
}

/// Binary logistic model that always reports `p` for class index 1
fn fixed(name: &str, p: f64, classes: [&str; 2]) -> Arc<ModelArtifact> {
    let logit = (p / (1.0 - p)).ln();
    let model = LinearModel::new(vec![vec![0.0]], vec![logit], 1).unwrap();
    Arc::new(ModelArtifact::new(
        name,
        Box::new(LogisticClassifier::new(model)),
        StandardScaler::identity(1),
        vec!["MQ2_mean".to_string()],
        Some(classes.iter().map(|c| c.to_string()).collect()),
    ))
}

fn vote(label: &str, confidence: f64) -> Vote {
    Vote {
        model: format!("{label}-{confidence}"),
        label: label.to_string(),
        confidence,
    }
}

#[test]
fn test_clean_window_scored_clean() {
    let artifact = Arc::new(knn_artifact());
    let mut rng = Lcg(42);
    let sample = window(&mut rng, 15, 15.0, 25.0);

    let outcome = EnsemblePredictor::default().predict_ensemble(&sample, &[artifact], &[]);
    let result = outcome.result().expect("consensus");
    assert_eq!(result.label, "clean");
    assert!(result.confidence > 90.0, "confidence {}", result.confidence);
    assert_eq!(result.votes.len(), 1);
    assert_eq!(result.votes[0].model, "knn.json");
}

#[test]
fn test_majority_confidence() {
    let result = tally_votes(vec![
        vote("A", 90.0),
        vote("B", 60.0),
        vote("A", 80.0),
        vote("B", 50.0),
        vote("A", 70.0),
    ])
    .unwrap();
    assert_eq!(result.label, "A");
    assert!((result.confidence - 48.0).abs() < 1e-9);
    assert_eq!(result.votes.len(), 5);
}

#[test]
fn test_majority_through_ensemble() {
    let artifacts = vec![
        fixed("a1.json", 0.9, ["B", "A"]),
        fixed("a2.json", 0.8, ["B", "A"]),
        fixed("a3.json", 0.7, ["B", "A"]),
        fixed("b1.json", 0.4, ["B", "A"]),
        fixed("b2.json", 0.5, ["B", "A"]),
    ];
    let mut rng = Lcg(1);
    let sample = window(&mut rng, 12, 10.0, 20.0);
    let outcome = EnsemblePredictor::default().predict_ensemble(&sample, &artifacts, &[]);
    let result = outcome.into_result().unwrap();
    assert_eq!(result.label, "A");
    assert!((result.confidence - 48.0).abs() < 1e-6, "{}", result.confidence);
}

#[test]
fn test_tie_goes_to_first_seen() {
    let result = tally_votes(vec![vote("B", 10.0), vote("A", 99.0)]).unwrap();
    assert_eq!(result.label, "B");
    assert!((result.confidence - 5.0).abs() < 1e-12);
    assert!(tally_votes(Vec::new()).is_none());
}

#[test]
fn test_sample_minimum_boundary() {
    let artifacts = vec![fixed("m.json", 0.9, ["no", "yes"])];
    let predictor = EnsemblePredictor::default();
    let mut rng = Lcg(3);

    let nine = window(&mut rng, 9, 0.0, 1.0);
    assert_eq!(
        predictor.predict_ensemble(&nine, &artifacts, &[]),
        EnsembleOutcome::InsufficientData {
            samples: 9,
            required: 10
        }
    );

    let ten = window(&mut rng, 10, 0.0, 1.0);
    assert!(matches!(
        predictor.predict_ensemble(&ten, &artifacts, &[]),
        EnsembleOutcome::Consensus(_)
    ));
}

#[test]
fn test_no_models() {
    let mut rng = Lcg(5);
    let sample = window(&mut rng, 10, 0.0, 1.0);
    assert_eq!(
        EnsemblePredictor::default().predict_ensemble(&sample, &[], &[]),
        EnsembleOutcome::NoModels
    );
}

#[test]
fn test_every_artifact_failing() {
    let mismatched = Arc::new(ModelArtifact::new(
        "wide.json",
        Box::new(KNearestClassifier::new(1, vec![vec![0.0; 4]], vec![0], 4).unwrap()),
        StandardScaler::identity(4),
        vec!["MQ2_mean".to_string()],
        None,
    ));
    let mut rng = Lcg(9);
    let sample = window(&mut rng, 10, 0.0, 1.0);
    assert_eq!(
        EnsemblePredictor::default().predict_ensemble(&sample, &[mismatched], &[]),
        EnsembleOutcome::PredictionFailed { attempted: 1 }
    );
}

#[test]
fn test_failing_artifact_is_omitted() {
    let artifacts = vec![
        Arc::new(ModelArtifact::new(
            "broken.json",
            Box::new(KNearestClassifier::new(1, vec![vec![0.0; 4]], vec![0], 4).unwrap()),
            StandardScaler::identity(4),
            vec!["MQ2_mean".to_string()],
            None,
        )),
        fixed("ok.json", 0.8, ["no", "yes"]),
    ];
    let mut rng = Lcg(11);
    let sample = window(&mut rng, 10, 0.0, 1.0);
    let result = EnsemblePredictor::default()
        .predict_ensemble(&sample, &artifacts, &[])
        .into_result()
        .unwrap();
    assert_eq!(result.votes.len(), 1);
    assert_eq!(result.votes[0].model, "ok.json");
    assert!((result.confidence - 80.0).abs() < 1e-6);
}

#[test]
fn test_whitelist_selection_and_fallback() {
    let artifacts = vec![
        fixed("a.json", 0.9, ["no", "yes"]),
        fixed("b.json", 0.2, ["no", "yes"]),
    ];
    let mut rng = Lcg(13);
    let sample = window(&mut rng, 10, 0.0, 1.0);
    let predictor = EnsemblePredictor::default();

    let only_b = predictor
        .predict_ensemble(&sample, &artifacts, &["b.json".to_string()])
        .into_result()
        .unwrap();
    assert_eq!(only_b.label, "no");
    assert_eq!(only_b.votes.len(), 1);

    let fallback = predictor
        .predict_ensemble(&sample, &artifacts, &["missing.json".to_string()])
        .into_result()
        .unwrap();
    assert_eq!(fallback.votes.len(), 2);
    assert_eq!(resolve_active(&artifacts, &[]).len(), 2);
}

#[test]
fn test_hard_label_vote_outweighs_probabilities() {
    let svm = Arc::new(ModelArtifact::new(
        "svm.json",
        Box::new(LinearSvmClassifier::new(
            LinearModel::new(vec![vec![0.0]], vec![1.0], 1).unwrap(),
        )),
        StandardScaler::identity(1),
        vec!["MQ2_mean".to_string()],
        Some(vec!["clean".to_string(), "spoiled".to_string()]),
    ));
    let artifacts = vec![svm, fixed("lr.json", 0.3, ["clean", "spoiled"])];
    let mut rng = Lcg(17);
    let sample = window(&mut rng, 10, 0.0, 1.0);

    // one blind vote against one probabilistic vote: first seen wins the tie
    let result = EnsemblePredictor::default()
        .predict_ensemble(&sample, &artifacts, &[])
        .into_result()
        .unwrap();
    assert_eq!(result.label, "spoiled");
    assert!((result.confidence - 50.0).abs() < 1e-9);

    let tempered = EnsemblePredictor::new(&EnsembleConfig {
        hard_label_confidence: 60.0,
        ..EnsembleConfig::default()
    });
    let result = tempered
        .predict_ensemble(&sample, &artifacts, &[])
        .into_result()
        .unwrap();
    assert!((result.confidence - 30.0).abs() < 1e-9);
}

#[test]
fn test_parallel_scoring_keeps_vote_order() {
    let artifacts: Vec<Arc<ModelArtifact>> = (0..8)
        .map(|i| fixed(&format!("m{i}.json"), 0.55 + i as f64 * 0.05, ["no", "yes"]))
        .collect();
    let mut rng = Lcg(19);
    let sample = window(&mut rng, 10, 0.0, 1.0);

    let sequential = EnsemblePredictor::default().predict_ensemble(&sample, &artifacts, &[]);
    let parallel = EnsemblePredictor::new(&EnsembleConfig {
        parallel: true,
        ..EnsembleConfig::default()
    })
    .predict_ensemble(&sample, &artifacts, &[]);
    assert_eq!(sequential, parallel);
}
