//! Ensemble aggregation across every active artifact

use super::features::{FeatureExtractor, MIN_SAMPLES};
use super::single::{SingleModelPredictor, DEFAULT_HARD_LABEL_CONFIDENCE};
use crate::artifact::{resolve_active, ModelArtifact};
use crate::models::{EnsembleOutcome, EnsembleResult, FeatureVector, Vote};
use crate::sensor::{Channel, SampleMatrix};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Ensemble tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Windows with fewer rows are never scored
    pub min_samples: usize,
    /// Channels to extract; empty means all
    pub channels: Vec<Channel>,
    /// Confidence for votes from label-only classifiers (0-100)
    pub hard_label_confidence: f64,
    /// Score artifacts on the rayon pool
    pub parallel: bool,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            min_samples: MIN_SAMPLES,
            channels: Vec::new(),
            hard_label_confidence: DEFAULT_HARD_LABEL_CONFIDENCE,
            parallel: false,
        }
    }
}

/// Majority vote; ties go to the label seen first
///
/// Confidence is the winners' mean confidence scaled by their share of all
/// votes.
pub fn tally_votes(votes: Vec<Vote>) -> Option<EnsembleResult> {
    let total = votes.len();
    let mut groups: Vec<(&str, usize, f64)> = Vec::new();
    for vote in &votes {
        match groups.iter_mut().find(|(label, _, _)| *label == vote.label) {
            Some(group) => {
                group.1 += 1;
                group.2 += vote.confidence;
            }
            None => groups.push((&vote.label, 1, vote.confidence)),
        }
    }

    let (label, count, sum) = groups
        .iter()
        .fold(None, |best: Option<&(&str, usize, f64)>, group| match best {
            Some(b) if b.1 >= group.1 => best,
            _ => Some(group),
        })?;
    let mean = sum / *count as f64;
    let confidence = mean * (*count as f64 / total as f64);
    let label = label.to_string();

    Some(EnsembleResult {
        label,
        confidence,
        votes,
    })
}

/// Feature extraction plus per-artifact scoring plus consensus
#[derive(Debug, Clone)]
pub struct EnsemblePredictor {
    extractor: FeatureExtractor,
    predictor: SingleModelPredictor,
    min_samples: usize,
    parallel: bool,
}

impl Default for EnsemblePredictor {
    fn default() -> Self {
        Self::new(&EnsembleConfig::default())
    }
}

impl EnsemblePredictor {
    pub fn new(config: &EnsembleConfig) -> Self {
        Self {
            extractor: FeatureExtractor::with_channels(&config.channels),
            predictor: SingleModelPredictor::new(config.hard_label_confidence),
            min_samples: config.min_samples,
            parallel: config.parallel,
        }
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Score a closed window against the available artifacts
    pub fn predict_ensemble(
        &self,
        window: &SampleMatrix,
        available: &[Arc<ModelArtifact>],
        whitelist: &[String],
    ) -> EnsembleOutcome {
        if window.len() < self.min_samples {
            info!(
                samples = window.len(),
                required = self.min_samples,
                "Window too small to score"
            );
            return EnsembleOutcome::InsufficientData {
                samples: window.len(),
                required: self.min_samples,
            };
        }
        if available.is_empty() {
            warn!("No model artifacts available");
            return EnsembleOutcome::NoModels;
        }

        let start = Instant::now();
        let active = resolve_active(available, whitelist);
        let features = self.extractor.extract(window);
        let votes = self.collect_votes(&active, &features);
        debug!(
            attempted = active.len(),
            voted = votes.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Ensemble scoring finished"
        );

        match tally_votes(votes) {
            Some(result) => EnsembleOutcome::Consensus(result),
            None => EnsembleOutcome::PredictionFailed {
                attempted: active.len(),
            },
        }
    }

    /// Votes in artifact order, whether or not scoring ran in parallel
    fn collect_votes(&self, active: &[Arc<ModelArtifact>], features: &FeatureVector) -> Vec<Vote> {
        if self.parallel {
            active
                .par_iter()
                .filter_map(|artifact| self.predictor.predict_one(artifact, features))
                .collect()
        } else {
            active
                .iter()
                .filter_map(|artifact| self.predictor.predict_one(artifact, features))
                .collect()
        }
    }
}
