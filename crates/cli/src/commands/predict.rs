//! Offline ensemble scoring of an exported window

use anyhow::{Context, Result};
use colored::Colorize;
use enose_lib::artifact::LoadReport;
use enose_lib::predictor::{DEFAULT_HARD_LABEL_CONFIDENCE, MIN_SAMPLES};
use enose_lib::sensor::load_window_csv;
use enose_lib::{ArtifactRegistry, EnsembleConfig, EnsembleOutcome, EnsemblePredictor};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::parse_channels;
use crate::output::{print_json, print_outcome, print_warning, OutputFormat};

pub struct PredictOptions {
    pub model_dir: PathBuf,
    pub whitelist: Vec<String>,
    pub channels: Vec<String>,
    pub hard_label_confidence: Option<f64>,
    pub min_samples: Option<usize>,
    pub parallel: bool,
}

impl PredictOptions {
    fn ensemble_config(&self) -> Result<EnsembleConfig> {
        Ok(EnsembleConfig {
            min_samples: self.min_samples.unwrap_or(MIN_SAMPLES),
            channels: parse_channels(&self.channels)?,
            hard_label_confidence: self
                .hard_label_confidence
                .unwrap_or(DEFAULT_HARD_LABEL_CONFIDENCE),
            parallel: self.parallel,
        })
    }
}

#[derive(Serialize)]
struct PredictOutput<'a> {
    window: &'a Path,
    samples: usize,
    models: &'a LoadReport,
    outcome: &'a EnsembleOutcome,
}

/// Load the model directory and score one window
pub fn score_csv(csv: &Path, options: &PredictOptions) -> Result<(usize, LoadReport, EnsembleOutcome)> {
    let config = options.ensemble_config()?;
    let window = load_window_csv(csv)
        .with_context(|| format!("Failed to load sample window {}", csv.display()))?;

    let registry = ArtifactRegistry::new();
    let report = registry.load_dir(&options.model_dir)?;
    let predictor = EnsemblePredictor::new(&config);
    let outcome = predictor.predict_ensemble(&window, &registry.list(), &options.whitelist);
    Ok((window.len(), report, outcome))
}

pub fn predict_window(csv: &Path, options: &PredictOptions, format: OutputFormat) -> Result<()> {
    let (samples, report, outcome) = score_csv(csv, options)?;

    match format {
        OutputFormat::Json => print_json(&PredictOutput {
            window: csv,
            samples,
            models: &report,
            outcome: &outcome,
        })?,
        OutputFormat::Table => {
            for rejected in &report.rejected {
                print_warning(&format!("Skipped {}: {}", rejected.name, rejected.reason));
            }
            println!(
                "{} {} ({} samples, {} models)",
                "Scoring".bold(),
                csv.display().to_string().cyan(),
                samples,
                report.loaded.len()
            );
            print_outcome(&outcome);
        }
    }

    Ok(())
}
