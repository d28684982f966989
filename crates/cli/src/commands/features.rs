//! Feature extraction over an exported window

use anyhow::{Context, Result};
use colored::Colorize;
use enose_lib::sensor::load_window_csv;
use enose_lib::{FeatureExtractor, FeatureVector, SampleMatrix};
use std::path::Path;
use tabled::Tabled;

use super::parse_channels;
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Tabled)]
struct FeatureRow {
    #[tabled(rename = "Feature")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

/// Load a CSV window and extract its features
pub fn extract_from_csv(csv: &Path, channels: &[String]) -> Result<(SampleMatrix, FeatureVector)> {
    let channels = parse_channels(channels)?;
    let window = load_window_csv(csv)
        .with_context(|| format!("Failed to load sample window {}", csv.display()))?;
    let features = FeatureExtractor::with_channels(&channels).extract(&window);
    Ok((window, features))
}

pub fn show_features(csv: &Path, channels: &[String], format: OutputFormat) -> Result<()> {
    let (window, features) = extract_from_csv(csv, channels)?;

    match format {
        OutputFormat::Json => print_json(&features)?,
        OutputFormat::Table => {
            println!(
                "{} {} ({} samples)",
                "Features of".bold(),
                csv.display().to_string().cyan(),
                window.len()
            );
            let rows: Vec<FeatureRow> = features
                .iter()
                .map(|(name, value)| FeatureRow {
                    name: name.to_string(),
                    value: format!("{value:.6}"),
                })
                .collect();
            print_table(rows, "No features extracted");
        }
    }

    Ok(())
}
