//! Model artifact inspection

use anyhow::{Context, Result};
use colored::Colorize;
use enose_lib::artifact::load_artifact;
use enose_lib::{ArtifactInfo, ArtifactRegistry};
use std::path::Path;
use tabled::Tabled;

use crate::output::{print_json, print_table, print_warning, short_fingerprint, OutputFormat};

#[derive(Tabled)]
pub(crate) struct ArtifactRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Probabilities")]
    probabilities: String,
    #[tabled(rename = "Columns")]
    columns: usize,
    #[tabled(rename = "Classes")]
    classes: String,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

impl From<&ArtifactInfo> for ArtifactRow {
    fn from(info: &ArtifactInfo) -> Self {
        Self {
            name: info.name.clone(),
            kind: info.kind.clone(),
            probabilities: if info.provides_probabilities { "yes" } else { "no" }.to_string(),
            columns: info.columns.len(),
            classes: info
                .classes
                .as_ref()
                .map(|c| c.join(", "))
                .unwrap_or_else(|| "legacy".to_string()),
            fingerprint: short_fingerprint(info.fingerprint.as_deref()),
        }
    }
}

pub(crate) fn print_artifacts(artifacts: &[ArtifactInfo], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => print_json(artifacts),
        OutputFormat::Table => {
            let rows: Vec<ArtifactRow> = artifacts.iter().map(ArtifactRow::from).collect();
            print_table(rows, "No model artifacts found");
            Ok(())
        }
    }
}

/// List the artifacts a directory would load, with the files it rejects
pub fn list_models(model_dir: &Path, format: OutputFormat) -> Result<()> {
    let registry = ArtifactRegistry::new();
    let report = registry.load_dir(model_dir)?;
    let infos: Vec<ArtifactInfo> = registry.list().iter().map(|a| a.info()).collect();

    if let OutputFormat::Table = format {
        for rejected in &report.rejected {
            print_warning(&format!("Rejected {}: {}", rejected.name, rejected.reason));
        }
    }
    print_artifacts(&infos, format)
}

/// Show one artifact manifest in detail
pub fn inspect_model(file: &Path, format: OutputFormat) -> Result<()> {
    let artifact = load_artifact(file)
        .with_context(|| format!("Failed to load artifact {}", file.display()))?;
    let info = artifact.info();

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            println!("{} {}", "Artifact".bold(), info.name.cyan());
            println!("{}", "=".repeat(50));
            println!("Kind:           {}", info.kind);
            println!(
                "Probabilities:  {}",
                if info.provides_probabilities { "yes" } else { "no (hard labels)" }
            );
            println!(
                "Classes:        {}",
                info.classes
                    .as_ref()
                    .map(|c| c.join(", "))
                    .unwrap_or_else(|| "legacy (0 = Non-Halal, 1 = Halal)".to_string())
            );
            println!(
                "Fingerprint:    {}",
                info.fingerprint.as_deref().unwrap_or("-")
            );
            println!();
            println!("{} ({})", "Columns".bold(), info.columns.len());
            println!("{}", "-".repeat(50));
            for (i, column) in info.columns.iter().enumerate() {
                println!("{:>4}  {}", i, column);
            }
        }
    }

    Ok(())
}
