//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use enose_lib::{DetectionReport, EnsembleOutcome};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table, or a message when there is nothing to show
pub fn print_table<T: Tabled>(items: Vec<T>, empty_message: &str) {
    if items.is_empty() {
        println!("{}", empty_message.yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a 0-100 confidence
pub fn format_confidence(confidence: f64) -> String {
    format!("{:.1}%", confidence)
}

pub fn color_confidence(confidence: f64) -> String {
    let formatted = format_confidence(confidence);
    if confidence >= 80.0 {
        formatted.green().to_string()
    } else if confidence >= 60.0 {
        formatted.yellow().to_string()
    } else {
        formatted.red().to_string()
    }
}

/// Color session states and health statuses
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "collecting" | "scoring" => status.blue().to_string(),
        "completed" | "healthy" | "ready" => status.green().to_string(),
        "idle" => status.dimmed().to_string(),
        "cancelled" | "insufficient_data" | "degraded" => status.yellow().to_string(),
        "unhealthy" | "failed" => status.red().to_string(),
        _ => status.to_string(),
    }
}

/// Format Unix seconds as local-agnostic UTC text
pub fn format_timestamp(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

/// Shorten a hex fingerprint for tables
pub fn short_fingerprint(fingerprint: Option<&str>) -> String {
    match fingerprint {
        Some(f) if f.len() > 12 => f[..12].to_string(),
        Some(f) => f.to_string(),
        None => "-".to_string(),
    }
}

#[derive(Tabled)]
struct VoteRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

/// Print an ensemble outcome in table form
pub fn print_outcome(outcome: &EnsembleOutcome) {
    match outcome {
        EnsembleOutcome::Consensus(result) => {
            let rows: Vec<VoteRow> = result
                .votes
                .iter()
                .map(|v| VoteRow {
                    model: v.model.clone(),
                    label: v.label.clone(),
                    confidence: format_confidence(v.confidence),
                })
                .collect();
            print_table(rows, "No votes");
            println!(
                "{} {} ({})",
                "Consensus:".bold(),
                result.label.cyan().bold(),
                color_confidence(result.confidence)
            );
        }
        EnsembleOutcome::InsufficientData { samples, required } => {
            print_warning(&format!(
                "Insufficient data: {samples} samples, at least {required} required"
            ));
        }
        EnsembleOutcome::NoModels => print_warning("No model artifacts available"),
        EnsembleOutcome::PredictionFailed { attempted } => {
            print_warning(&format!("All {attempted} active artifacts failed to score"));
        }
    }
}

/// Print a detection report in table form
pub fn print_report(report: &DetectionReport) {
    println!("{} #{}", "Detection".bold(), report.id);
    println!("{}", "=".repeat(50));
    println!("Started:    {}", format_timestamp(report.started_at));
    println!("Finished:   {}", format_timestamp(report.finished_at));
    println!(
        "Samples:    {} accepted, {} rejected",
        report.samples_accepted, report.samples_rejected
    );
    println!("Outcome:    {}", color_status(report.outcome.kind()));
    println!();
    print_outcome(&report.outcome);
}
