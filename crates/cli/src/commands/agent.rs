//! Commands against a running agent

use anyhow::Result;
use colored::Colorize;
use enose_lib::DetectionRequest;

use super::models::print_artifacts;
use crate::client::AgentClient;
use crate::output::{
    color_status, print_info, print_json, print_report, print_success, print_warning,
    OutputFormat,
};

pub async fn show_status(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let state = serde_json::to_value(status.state)?;
            let state = state.as_str().unwrap_or("unknown");

            println!("{}", "Agent Status".bold());
            println!("{}", "=".repeat(50));
            println!("State:        {}", color_status(state));
            println!("Window:       #{}", status.generation);
            println!(
                "Samples:      {} accepted, {} rejected",
                status.samples, status.rejected
            );
            println!("Window size:  {:.1}s", status.window_secs);
            match &status.environment {
                Some(env) => println!(
                    "Environment:  {:.1} °C, {:.1} %RH, {:.1} hPa",
                    env.temperature_c, env.humidity_pct, env.pressure_hpa
                ),
                None => println!("Environment:  {}", "no reading yet".dimmed()),
            }
            if status.models.is_empty() {
                print_warning("No model artifacts loaded");
            } else {
                println!("Models:       {}", status.models.join(", "));
            }
        }
    }

    Ok(())
}

pub async fn start_detection(
    client: &AgentClient,
    duration: Option<f64>,
    whitelist: Vec<String>,
    restart: bool,
    format: OutputFormat,
) -> Result<()> {
    let request = DetectionRequest {
        duration_secs: duration,
        whitelist: (!whitelist.is_empty()).then_some(whitelist),
    };
    let started = client.start(&request, restart).await?;

    match format {
        OutputFormat::Json => print_json(&started)?,
        OutputFormat::Table => {
            print_success(&format!("Detection #{} started", started.id));
            print_info("Run `enose agent latest` once the window closes");
        }
    }

    Ok(())
}

pub async fn cancel_detection(client: &AgentClient) -> Result<()> {
    client.cancel().await?;
    print_success("Detection cancelled");
    Ok(())
}

pub async fn stop_detection(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let report = client.stop().await?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

pub async fn show_latest(client: &AgentClient, format: OutputFormat) -> Result<()> {
    match client.latest().await? {
        Some(report) => match format {
            OutputFormat::Json => print_json(&report)?,
            OutputFormat::Table => print_report(&report),
        },
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Table => print_info("No detection has completed yet"),
        },
    }
    Ok(())
}

pub async fn show_models(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let models = client.models().await?;
    print_artifacts(&models, format)
}

pub async fn reload_models(client: &AgentClient, format: OutputFormat) -> Result<()> {
    let summary = client.reload_models().await?;
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_success(&format!("{} artifacts loaded", summary.loaded.len()));
            for rejected in &summary.rejected {
                print_warning(&format!("Rejected {}: {}", rejected.name, rejected.reason));
            }
        }
    }
    Ok(())
}
