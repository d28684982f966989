//! E-nose CLI
//!
//! Offline feature extraction and ensemble scoring of exported sample
//! windows, model artifact inspection, and control of a running agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{agent, features, models, predict};
use std::path::PathBuf;

/// E-nose detection CLI
#[derive(Parser)]
#[command(name = "enose")]
#[command(author, version, about = "CLI for the e-nose halal detector", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via ENOSE_API_URL env var)
    #[arg(long, env = "ENOSE_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Print library logs to stderr
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the feature vector of a CSV sample window
    Features {
        /// CSV export with a header row
        csv: PathBuf,

        /// Active gas channels (comma separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,
    },

    /// Score a CSV sample window against a model directory
    Predict {
        /// CSV export with a header row
        csv: PathBuf,

        /// Directory of artifact manifests
        #[arg(long, env = "ENOSE_MODEL_DIR")]
        model_dir: Option<PathBuf>,

        /// Artifacts allowed to vote (comma separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        whitelist: Vec<String>,

        /// Active gas channels (comma separated); all when omitted
        #[arg(long, value_delimiter = ',')]
        channels: Vec<String>,

        /// Confidence given to label-only classifiers (0-100)
        #[arg(long)]
        hard_label_confidence: Option<f64>,

        /// Smallest window that will be scored
        #[arg(long)]
        min_samples: Option<usize>,

        /// Score artifacts in parallel
        #[arg(long)]
        parallel: bool,
    },

    /// Inspect model artifacts
    #[command(subcommand)]
    Models(ModelsCommands),

    /// Control a running agent
    #[command(subcommand)]
    Agent(AgentCommands),
}

#[derive(Subcommand)]
pub enum ModelsCommands {
    /// List the artifacts in a model directory
    List {
        /// Directory of artifact manifests
        #[arg(long, env = "ENOSE_MODEL_DIR")]
        model_dir: Option<PathBuf>,
    },

    /// Show one artifact in detail
    Inspect {
        /// Artifact manifest
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Show the session state and latest environment reading
    Status,

    /// Open a detection window
    Start {
        /// Window length in seconds; agent default when omitted
        #[arg(long)]
        duration: Option<f64>,

        /// Artifacts allowed to vote (comma separated)
        #[arg(long, value_delimiter = ',')]
        whitelist: Vec<String>,

        /// Cancel a collecting window instead of failing
        #[arg(long)]
        restart: bool,
    },

    /// Discard the collecting window
    Cancel,

    /// Close the collecting window now and print its report
    Stop,

    /// Print the most recent detection report
    Latest,

    /// List the artifacts loaded by the agent
    Models,

    /// Ask the agent to rescan its model directory
    Reload,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter("debug")
            .init();
    }

    let settings = config::Config::load()?;
    let format = cli.format.unwrap_or_else(|| settings.output_format());

    match cli.command {
        Commands::Features { csv, channels } => {
            features::show_features(&csv, &channels, format)?;
        }
        Commands::Predict {
            csv,
            model_dir,
            whitelist,
            channels,
            hard_label_confidence,
            min_samples,
            parallel,
        } => {
            let options = predict::PredictOptions {
                model_dir: settings.model_dir(model_dir),
                whitelist,
                channels,
                hard_label_confidence,
                min_samples,
                parallel,
            };
            predict::predict_window(&csv, &options, format)?;
        }
        Commands::Models(models_cmd) => match models_cmd {
            ModelsCommands::List { model_dir } => {
                models::list_models(&settings.model_dir(model_dir), format)?;
            }
            ModelsCommands::Inspect { file } => {
                models::inspect_model(&file, format)?;
            }
        },
        Commands::Agent(agent_cmd) => {
            let client = client::AgentClient::new(&settings.api_url(cli.api_url))?;
            match agent_cmd {
                AgentCommands::Status => agent::show_status(&client, format).await?,
                AgentCommands::Start {
                    duration,
                    whitelist,
                    restart,
                } => agent::start_detection(&client, duration, whitelist, restart, format).await?,
                AgentCommands::Cancel => agent::cancel_detection(&client).await?,
                AgentCommands::Stop => agent::stop_detection(&client, format).await?,
                AgentCommands::Latest => agent::show_latest(&client, format).await?,
                AgentCommands::Models => agent::show_models(&client, format).await?,
                AgentCommands::Reload => agent::reload_models(&client, format).await?,
            }
        }
    }

    Ok(())
}
