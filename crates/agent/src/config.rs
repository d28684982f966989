//! Agent configuration

use anyhow::{bail, Context, Result};
use enose_lib::predictor::{EnsembleConfig, DEFAULT_HARD_LABEL_CONFIDENCE, MIN_SAMPLES};
use enose_lib::sensor::Channel;
use enose_lib::session::{window_from_secs, DetectionConfig};
use serde::Deserialize;
use std::path::PathBuf;

/// Environment variable naming the optional config file
pub const CONFIG_PATH_ENV: &str = "ENOSE_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "enose.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Device node or capture file; `-` reads standard input
    #[serde(default = "default_device")]
    pub device: String,

    /// Directory of artifact manifests
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// API server port for health/metrics/detections
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Detection window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Active gas channels; empty means all
    #[serde(default)]
    pub channels: Vec<String>,

    /// Default artifact whitelist; empty means all
    #[serde(default)]
    pub whitelist: Vec<String>,

    #[serde(default = "default_hard_label_confidence")]
    pub hard_label_confidence: f64,

    #[serde(default)]
    pub parallel_scoring: bool,

    /// Reload artifacts when the model directory changes
    #[serde(default = "default_true")]
    pub watch_models: bool,

    /// Seconds between device reopen attempts; 0 disables
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,

    /// Print every detection report to stdout as a JSON line
    #[serde(default = "default_true")]
    pub emit_reports: bool,
}

fn default_device() -> String {
    "-".to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_window_secs() -> f64 {
    15.0
}

fn default_min_samples() -> usize {
    MIN_SAMPLES
}

fn default_hard_label_confidence() -> f64 {
    DEFAULT_HARD_LABEL_CONFIDENCE
}

fn default_reconnect_secs() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

impl AgentConfig {
    /// Load from the optional config file, overridden by `ENOSE_*` variables
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("ENOSE")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("whitelist")
                    .with_list_parse_key("channels"),
            );
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder
            .build()
            .context("Failed to read agent configuration")?
            .try_deserialize::<Self>()
            .context("Invalid agent configuration")?;
        config.detection_config()?;
        Ok(config)
    }

    /// Whether the device is standard input
    pub fn reads_stdin(&self) -> bool {
        self.device == "-"
    }

    pub fn device_label(&self) -> &str {
        if self.reads_stdin() {
            "stdin"
        } else {
            &self.device
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.api_port)
    }

    /// Runner settings derived from this config
    pub fn detection_config(&self) -> Result<DetectionConfig> {
        let window = window_from_secs(self.window_secs)
            .with_context(|| format!("Invalid window_secs {}", self.window_secs))?;
        if self.min_samples == 0 {
            bail!("min_samples must be at least 1");
        }
        let channels = self
            .channels
            .iter()
            .map(|name| name.parse::<Channel>())
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid channel in configuration")?;

        Ok(DetectionConfig {
            window,
            whitelist: self.whitelist.clone(),
            ensemble: EnsembleConfig {
                min_samples: self.min_samples,
                channels,
                hard_label_confidence: self.hard_label_confidence,
                parallel: self.parallel_scoring,
            },
        })
    }
}
