//! Error types for the detection pipeline
//!
//! Every failure inside the core is local: rows are dropped, artifacts are
//! refused, votes are omitted. These types carry the reason so callers can
//! log it; none of them escape the ensemble aggregator.

use std::path::PathBuf;
use thiserror::Error;

/// Why a raw sample line was rejected by the adapter
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LineError {
    #[error("empty line")]
    Empty,

    #[error("expected at least {expected} values, got {actual}")]
    TooFewValues { expected: usize, actual: usize },

    #[error("invalid number {token:?} at position {position}")]
    InvalidNumber { token: String, position: usize },
}

/// Failure while loading a window from a CSV file
#[derive(Debug, Error)]
pub enum WindowError {
    #[error("failed to read window file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("window file has no header row")]
    MissingHeader,
}

/// Failure while loading or validating a model artifact
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to read artifact {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("artifact manifest is not a JSON object")]
    NotAnObject,

    #[error("artifact is missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid scaler: {0}")]
    InvalidScaler(String),

    #[error("artifact has no training columns")]
    NoColumns,

    #[error("artifact lists {columns} columns but its scaler has {features} features")]
    ColumnMismatch { columns: usize, features: usize },

    #[error("invalid classifier: {0}")]
    InvalidClassifier(String),

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to load ONNX model: {0}")]
    Onnx(String),
}

/// Failure while scoring one feature vector with one artifact
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    #[error("feature vector is empty")]
    EmptyFeatures,

    #[error("feature `{0}` is not finite")]
    NonFiniteFeature(String),

    #[error("scaler expects {expected} features, row has {actual}")]
    ScalerShape { expected: usize, actual: usize },

    #[error("classifier expects {expected} features, row has {actual}")]
    ClassifierShape { expected: usize, actual: usize },

    #[error("class index {index} out of range for {classes} classes")]
    UnknownClass { index: usize, classes: usize },

    #[error("classifier produced no usable output: {0}")]
    Classifier(String),
}

/// Misuse of the detection session state machine
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    #[error("a detection window is already collecting")]
    AlreadyCollecting,

    #[error("no detection window is collecting")]
    NotCollecting,

    #[error("window duration must be a positive number of seconds no longer than one day")]
    InvalidDuration,
}

/// Unknown sensor channel name
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown sensor channel `{0}`")]
pub struct UnknownChannel(pub String);
