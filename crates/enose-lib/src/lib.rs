//! Electronic-nose detection library
//!
//! This crate provides the core functionality for:
//! - Turning raw sensor lines and CSV exports into sample windows
//! - Statistical feature extraction over the gas channels
//! - Loading trained model artifacts and scoring them as an ensemble
//! - Timed detection sessions over a live device stream
//! - Health checks and observability

pub mod artifact;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod sensor;
pub mod session;

pub use artifact::{ArtifactInfo, ArtifactRegistry, ModelArtifact};
pub use error::{ArtifactError, LineError, PredictError, SessionError, WindowError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{DetectorMetrics, StructuredLogger};
pub use predictor::{EnsembleConfig, EnsemblePredictor, FeatureExtractor};
pub use sensor::{Channel, SampleMatrix};
pub use session::{DetectionConfig, DetectionRequest, DetectionRunner, RunnerStatus};
