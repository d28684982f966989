//! Detection sessions: one timed window at a time

mod runner;
mod state;

pub use runner::{
    window_from_secs, DetectionConfig, DetectionRequest, DetectionRunner, RunnerStatus,
    DEFAULT_WINDOW, MAX_WINDOW,
};
pub use state::{ClosedWindow, DetectionSession, LineOutcome, SessionState};
