//! Detection window state machine
//!
//! `Idle -> Collecting -> (Cancelled | InsufficientData | Ready)`, then
//! `Ready -> Scoring -> Completed`. A new window may start from any state
//! except `Collecting`.

use crate::error::{LineError, SessionError};
use crate::models::EnvironmentReading;
use crate::sensor::{parse_sample_line, LineStats, SampleMatrix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Collecting,
    Cancelled,
    InsufficientData,
    Ready,
    Scoring,
    Completed,
}

/// What happened to one fed line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Appended to the collecting window
    Accepted,
    /// Malformed while collecting; counted and dropped
    Rejected(LineError),
    /// No window is collecting
    Ignored,
}

/// A window handed out by `close`
#[derive(Debug, Clone)]
pub struct ClosedWindow {
    pub generation: u64,
    pub started_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
    pub window: SampleMatrix,
    pub stats: LineStats,
    /// Whether the window met the sample minimum
    pub sufficient: bool,
}

/// Owns at most one accumulating window
#[derive(Debug)]
pub struct DetectionSession {
    state: SessionState,
    window: SampleMatrix,
    stats: LineStats,
    min_samples: usize,
    generation: u64,
    started_at: Option<DateTime<Utc>>,
    environment: Option<EnvironmentReading>,
}

impl DetectionSession {
    pub fn new(min_samples: usize) -> Self {
        Self {
            state: SessionState::Idle,
            window: SampleMatrix::standard(),
            stats: LineStats::default(),
            min_samples,
            generation: 0,
            started_at: None,
            environment: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Incremented by every `start`
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_collecting(&self) -> bool {
        self.state == SessionState::Collecting
    }

    /// Rows in the collecting window
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn stats(&self) -> LineStats {
        self.stats
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Most recent environment reading seen on any line
    pub fn environment(&self) -> Option<EnvironmentReading> {
        self.environment
    }

    /// Open a fresh window
    pub fn start(&mut self) -> Result<u64, SessionError> {
        if self.is_collecting() {
            return Err(SessionError::AlreadyCollecting);
        }
        self.window = SampleMatrix::standard();
        self.stats = LineStats::default();
        self.generation += 1;
        self.started_at = Some(Utc::now());
        self.state = SessionState::Collecting;
        debug!(generation = self.generation, "Detection window opened");
        Ok(self.generation)
    }

    /// Cancel any collecting window, then open a fresh one
    pub fn restart(&mut self) -> u64 {
        if self.is_collecting() {
            self.discard();
        }
        self.generation += 1;
        self.window = SampleMatrix::standard();
        self.stats = LineStats::default();
        self.started_at = Some(Utc::now());
        self.state = SessionState::Collecting;
        self.generation
    }

    /// Parse a device line and append it when collecting
    pub fn push_line(&mut self, line: &str) -> LineOutcome {
        match parse_sample_line(line) {
            Ok(sample) => {
                if let Some(environment) = sample.environment {
                    self.environment = Some(environment);
                }
                if !self.is_collecting() {
                    return LineOutcome::Ignored;
                }
                self.window.push_sample(&sample);
                self.stats.accepted += 1;
                LineOutcome::Accepted
            }
            Err(e) => {
                if !self.is_collecting() {
                    return LineOutcome::Ignored;
                }
                self.stats.rejected += 1;
                LineOutcome::Rejected(e)
            }
        }
    }

    /// Drop the collecting window without scoring it
    pub fn cancel(&mut self) -> Result<(), SessionError> {
        if !self.is_collecting() {
            return Err(SessionError::NotCollecting);
        }
        self.discard();
        Ok(())
    }

    fn discard(&mut self) {
        debug!(
            generation = self.generation,
            samples = self.window.len(),
            "Detection window cancelled"
        );
        self.window = SampleMatrix::standard();
        self.state = SessionState::Cancelled;
    }

    /// Close the collecting window and hand it out for scoring
    pub fn close(&mut self) -> Result<ClosedWindow, SessionError> {
        if !self.is_collecting() {
            return Err(SessionError::NotCollecting);
        }
        let window = std::mem::replace(&mut self.window, SampleMatrix::standard());
        let sufficient = window.len() >= self.min_samples;
        self.state = if sufficient {
            SessionState::Ready
        } else {
            SessionState::InsufficientData
        };
        let closed_at = Utc::now();
        Ok(ClosedWindow {
            generation: self.generation,
            started_at: self.started_at.unwrap_or(closed_at),
            closed_at,
            window,
            stats: self.stats,
            sufficient,
        })
    }

    /// Mark a ready window as being scored
    pub fn begin_scoring(&mut self, generation: u64) {
        if generation == self.generation && self.state == SessionState::Ready {
            self.state = SessionState::Scoring;
        }
    }

    /// Mark scoring done; ignored if a newer window has started since
    pub fn complete(&mut self, generation: u64) {
        if generation == self.generation && self.state == SessionState::Scoring {
            self.state = SessionState::Completed;
        }
    }
}
