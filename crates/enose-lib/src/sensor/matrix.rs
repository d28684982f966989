//! Rectangular sample windows

use super::channel::Channel;
use super::parser::{parse_sample_line, ParsedSample};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counts of accepted and rejected raw lines while building a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Named columns of numeric readings, one row per time sample
///
/// Every row has exactly `columns().len()` values: short rows are
/// zero-filled and long rows truncated on insertion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl SampleMatrix {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Empty matrix with the eight standard gas channel columns
    pub fn standard() -> Self {
        Self::new(Channel::ALL.iter().map(|c| c.name().to_string()).collect())
    }

    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        let mut matrix = Self::new(columns);
        for row in rows {
            matrix.push_row(row);
        }
        matrix
    }

    /// Build a standard window from raw device lines, dropping malformed ones
    pub fn from_lines<I, S>(lines: I) -> (Self, LineStats)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matrix = Self::standard();
        let mut stats = LineStats::default();
        for line in lines {
            match parse_sample_line(line.as_ref()) {
                Ok(sample) => {
                    matrix.push_sample(&sample);
                    stats.accepted += 1;
                }
                Err(e) => {
                    debug!(error = %e, "Dropping malformed sample line");
                    stats.rejected += 1;
                }
            }
        }
        (matrix, stats)
    }

    pub fn push_row(&mut self, mut row: Vec<f64>) {
        row.resize(self.columns.len(), 0.0);
        self.rows.push(row);
    }

    pub fn push_sample(&mut self, sample: &ParsedSample) {
        self.push_row(sample.values.to_vec());
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    /// Number of samples (rows)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the first column whose header resolves to `channel`
    pub fn column_index(&self, channel: Channel) -> Option<usize> {
        self.columns
            .iter()
            .position(|name| Channel::from_name(name) == Some(channel))
    }

    /// Values of a channel's column with non-finite cells replaced by zero
    pub fn channel_values(&self, channel: Channel) -> Option<Vec<f64>> {
        let idx = self.column_index(channel)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).copied().filter(|v| v.is_finite()).unwrap_or(0.0))
                .collect(),
        )
    }
}
