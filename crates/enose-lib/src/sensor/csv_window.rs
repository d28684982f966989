//! Loading whole sample windows from CSV files
//!
//! Acquisition exports use `;` as the delimiter and a decimal comma
//! (`"120,5;80,2;..."`); plain comma-separated files are accepted too.
//! Headers are matched to channels the same way device columns are, and
//! cells that do not parse become zero.

use super::matrix::SampleMatrix;
use crate::error::WindowError;
use std::path::Path;

/// Load a window from a CSV file with a header row
pub fn load_window_csv(path: &Path) -> Result<SampleMatrix, WindowError> {
    let content = std::fs::read_to_string(path).map_err(|source| WindowError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_window_csv(&content)
}

/// Parse CSV text with a header row into a window
pub fn parse_window_csv(content: &str) -> Result<SampleMatrix, WindowError> {
    let header_line = content
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or(WindowError::MissingHeader)?;
    let delimiter = if header_line.contains(';') { b';' } else { b',' };
    let decimal_comma = delimiter == b';';

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    if columns.iter().all(|c| c.is_empty()) {
        return Err(WindowError::MissingHeader);
    }

    let mut matrix = SampleMatrix::new(columns);
    for record in reader.records() {
        let record = record?;
        if record.iter().all(str::is_empty) {
            continue;
        }
        matrix.push_row(record.iter().map(|cell| parse_cell(cell, decimal_comma)).collect());
    }
    Ok(matrix)
}

fn parse_cell(cell: &str, decimal_comma: bool) -> f64 {
    let parsed = if decimal_comma {
        cell.replace(',', ".").parse::<f64>()
    } else {
        cell.parse::<f64>()
    };
    parsed.ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}
