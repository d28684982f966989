//! Buffer-to-matrix adapter
//!
//! Turns raw device lines (or exported CSV windows) into rectangular
//! matrices of gas readings with named columns.

mod channel;
mod csv_window;
mod matrix;
mod parser;
mod source;

pub use channel::{normalize_column_name, Channel, NUM_CHANNELS};
pub use csv_window::{load_window_csv, parse_window_csv};
pub use matrix::{LineStats, SampleMatrix};
pub use parser::{parse_sample_line, ParsedSample, NUM_ENVIRONMENT_VALUES};
pub use source::{open_device, stdin_source, LineSource, SampleSource};
