//! Raw device line parsing

use super::channel::NUM_CHANNELS;
use crate::error::LineError;
use crate::models::EnvironmentReading;

/// Number of trailing environmental values (temperature, humidity, pressure)
pub const NUM_ENVIRONMENT_VALUES: usize = 3;

/// One accepted device line
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    /// Gas channel readings in device order
    pub values: [f64; NUM_CHANNELS],
    /// Present when the line carries the full environmental triplet
    pub environment: Option<EnvironmentReading>,
}

/// Parse one comma-separated device line
///
/// Lines with fewer than eight values or any non-numeric token are rejected;
/// values past the gas channels are split off as the environment reading.
pub fn parse_sample_line(line: &str) -> Result<ParsedSample, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    let values = line
        .split(',')
        .enumerate()
        .map(|(position, token)| {
            let token = token.trim();
            token
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| LineError::InvalidNumber {
                    token: token.to_string(),
                    position,
                })
        })
        .collect::<Result<Vec<f64>, LineError>>()?;

    if values.len() < NUM_CHANNELS {
        return Err(LineError::TooFewValues {
            expected: NUM_CHANNELS,
            actual: values.len(),
        });
    }

    let mut gas = [0.0; NUM_CHANNELS];
    gas.copy_from_slice(&values[..NUM_CHANNELS]);

    let environment = values
        .get(NUM_CHANNELS..NUM_CHANNELS + NUM_ENVIRONMENT_VALUES)
        .map(|env| EnvironmentReading {
            temperature_c: env[0],
            humidity_pct: env[1],
            // device reports Pa
            pressure_hpa: env[2] / 100.0,
        });

    Ok(ParsedSample {
        values: gas,
        environment,
    })
}
