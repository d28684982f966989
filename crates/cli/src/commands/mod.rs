//! Subcommand implementations

pub mod agent;
pub mod features;
pub mod models;
pub mod predict;

use anyhow::{Context, Result};
use enose_lib::Channel;

/// Parse `--channels` values; an empty list means every channel
pub(crate) fn parse_channels(names: &[String]) -> Result<Vec<Channel>> {
    names
        .iter()
        .map(|name| name.trim().parse::<Channel>())
        .collect::<Result<Vec<_>, _>>()
        .context("Invalid --channels value")
}
