//! Command-line interface parsing for marketgate
//!
//! Flags override the environment configuration for a single run.

use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// The refresh interval is not a positive number of seconds
    #[error("Invalid refresh interval: '{0}'. Expected a positive number of seconds")]
    InvalidInterval(String),
}

/// marketgate - caching gateway for the game marketplace web client
#[derive(Parser, Debug)]
#[command(name = "marketgate")]
#[command(about = "Caching gateway between the marketplace web client and the game portal API")]
#[command(version)]
pub struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory for the disk cache mirror (overrides CACHE_DIR)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Seconds between background refresh cycles (overrides CACHE_REFRESH_INTERVAL)
    #[arg(long, value_name = "SECONDS", value_parser = parse_interval_arg)]
    pub refresh_interval: Option<u64>,

    /// Serve without the background refresh worker
    #[arg(long)]
    pub no_refresh: bool,
}

/// Parses a refresh interval argument
///
/// # Returns
/// * `Ok(seconds)` for a positive integer
/// * `Err(CliError::InvalidInterval)` otherwise
pub fn parse_interval_arg(s: &str) -> Result<u64, CliError> {
    match s.trim().parse::<u64>() {
        Ok(seconds) if seconds > 0 => Ok(seconds),
        _ => Err(CliError::InvalidInterval(s.to_string())),
    }
}
