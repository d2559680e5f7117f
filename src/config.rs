//! Configuration module for marketgate.
//!
//! Loads configuration from environment variables (and `.env`), then applies
//! command-line overrides. Values are read once at startup and never change.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheManager;
use crate::cli::Cli;
use crate::refresh::{RefreshConfig, SkillsPrefetch, DEFAULT_STOP_TIMEOUT};
use crate::upstream::{DEFAULT_API_URL, DEFAULT_TIMEOUT};

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_REFRESH_SECS: u64 = 3600;

/// Errors raised while reading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set but cannot be used
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Administrative portal token (`RPG_TOKEN`)
    pub admin_token: Option<String>,
    /// Portal endpoint
    pub api_url: String,
    /// Disk cache directory
    pub cache_dir: PathBuf,
    pub refresh_interval: Duration,
    pub upstream_timeout: Duration,
    /// Refresh skills for every catalog class with the admin token
    pub prefetch_skills: bool,
    /// Run the background refresh worker
    pub refresh_enabled: bool,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("cache_dir", &self.cache_dir)
            .field("refresh_interval", &self.refresh_interval)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("prefetch_skills", &self.prefetch_skills)
            .field("refresh_enabled", &self.refresh_enabled)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let admin_token = lookup("RPG_TOKEN")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let api_url = lookup("RPG_API_URL")
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let cache_dir = lookup("CACHE_DIR")
            .filter(|d| !d.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(CacheManager::default_dir);

        let refresh_secs = parse_positive(&lookup, "CACHE_REFRESH_INTERVAL", DEFAULT_REFRESH_SECS)?;
        let timeout_secs = parse_positive(&lookup, "UPSTREAM_TIMEOUT", DEFAULT_TIMEOUT.as_secs())?;

        let port = match lookup("PORT") {
            Some(value) => value.trim().parse::<u16>().map_err(|_| ConfigError::InvalidValue {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let prefetch_skills = match lookup("PREFETCH_SKILLS") {
            Some(value) => parse_flag(&value).ok_or(ConfigError::InvalidValue {
                name: "PREFETCH_SKILLS",
                value,
            })?,
            None => false,
        };

        Ok(Self {
            admin_token,
            api_url,
            cache_dir,
            refresh_interval: Duration::from_secs(refresh_secs),
            upstream_timeout: Duration::from_secs(timeout_secs),
            prefetch_skills,
            refresh_enabled: true,
            port,
        })
    }

    /// Applies command-line overrides
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(dir) = &cli.cache_dir {
            self.cache_dir = dir.clone();
        }
        if let Some(seconds) = cli.refresh_interval {
            self.refresh_interval = Duration::from_secs(seconds);
        }
        if cli.no_refresh {
            self.refresh_enabled = false;
        }
        self
    }

    /// Skills refresh policy for the refresher
    pub fn skills_prefetch(&self) -> SkillsPrefetch {
        if self.prefetch_skills {
            SkillsPrefetch::FromCatalog
        } else {
            SkillsPrefetch::OnDemand
        }
    }

    /// Settings for the refresh worker
    pub fn refresh_config(&self) -> RefreshConfig {
        RefreshConfig {
            interval: self.refresh_interval,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
        }
    }
}

fn parse_positive<F>(lookup: &F, name: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => match value.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue { name, value }),
        },
        None => Ok(default),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
