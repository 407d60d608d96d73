//! Configuration management for the sync client.

use clinisync_engine::{CollectionMap, DEFAULT_MAX_ATTEMPTS};
use std::env;
use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_DATABASE_URL: &str = "sqlite://clinisync.db";
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 5;

/// Client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the REST API, without trailing slash
    pub api_url: String,
    /// Liveness endpoint probed with HEAD
    pub health_url: String,
    /// SQLite connection URL for the local store
    pub database_url: String,
    /// Bearer token sent with every remote call
    pub auth_token: Option<String>,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    /// Attempt budget for newly queued intents
    pub max_attempts: u32,
    /// Connectivity assumed before the first probe
    pub start_online: bool,
    pub collections: CollectionMap,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("CLINISYNC_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let health_url =
            lookup("CLINISYNC_HEALTH_URL").unwrap_or_else(|| format!("{api_url}/health"));

        let database_url =
            lookup("CLINISYNC_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let auth_token = lookup("CLINISYNC_AUTH_TOKEN").filter(|token| !token.is_empty());

        let probe_interval = Duration::from_secs(parse_number(
            &lookup,
            "CLINISYNC_PROBE_INTERVAL_SECS",
            DEFAULT_PROBE_INTERVAL_SECS,
        )?);
        let probe_timeout = Duration::from_secs(parse_number(
            &lookup,
            "CLINISYNC_PROBE_TIMEOUT_SECS",
            DEFAULT_PROBE_TIMEOUT_SECS,
        )?);
        let max_attempts = parse_number(
            &lookup,
            "CLINISYNC_MAX_ATTEMPTS",
            u64::from(DEFAULT_MAX_ATTEMPTS),
        )?;
        let max_attempts = u32::try_from(max_attempts).map_err(|_| ConfigError::InvalidNumber {
            var: "CLINISYNC_MAX_ATTEMPTS",
            value: max_attempts.to_string(),
        })?;

        let start_online = match lookup("CLINISYNC_START_ONLINE") {
            None => true,
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => return Err(ConfigError::InvalidBool(value)),
            },
        };

        let collections = match lookup("CLINISYNC_COLLECTION_ENDPOINTS") {
            Some(spec) => CollectionMap::hospital_defaults().merge_spec(&spec)?,
            None => CollectionMap::hospital_defaults(),
        };

        Ok(Self {
            api_url,
            health_url,
            database_url,
            auth_token,
            probe_interval,
            probe_timeout,
            max_attempts,
            start_online,
            collections,
        })
    }
}

fn parse_number<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { var, value }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid {var} value: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("Invalid CLINISYNC_START_ONLINE value: {0}")]
    InvalidBool(String),

    #[error("Invalid CLINISYNC_COLLECTION_ENDPOINTS: {0}")]
    InvalidCollectionMap(#[from] clinisync_engine::Error),
}
