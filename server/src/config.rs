//! Server configuration module.
//!
//! Parses configuration from environment variables for the Taskboard server.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `TASKBOARD_ASANA_TOKEN` | Yes | - | Personal access token for the Asana API |
//! | `TASKBOARD_PROJECT_IDS` | Yes | - | Format: `gid1,gid2` |
//! | `TASKBOARD_ASANA_URL` | No | `https://app.asana.com/api/1.0` | Upstream API base URL |
//! | `TASKBOARD_CACHE_TTL_SECS` | No | 300 | Snapshot validity window |
//! | `TASKBOARD_POLL_INTERVAL_SECS` | No | 300 | Auto-update interval, `0` disables it |
//! | `TASKBOARD_REQUEST_TIMEOUT_SECS` | No | none | Per-request upstream timeout |
//! | `TASKBOARD_COMPLETED_SINCE` | No | `now` | `completed_since` filter for task lists |
//! | `PORT` | No | 8080 | HTTP server port |

use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Default HTTP server port.
const DEFAULT_PORT: u16 = 8080;

/// Default upstream API base URL.
pub const DEFAULT_ASANA_URL: &str = "https://app.asana.com/api/1.0";

/// Default snapshot validity window (5 minutes).
const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default auto-update interval (5 minutes).
const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;

/// Default `completed_since` filter. Asana returns only incomplete tasks for `now`.
pub const DEFAULT_COMPLETED_SINCE: &str = "now";

/// Errors that can occur when parsing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has invalid format.
    #[error("invalid format for {var}: {message}")]
    InvalidFormat { var: String, message: String },

    /// Port number is invalid.
    #[error("invalid port number: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),

    /// Configuration validation failed.
    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Server configuration parsed from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Bearer token for the upstream API.
    pub asana_token: String,

    /// Upstream API base URL.
    pub asana_url: String,

    /// Tracked project identifiers, in display order.
    pub project_ids: Vec<String>,

    /// How long an aggregated snapshot stays valid.
    pub cache_ttl: Duration,

    /// Auto-update interval. `None` disables background polling.
    pub poll_interval: Option<Duration>,

    /// Per-request upstream timeout. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,

    /// Value sent as `completed_since` when listing tasks.
    pub completed_since: String,

    /// HTTP server port.
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("asana_token", &"<redacted>")
            .field("asana_url", &self.asana_url)
            .field("project_ids", &self.project_ids)
            .field("cache_ttl", &self.cache_ttl)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("completed_since", &self.completed_since)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// Parse configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - `TASKBOARD_ASANA_TOKEN` or `TASKBOARD_PROJECT_IDS` is missing or empty
    /// - A numeric variable is not a valid number
    /// - Port number is not a valid u16
    ///
    /// # Example
    ///
    /// ```no_run
    /// use taskboard_server::config::Config;
    ///
    /// let config = Config::from_env().expect("Failed to load config");
    /// println!("Tracking {} projects", config.project_ids.len());
    /// ```
    pub fn from_env() -> Result<Self, ConfigError> {
        let asana_token = env::var("TASKBOARD_ASANA_TOKEN").unwrap_or_default();
        let asana_url = env::var("TASKBOARD_ASANA_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ASANA_URL.to_string());
        let project_ids = parse_project_ids()?;
        let cache_ttl = parse_secs_env("TASKBOARD_CACHE_TTL_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        let poll_interval = parse_secs_env("TASKBOARD_POLL_INTERVAL_SECS")?
            .unwrap_or(Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS));
        let request_timeout = parse_secs_env("TASKBOARD_REQUEST_TIMEOUT_SECS")?;
        let completed_since = env::var("TASKBOARD_COMPLETED_SINCE")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COMPLETED_SINCE.to_string());
        let port = parse_port()?;

        let config = Self {
            asana_token,
            asana_url,
            project_ids,
            cache_ttl,
            poll_interval: (!poll_interval.is_zero()).then_some(poll_interval),
            request_timeout: request_timeout.filter(|t| !t.is_zero()),
            completed_since,
            port,
        };

        config.validate()?;

        if config.poll_interval.is_none() {
            warn!("TASKBOARD_POLL_INTERVAL_SECS is 0 - background auto-update is disabled");
        }

        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Ensures the upstream token and at least one project id are present and
    /// that the base URL uses an HTTP scheme.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.asana_token.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "TASKBOARD_ASANA_TOKEN".to_string(),
            ));
        }

        if self.project_ids.is_empty() {
            return Err(ConfigError::MissingEnvVar(
                "TASKBOARD_PROJECT_IDS".to_string(),
            ));
        }

        if !(self.asana_url.starts_with("http://") || self.asana_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "TASKBOARD_ASANA_URL must be an http(s) URL, got '{}'",
                self.asana_url
            )));
        }

        Ok(())
    }
}

/// Parse the PORT environment variable.
///
/// Returns the default port if not set.
fn parse_port() -> Result<u16, ConfigError> {
    match env::var("PORT") {
        Ok(port_str) => Ok(port_str.trim().parse()?),
        Err(env::VarError::NotPresent) => Ok(DEFAULT_PORT),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidFormat {
            var: "PORT".to_string(),
            message: "contains invalid unicode".to_string(),
        }),
    }
}

/// Parse an environment variable holding a number of seconds.
///
/// Returns `None` if the variable is unset or empty.
fn parse_secs_env(name: &str) -> Result<Option<Duration>, ConfigError> {
    let value = match env::var(name) {
        Ok(v) if !v.trim().is_empty() => v,
        _ => return Ok(None),
    };

    value
        .trim()
        .parse::<u64>()
        .map(|secs| Some(Duration::from_secs(secs)))
        .map_err(|e| ConfigError::InvalidFormat {
            var: name.to_string(),
            message: format!("expected a whole number of seconds, got '{value}': {e}"),
        })
}

/// Parse the TASKBOARD_PROJECT_IDS environment variable.
///
/// Expected format: `gid1,gid2`. Blank entries are skipped and duplicates
/// keep their first position.
fn parse_project_ids() -> Result<Vec<String>, ConfigError> {
    let ids_str = match env::var("TASKBOARD_PROJECT_IDS") {
        Ok(s) if !s.is_empty() => s,
        _ => return Ok(Vec::new()),
    };

    let mut ids: Vec<String> = Vec::new();

    for id in ids_str.split(',') {
        let id = id.trim();
        if id.is_empty() {
            continue;
        }

        if id.contains(char::is_whitespace) || id.contains('/') {
            return Err(ConfigError::InvalidFormat {
                var: "TASKBOARD_PROJECT_IDS".to_string(),
                message: format!("invalid project id '{id}'"),
            });
        }

        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }

    Ok(ids)
}
