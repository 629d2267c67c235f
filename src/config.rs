//! Runtime configuration read from the environment.

use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT_VAR: &str = "MCP_SSH_CONNECT_TIMEOUT_SECS";
const INACTIVITY_TIMEOUT_VAR: &str = "MCP_SSH_INACTIVITY_TIMEOUT_SECS";
const KEEPALIVE_VAR: &str = "MCP_SSH_KEEPALIVE_SECS";

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Settings applied to every SSH connection the server opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Upper bound on TCP connect, handshake and authentication.
    pub connect_timeout: Duration,
    /// russh session inactivity timeout. `None` keeps idle sessions open.
    pub inactivity_timeout: Option<Duration>,
    /// Interval between SSH keepalive requests. `None` disables them.
    pub keepalive_interval: Option<Duration>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            inactivity_timeout: None,
            keepalive_interval: None,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let connect_timeout = match seconds(&lookup, CONNECT_TIMEOUT_VAR)? {
            Some(0) | None => defaults.connect_timeout,
            Some(secs) => Duration::from_secs(secs),
        };

        Ok(Self {
            connect_timeout,
            inactivity_timeout: optional_duration(&lookup, INACTIVITY_TIMEOUT_VAR)?,
            keepalive_interval: optional_duration(&lookup, KEEPALIVE_VAR)?,
        })
    }
}

fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<u64>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidSeconds { var, value: raw })
}

// Zero means "disabled".
fn optional_duration(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    Ok(seconds(lookup, var)?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs))
}
