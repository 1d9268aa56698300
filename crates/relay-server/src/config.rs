//! Server configuration.
//!
//! Loading flow: start from compiled defaults, then apply environment
//! variable overrides. The signing secret is the only required variable —
//! missing it is fatal at boot. Optional variables fall back to defaults
//! when absent, but a present-and-malformed value is a configuration error,
//! not something to silently ignore.

use serde::{Deserialize, Serialize};

use relay_core::Role;

/// Configuration error: fatal at boot.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    /// An environment variable is present but malformed.
    #[error("invalid value '{value}' for {name}")]
    InvalidVar {
        /// Variable name.
        name: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Configuration for the relay server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `4230`; `0` auto-assigns).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Heartbeat ping interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Disconnect after this many seconds without a pong.
    pub heartbeat_timeout_secs: u64,
    /// Interval of the demo counter tick in seconds.
    pub counter_interval_secs: u64,
    /// JWT signing secret shared with the login surface. Required.
    pub jwt_secret: String,
    /// Sandbox user directory seed: `(name, role)` pairs.
    pub users: Vec<(String, Role)>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 4230,
            max_connections: 512,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            counter_interval_secs: 5,
            jwt_secret: String::new(),
            users: Vec::new(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        config.jwt_secret = std::env::var("RELAY_JWT_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty())
            .ok_or(ConfigError::MissingVar("RELAY_JWT_SECRET"))?;

        if let Ok(host) = std::env::var("RELAY_HOST") {
            config.host = host;
        }
        if let Some(port) = read_env_u64("RELAY_PORT", 65535)? {
            config.port = port as u16;
        }
        if let Some(max) = read_env_u64("RELAY_MAX_CONNECTIONS", 1_000_000)? {
            config.max_connections = max as usize;
        }
        if let Some(interval) = read_env_u64("RELAY_HEARTBEAT_INTERVAL_SECS", 3600)? {
            config.heartbeat_interval_secs = interval;
        }
        if let Some(timeout) = read_env_u64("RELAY_HEARTBEAT_TIMEOUT_SECS", 86_400)? {
            config.heartbeat_timeout_secs = timeout;
        }
        if let Some(interval) = read_env_u64("RELAY_COUNTER_INTERVAL_SECS", 3600)? {
            config.counter_interval_secs = interval;
        }
        if let Ok(users) = std::env::var("RELAY_USERS") {
            config.users = parse_users(&users)?;
        }

        Ok(config)
    }
}

/// Read an optional integer variable, rejecting malformed or out-of-range
/// values.
fn read_env_u64(name: &'static str, max: u64) -> Result<Option<u64>, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            let value = raw.parse::<u64>().ok().filter(|value| *value <= max).ok_or(
                ConfigError::InvalidVar {
                    name,
                    value: raw.clone(),
                },
            )?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

/// Parse the sandbox user list: `"alice:admin,bob:user"`.
pub fn parse_users(raw: &str) -> Result<Vec<(String, Role)>, ConfigError> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .map(|entry| {
            let (name, role) = entry
                .trim()
                .split_once(':')
                .ok_or_else(|| ConfigError::InvalidVar {
                    name: "RELAY_USERS",
                    value: entry.to_owned(),
                })?;
            let role = match role.trim() {
                "admin" => Role::Admin,
                "user" => Role::User,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "RELAY_USERS",
                        value: entry.to_owned(),
                    });
                }
            };
            Ok((name.trim().to_owned(), role))
        })
        .collect()
}
