//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_env")]
    pub env: Environment,
    pub gateway: GatewaySettings,
    pub sharding: ShardingSettings,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Gateway connection settings
#[derive(Clone, Deserialize)]
pub struct GatewaySettings {
    /// Bot token used for IDENTIFY/RESUME and the gateway-info endpoint
    pub token: String,
    /// REST base used to discover the gateway URL and recommended shard count
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Fixed gateway URL; skips discovery when set
    #[serde(default)]
    pub url: Option<String>,
}

impl std::fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("token", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("url", &self.url)
            .finish()
    }
}

/// Shard fleet settings
#[derive(Debug, Clone, Deserialize)]
pub struct ShardingSettings {
    /// Fixed shard count; `None` means use the count recommended by the gateway-info endpoint
    #[serde(default)]
    pub shard_count: Option<u32>,
    #[serde(default = "default_allow_resharding")]
    pub allow_resharding: bool,
    #[serde(default = "default_startup_delay_secs")]
    pub startup_delay_secs: u64,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for ShardingSettings {
    fn default() -> Self {
        Self {
            shard_count: None,
            allow_resharding: default_allow_resharding(),
            startup_delay_secs: default_startup_delay_secs(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

// Default value functions
fn default_env() -> Environment {
    Environment::Development
}

fn default_api_base() -> String {
    "https://discord.com/api/v6".to_string()
}

fn default_allow_resharding() -> bool {
    true
}

fn default_startup_delay_secs() -> u64 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    ///
    /// `from_env` is this with `std::env::var` as the lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            env: lookup("APP_ENV")
                .and_then(|s| match s.to_lowercase().as_str() {
                    "production" => Some(Environment::Production),
                    "staging" => Some(Environment::Staging),
                    "development" => Some(Environment::Development),
                    _ => None,
                })
                .unwrap_or_default(),
            gateway: GatewaySettings {
                token: lookup("GATEWAY_TOKEN")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or(ConfigError::MissingVar("GATEWAY_TOKEN"))?,
                api_base: lookup("GATEWAY_API_BASE").unwrap_or_else(default_api_base),
                url: lookup("GATEWAY_URL").filter(|s| !s.trim().is_empty()),
            },
            sharding: ShardingSettings {
                shard_count: parse_opt(&lookup, "SHARD_COUNT")?,
                allow_resharding: parse_opt(&lookup, "ALLOW_RESHARDING")?
                    .unwrap_or_else(default_allow_resharding),
                startup_delay_secs: parse_opt(&lookup, "SHARD_STARTUP_DELAY_SECS")?
                    .unwrap_or_else(default_startup_delay_secs),
                backoff_base_ms: parse_opt(&lookup, "RECONNECT_BACKOFF_BASE_MS")?
                    .unwrap_or_else(default_backoff_base_ms),
                backoff_max_ms: parse_opt(&lookup, "RECONNECT_BACKOFF_MAX_MS")?
                    .unwrap_or_else(default_backoff_max_ms),
            },
        })
    }
}

fn parse_opt<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, raw)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
