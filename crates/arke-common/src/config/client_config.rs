//! Client configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).
//! Components receive clones of these structs at start and never mutate them.

use crate::retry::BackoffPolicy;
use arke_core::Intents;
use serde::Deserialize;
use std::env;
use std::time::Duration;

/// Main client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub app: AppSettings,
    pub rest: RestConfig,
    pub gateway: GatewayConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
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
    /// Read `APP_ENV`, falling back to development for unset or unknown values
    #[must_use]
    pub fn from_env() -> Self {
        match env::var("APP_ENV").map(|s| s.to_lowercase()).as_deref() {
            Ok("production") => Self::Production,
            Ok("staging") => Self::Staging,
            _ => Self::Development,
        }
    }

    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// REST dispatcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RestConfig {
    pub token: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Ceiling on 429 retries for a single request
    #[serde(default = "default_max_ratelimit_retries")]
    pub max_ratelimit_retries: u32,
    /// Ceiling on 5xx retries for a single request
    #[serde(default = "default_max_server_retries")]
    pub max_server_retries: u32,
    /// Account-wide requests per second
    #[serde(default = "default_global_rate_limit")]
    pub global_rate_limit: u32,
    /// Safety margin added to every reset-after value
    #[serde(default = "default_bucket_lag_ms")]
    pub bucket_lag_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_rest_backoff")]
    pub backoff: BackoffPolicy,
}

impl RestConfig {
    /// Configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: default_api_base(),
            max_ratelimit_retries: default_max_ratelimit_retries(),
            max_server_retries: default_max_server_retries(),
            global_rate_limit: default_global_rate_limit(),
            bucket_lag_ms: default_bucket_lag_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            backoff: default_rest_backoff(),
        }
    }

    #[must_use]
    pub fn bucket_lag(&self) -> Duration {
        Duration::from_millis(self.bucket_lag_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Gateway and shard manager configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub token: String,
    #[serde(default = "default_gateway_url")]
    pub url: String,
    #[serde(default)]
    pub intents: Intents,
    /// Total shard count, 0 = ask the platform
    #[serde(default)]
    pub shard_count: u32,
    /// Minimum spacing between two identify sends sharing a slot
    #[serde(default = "default_identify_spacing_ms")]
    pub identify_spacing_ms: u64,
    /// Shards that may identify in parallel (`session_start_limit.max_concurrency`)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
    #[serde(default = "default_large_threshold")]
    pub large_threshold: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Ceiling for Hello and Ready/Resumed after connecting
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Ack ceiling; 0 = one heartbeat interval
    #[serde(default)]
    pub heartbeat_timeout_ms: u64,
    /// Reconnect attempts a session makes before giving up to the shard manager
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_backoff")]
    pub reconnect_backoff: BackoffPolicy,
    #[serde(default = "default_restart_backoff")]
    pub restart_backoff: BackoffPolicy,
    /// Capacity of the event channel shared by all shards
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl GatewayConfig {
    /// Configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            url: default_gateway_url(),
            intents: Intents::default(),
            shard_count: 0,
            identify_spacing_ms: default_identify_spacing_ms(),
            max_concurrency: default_max_concurrency(),
            large_threshold: default_large_threshold(),
            connect_timeout_ms: default_connect_timeout_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
            heartbeat_timeout_ms: 0,
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_backoff: default_reconnect_backoff(),
            restart_backoff: default_restart_backoff(),
            event_buffer: default_event_buffer(),
        }
    }

    #[must_use]
    pub fn identify_spacing(&self) -> Duration {
        Duration::from_millis(self.identify_spacing_ms)
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    /// Ack ceiling for a given heartbeat interval
    #[must_use]
    pub fn heartbeat_timeout(&self, interval: Duration) -> Duration {
        if self.heartbeat_timeout_ms == 0 {
            interval
        } else {
            Duration::from_millis(self.heartbeat_timeout_ms)
        }
    }

    /// Effective shard count (at least one)
    #[must_use]
    pub fn total_shards(&self) -> u32 {
        self.shard_count.max(1)
    }
}

// Default value functions
fn default_app_name() -> String {
    "arke".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg/?v=10&encoding=json".to_string()
}

fn default_max_ratelimit_retries() -> u32 {
    5
}

fn default_max_server_retries() -> u32 {
    3
}

fn default_global_rate_limit() -> u32 {
    50
}

fn default_bucket_lag_ms() -> u64 {
    200
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_rest_backoff() -> BackoffPolicy {
    BackoffPolicy::new(500, 30_000, 0.25)
}

fn default_identify_spacing_ms() -> u64 {
    5_000
}

fn default_max_concurrency() -> u32 {
    1
}

fn default_large_threshold() -> u32 {
    50
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

fn default_handshake_timeout_ms() -> u64 {
    30_000
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_backoff() -> BackoffPolicy {
    BackoffPolicy::new(1_000, 30_000, 0.25)
}

fn default_restart_backoff() -> BackoffPolicy {
    BackoffPolicy::new(1_000, 60_000, 0.25)
}

fn default_event_buffer() -> usize {
    1024
}

/// Parse an optional numeric variable, falling back to a default
fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(default),
    }
}

impl ClientConfig {
    /// Configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: default_env(),
            },
            rest: RestConfig::new(token.clone()),
            gateway: GatewayConfig::new(token),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `ARKE_TOKEN` is missing or a numeric variable fails to parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let token = env::var("ARKE_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingVar("ARKE_TOKEN"))?;

        let intents = match env::var("ARKE_INTENTS") {
            Ok(raw) => {
                Intents::parse(&raw).map_err(|_| ConfigError::InvalidValue("ARKE_INTENTS", raw))?
            }
            Err(_) => Intents::default(),
        };

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: Environment::from_env(),
            },
            rest: RestConfig {
                token: token.clone(),
                api_base: env::var("ARKE_API_BASE").unwrap_or_else(|_| default_api_base()),
                max_ratelimit_retries: parse_var(
                    "ARKE_MAX_RATELIMIT_RETRIES",
                    default_max_ratelimit_retries(),
                )?,
                max_server_retries: parse_var(
                    "ARKE_MAX_SERVER_RETRIES",
                    default_max_server_retries(),
                )?,
                global_rate_limit: parse_var("ARKE_GLOBAL_RATE_LIMIT", default_global_rate_limit())?,
                bucket_lag_ms: parse_var("ARKE_BUCKET_LAG_MS", default_bucket_lag_ms())?,
                request_timeout_ms: parse_var(
                    "ARKE_REQUEST_TIMEOUT_MS",
                    default_request_timeout_ms(),
                )?,
                backoff: default_rest_backoff(),
            },
            gateway: GatewayConfig {
                token,
                url: env::var("ARKE_GATEWAY_URL").unwrap_or_else(|_| default_gateway_url()),
                intents,
                shard_count: parse_var("ARKE_SHARD_COUNT", 0)?,
                identify_spacing_ms: parse_var(
                    "ARKE_IDENTIFY_SPACING_MS",
                    default_identify_spacing_ms(),
                )?,
                max_concurrency: parse_var("ARKE_MAX_CONCURRENCY", default_max_concurrency())?,
                large_threshold: parse_var("ARKE_LARGE_THRESHOLD", default_large_threshold())?,
                connect_timeout_ms: parse_var(
                    "ARKE_CONNECT_TIMEOUT_MS",
                    default_connect_timeout_ms(),
                )?,
                handshake_timeout_ms: parse_var(
                    "ARKE_HANDSHAKE_TIMEOUT_MS",
                    default_handshake_timeout_ms(),
                )?,
                heartbeat_timeout_ms: parse_var("ARKE_HEARTBEAT_TIMEOUT_MS", 0)?,
                max_reconnect_attempts: parse_var(
                    "ARKE_MAX_RECONNECT_ATTEMPTS",
                    default_max_reconnect_attempts(),
                )?,
                reconnect_backoff: default_reconnect_backoff(),
                restart_backoff: default_restart_backoff(),
                event_buffer: parse_var("ARKE_EVENT_BUFFER", default_event_buffer())?,
            },
        })
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
