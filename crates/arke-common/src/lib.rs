//! # arke-common
//!
//! Shared utilities including configuration, retry policy, and telemetry.

pub mod config;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    AppSettings, ClientConfig, ConfigError, Environment, GatewayConfig, RestConfig,
};
pub use retry::BackoffPolicy;
pub use telemetry::{try_init_tracing, TracingConfig, TracingError};
