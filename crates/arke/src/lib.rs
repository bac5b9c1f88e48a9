//! # arke
//!
//! Client for the chat platform: a rate-limited REST dispatcher and a sharded
//! gateway behind one entry point.
//!
//! ```no_run
//! # async fn example() -> Result<(), arke::ClientError> {
//! use futures::StreamExt;
//!
//! let client = arke::Client::from_config(arke::ClientConfig::new("token"))?;
//! let (shards, mut events) = client.start_gateway().await?;
//! tokio::spawn(async move { shards.run().await });
//!
//! while let Some(event) = events.next().await {
//!     println!("{} on shard {}", event.name, event.shard_id);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use arke_common::{ClientConfig, ConfigError, GatewayConfig, RestConfig};
pub use arke_core::{Intents, Snowflake};
pub use arke_gateway::{
    ConnectionState, Event, EventStream, GatewayError, GatewayTransport, SessionStatus,
    ShardManager, ShutdownHandle, TungsteniteTransport,
};
pub use arke_http::{
    HttpError, HttpTransport, Method, Request, Response, RestClient, Route,
};

/// Errors surfaced by the client
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Client result type
pub type ClientResult<T> = Result<T, ClientError>;

/// Entry point wiring the REST dispatcher and the shard manager together
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    rest: RestClient,
    gateway_transport: Arc<dyn GatewayTransport>,
}

impl Client {
    /// Client over the default `reqwest` and `tokio-tungstenite` transports
    pub fn from_config(config: ClientConfig) -> ClientResult<Self> {
        let rest = RestClient::with_reqwest(config.rest.clone())?;
        Ok(Self {
            config,
            rest,
            gateway_transport: Arc::new(TungsteniteTransport::new()),
        })
    }

    /// Client over caller-provided transports
    pub fn with_transports(
        config: ClientConfig,
        http: Arc<dyn HttpTransport>,
        gateway: Arc<dyn GatewayTransport>,
    ) -> Self {
        let rest = RestClient::new(config.rest.clone(), http);
        Self {
            config,
            rest,
            gateway_transport: gateway,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    /// Build the shard manager and its event stream
    ///
    /// With no configured shard count the recommended count and identify
    /// concurrency are fetched from `GET /gateway/bot`. The manager is not
    /// started; call [`ShardManager::run`].
    pub async fn start_gateway(&self) -> ClientResult<(ShardManager, EventStream)> {
        let mut config = self.config.gateway.clone();

        if config.shard_count == 0 {
            let info = self.rest.gateway_bot().await?;
            let limit = &info.session_start_limit;
            tracing::info!(
                shards = info.shards,
                max_concurrency = limit.max_concurrency,
                remaining = limit.remaining,
                "Fetched gateway info"
            );
            if limit.remaining < info.shards {
                tracing::warn!(
                    remaining = limit.remaining,
                    reset_after_ms = limit.reset_after,
                    "Not enough session starts left for every shard"
                );
            }
            config.shard_count = info.shards.max(1);
            config.max_concurrency = limit.max_concurrency.max(1);
        }

        Ok(ShardManager::new(config, Arc::clone(&self.gateway_transport)))
    }

    /// Stop admitting REST requests
    pub fn shutdown(&self) {
        self.rest.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("app", &self.config.app.name)
            .field("rest", &self.rest)
            .finish()
    }
}
