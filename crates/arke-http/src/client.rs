//! REST dispatcher
//!
//! Every request goes through the bucket tracker: acquire a permit, send,
//! hand the response back to the tracker, then decide whether to retry.

use crate::error::{ApiError, HttpError, HttpResult};
use crate::ratelimit::{RateLimitHeaders, RateLimiter, UpdateOutcome};
use crate::request::{Request, Response};
use crate::route::{Method, Route};
use crate::transport::{HttpTransport, ReqwestTransport, TransportError, TransportRequest};
use arke_common::RestConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Identify limits returned by `GET /gateway/bot`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

/// Gateway connection info for bots
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBotInfo {
    pub url: String,
    /// Recommended shard count
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

struct Inner {
    config: RestConfig,
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    shutdown: AtomicBool,
}

/// Rate-limited REST client
///
/// Cheap to clone; clones share buckets and the shutdown flag.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl RestClient {
    pub fn new(config: RestConfig, transport: Arc<dyn HttpTransport>) -> Self {
        let limiter = RateLimiter::new(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                limiter,
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Client over the default `reqwest` transport
    pub fn with_reqwest(config: RestConfig) -> HttpResult<Self> {
        let transport = ReqwestTransport::new(&config.token, config.request_timeout())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &RestConfig {
        &self.inner.config
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.inner.limiter
    }

    /// Stop admitting requests; those already in flight complete
    pub fn shutdown(&self) {
        if !self.inner.shutdown.swap(true, Ordering::SeqCst) {
            debug!("REST dispatcher shutting down");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    fn url_for(&self, route: &Route) -> String {
        format!(
            "{}{}",
            self.inner.config.api_base.trim_end_matches('/'),
            route.path()
        )
    }

    /// Send a request, waiting on rate limits and retrying per policy
    #[instrument(skip(self, request), fields(route = %request.route))]
    pub async fn send(&self, request: Request) -> HttpResult<Response> {
        if self.is_shutdown() {
            return Err(HttpError::Shutdown);
        }

        let config = &self.inner.config;
        let limiter = &self.inner.limiter;
        let key = request.route.bucket_key();
        let transport_request = TransportRequest {
            method: request.route.method(),
            url: self.url_for(&request.route),
            query: request.query,
            headers: request.headers,
            body: request.body,
        };

        let mut rate_limited = 0_u32;
        let mut server_failures = 0_u32;

        loop {
            let permit = limiter.acquire(&key).await;

            let sent = tokio::time::timeout(
                config.request_timeout(),
                self.inner.transport.execute(transport_request.clone()),
            )
            .await;
            let response = match sent {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    // No headers to learn from; releasing the permit keeps the decrement
                    drop(permit);
                    return Err(err.into());
                }
                Err(_) => {
                    drop(permit);
                    return Err(TransportError::Timeout.into());
                }
            };

            let mut headers = RateLimitHeaders::from_headers(&response.headers);
            if response.status == 429 {
                headers = headers.with_body_hints(&response.body);
            }

            if let UpdateOutcome::RetryAfter { duration, global } =
                limiter.update(permit, &headers, response.status)
            {
                rate_limited += 1;
                if rate_limited > config.max_ratelimit_retries {
                    return Err(HttpError::RateLimitExceeded {
                        key,
                        attempts: rate_limited,
                        retry_after: duration,
                    });
                }

                warn!(
                    key = %key,
                    global,
                    attempt = rate_limited,
                    retry_after_ms = duration.as_millis() as u64,
                    "Request rate limited, retrying"
                );
                tokio::time::sleep(duration).await;
                continue;
            }

            match response.status {
                status if status < 400 => {
                    debug!(key = %key, status, "Request completed");
                    return Ok(response);
                }
                status if status >= 500 => {
                    if server_failures >= config.max_server_retries {
                        return Err(HttpError::ServerError {
                            status,
                            attempts: server_failures + 1,
                            body: response.text(),
                        });
                    }

                    let delay = config
                        .backoff
                        .delay_with_hint(server_failures, headers.retry_after);
                    server_failures += 1;
                    warn!(
                        key = %key,
                        status,
                        attempt = server_failures,
                        delay_ms = delay.as_millis() as u64,
                        "Server error, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                status => {
                    debug!(key = %key, status, "Request rejected");
                    return Err(HttpError::RequestRejected {
                        status,
                        error: ApiError::from_body(&response.body),
                    });
                }
            }
        }
    }

    /// Send and decode a JSON response
    pub async fn request<T: DeserializeOwned>(&self, request: impl Into<Request>) -> HttpResult<T> {
        self.send(request.into()).await?.json()
    }

    /// Recommended shard count and identify limits
    pub async fn gateway_bot(&self) -> HttpResult<GatewayBotInfo> {
        self.request(Route::new(Method::Get, "/gateway/bot")).await
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("api_base", &self.inner.config.api_base)
            .field("buckets", &self.inner.limiter.len())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
