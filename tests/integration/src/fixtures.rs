//! Test fixtures
//!
//! Canned configs, routes and responses shaped like the platform's.

use arke_common::{GatewayConfig, RestConfig};
use arke_core::Snowflake;
use arke_http::{Method, Response, ResponseHeaders, Route};
use serde_json::json;

pub const TEST_TOKEN: &str = "test-token";
pub const API_BASE: &str = "https://api.test/api/v10";
pub const GATEWAY_URL: &str = "wss://gateway.test/?v=10&encoding=json";

/// Dispatcher config with no global ceiling, no lag and deterministic backoff
pub fn rest_config() -> RestConfig {
    let mut config = RestConfig::new(TEST_TOKEN);
    config.api_base = API_BASE.to_string();
    config.global_rate_limit = 0;
    config.bucket_lag_ms = 0;
    config.backoff = config.backoff.without_jitter();
    config
}

/// Gateway config for `shards` shards with deterministic backoff
pub fn gateway_config(shards: u32) -> GatewayConfig {
    let mut config = GatewayConfig::new(TEST_TOKEN);
    config.url = GATEWAY_URL.to_string();
    config.shard_count = shards;
    config.reconnect_backoff = config.reconnect_backoff.without_jitter();
    config.restart_backoff = config.restart_backoff.without_jitter();
    config
}

/// `POST /channels/{channel_id}/messages`
pub fn create_message(channel_id: u64) -> Route {
    Route::new(Method::Post, "/channels/{channel_id}/messages").channel_id(Snowflake::new(channel_id))
}

/// `GET /channels/{channel_id}/messages`
pub fn list_messages(channel_id: u64) -> Route {
    Route::new(Method::Get, "/channels/{channel_id}/messages").channel_id(Snowflake::new(channel_id))
}

/// Per-route rate-limit headers
pub fn bucket_headers(hash: &str, limit: u32, remaining: u32, reset_after: f64) -> ResponseHeaders {
    ResponseHeaders::new()
        .with("X-RateLimit-Bucket", hash)
        .with("X-RateLimit-Limit", limit.to_string())
        .with("X-RateLimit-Remaining", remaining.to_string())
        .with("X-RateLimit-Reset-After", reset_after.to_string())
}

pub fn ok(headers: ResponseHeaders) -> Response {
    Response::new(200, headers, b"{}".to_vec())
}

pub fn ok_json(body: &serde_json::Value, headers: ResponseHeaders) -> Response {
    Response::new(200, headers, body.to_string().into_bytes())
}

/// A 429 carrying its wait in both the header and the body
pub fn too_many_requests(retry_after: f64, global: bool) -> Response {
    let mut headers = ResponseHeaders::new()
        .with("Retry-After", retry_after.to_string())
        .with("X-RateLimit-Scope", if global { "global" } else { "user" });
    if global {
        headers.insert("X-RateLimit-Global", "true");
    }
    let body = json!({
        "message": "You are being rate limited.",
        "retry_after": retry_after,
        "global": global,
    });
    Response::new(429, headers, body.to_string().into_bytes())
}

pub fn server_error(status: u16) -> Response {
    Response::new(status, ResponseHeaders::new(), b"upstream error".to_vec())
}

/// A non-429 4xx with the platform's error payload
pub fn rejected(status: u16, code: u64, message: &str) -> Response {
    let body = json!({ "code": code, "message": message });
    Response::new(status, ResponseHeaders::new(), body.to_string().into_bytes())
}
