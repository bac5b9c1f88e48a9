//! Rate-limit response headers

use crate::request::ResponseHeaders;
use serde::Deserialize;
use std::time::Duration;

pub const BUCKET: &str = "X-RateLimit-Bucket";
pub const LIMIT: &str = "X-RateLimit-Limit";
pub const REMAINING: &str = "X-RateLimit-Remaining";
pub const RESET: &str = "X-RateLimit-Reset";
pub const RESET_AFTER: &str = "X-RateLimit-Reset-After";
pub const GLOBAL: &str = "X-RateLimit-Global";
pub const SCOPE: &str = "X-RateLimit-Scope";
pub const RETRY_AFTER: &str = "Retry-After";

/// Longest wait taken from a server hint
pub const MAX_HINT: Duration = Duration::from_secs(86_400);

/// Which limit a 429 was raised against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    User,
    Global,
    /// Per-resource limit shared by every client
    Shared,
}

impl RateLimitScope {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Some(Self::User),
            "global" => Some(Self::Global),
            "shared" => Some(Self::Shared),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Global => "global",
            Self::Shared => "shared",
        }
    }
}

/// Rate-limit information carried by one response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHeaders {
    /// Opaque bucket hash; absent for routes without per-route limits
    pub bucket: Option<String>,
    pub limit: Option<u32>,
    pub remaining: Option<u32>,
    /// Epoch seconds at which the bucket resets
    pub reset: Option<f64>,
    pub reset_after: Option<Duration>,
    pub global: bool,
    pub scope: Option<RateLimitScope>,
    pub retry_after: Option<Duration>,
}

/// Parse a non-negative, finite number of seconds
fn seconds(raw: &str) -> Option<Duration> {
    raw.trim().parse::<f64>().ok().and_then(hint)
}

/// Seconds as a wait, capped at [`MAX_HINT`]
fn hint(value: f64) -> Option<Duration> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some(Duration::try_from_secs_f64(value).map_or(MAX_HINT, |wait| wait.min(MAX_HINT)))
}

fn flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

/// Fields of a 429 JSON body
#[derive(Debug, Deserialize)]
struct RateLimitedBody {
    retry_after: Option<f64>,
    #[serde(default)]
    global: bool,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &ResponseHeaders) -> Self {
        Self {
            bucket: headers
                .get(BUCKET)
                .map(str::trim)
                .filter(|b| !b.is_empty())
                .map(ToString::to_string),
            limit: headers.get(LIMIT).and_then(|v| v.trim().parse().ok()),
            remaining: headers.get(REMAINING).and_then(|v| v.trim().parse().ok()),
            reset: headers
                .get(RESET)
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|v| v.is_finite() && *v >= 0.0),
            reset_after: headers.get(RESET_AFTER).and_then(seconds),
            global: headers.get(GLOBAL).is_some_and(flag),
            scope: headers.get(SCOPE).and_then(RateLimitScope::parse),
            retry_after: headers.get(RETRY_AFTER).and_then(seconds),
        }
    }

    /// Fill gaps from a 429 body (`retry_after`, `global`)
    #[must_use]
    pub fn with_body_hints(mut self, body: &[u8]) -> Self {
        if let Ok(hints) = serde_json::from_slice::<RateLimitedBody>(body) {
            if self.retry_after.is_none() {
                self.retry_after = hints.retry_after.and_then(hint);
            }
            self.global |= hints.global;
        }
        self
    }

    /// Whether the account-wide limit was hit
    pub fn is_global(&self) -> bool {
        self.global || self.scope == Some(RateLimitScope::Global)
    }

    /// Wait a 429 asks for, falling back to the bucket reset
    pub fn retry_delay(&self) -> Option<Duration> {
        self.retry_after.or(self.reset_after)
    }
}
