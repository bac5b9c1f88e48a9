//! Per-bucket state

use super::headers::RateLimitHeaders;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Mutable state behind one bucket record
///
/// Starts with a single token so the first request goes out and teaches us
/// the real limit.
#[derive(Debug)]
pub(crate) struct BucketState {
    pub(crate) hash: Option<String>,
    pub(crate) limit: Option<u32>,
    pub(crate) remaining: u32,
    /// Wall-clock reset reported by the server
    pub(crate) reset_at: Option<DateTime<Utc>>,
    /// Last reset-after reported, lag included
    pub(crate) reset_after: Option<Duration>,
    /// Monotonic instant the window resets
    pub(crate) resets: Option<Instant>,
    /// False once the route answered without a bucket header
    pub(crate) tracked: bool,
}

impl BucketState {
    pub(crate) fn new() -> Self {
        Self {
            hash: None,
            limit: None,
            remaining: 1,
            reset_at: None,
            reset_after: None,
            resets: None,
            tracked: true,
        }
    }

    pub(crate) fn with_hash(hash: &str) -> Self {
        Self {
            hash: Some(hash.to_string()),
            ..Self::new()
        }
    }

    fn refill(&mut self) {
        self.remaining = self.limit.unwrap_or(1).max(1);
        self.resets = None;
    }

    /// Suspend until at least one token is available
    pub(crate) async fn wait_for_capacity(&mut self) {
        if !self.tracked {
            return;
        }

        if self.remaining == 0 {
            if let Some(at) = self.resets {
                if at > Instant::now() {
                    debug!(
                        bucket = self.hash.as_deref().unwrap_or("unknown"),
                        wait_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64,
                        "Bucket exhausted, waiting for reset"
                    );
                    sleep_until(at).await;
                }
            }
            self.refill();
        } else if self.resets.is_some_and(|at| at <= Instant::now()) {
            self.refill();
        }
    }

    /// Optimistic decrement before sending
    pub(crate) fn take(&mut self) {
        if self.tracked {
            self.remaining = self.remaining.saturating_sub(1);
        }
    }

    /// Overwrite local numbers with the server's
    pub(crate) fn apply(&mut self, headers: &RateLimitHeaders, lag: Duration) {
        if let Some(limit) = headers.limit {
            self.limit = Some(limit);
        }
        if let Some(remaining) = headers.remaining {
            self.remaining = remaining;
        }
        if let Some(reset) = headers.reset {
            self.reset_at = DateTime::from_timestamp_millis((reset * 1000.0) as i64);
        }

        let reset_after = headers.reset_after.or_else(|| {
            self.reset_at
                .and_then(|at| (at - Utc::now()).to_std().ok())
        });
        if let Some(reset_after) = reset_after {
            let reset_after = reset_after + lag;
            self.reset_after = Some(reset_after);
            self.resets = Some(Instant::now() + reset_after);
        }
    }

    /// A 429 leaves nothing until `wait` has passed
    pub(crate) fn exhaust(&mut self, wait: Duration) {
        self.remaining = 0;
        self.reset_after = Some(wait);
        self.resets = Some(Instant::now() + wait);
    }

    pub(crate) fn snapshot(&self) -> BucketSnapshot {
        BucketSnapshot {
            hash: self.hash.clone(),
            limit: self.limit,
            remaining: self.remaining,
            reset_at: self.reset_at,
            resets_in: self
                .resets
                .map(|at| at.saturating_duration_since(Instant::now())),
            tracked: self.tracked,
        }
    }
}

/// Point-in-time view of a bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketSnapshot {
    pub hash: Option<String>,
    pub limit: Option<u32>,
    pub remaining: u32,
    pub reset_at: Option<DateTime<Utc>>,
    pub resets_in: Option<Duration>,
    pub tracked: bool,
}
