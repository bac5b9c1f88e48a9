//! Identify rate limiting
//!
//! The gateway accepts one Identify per `spacing` per concurrency bucket,
//! across every shard sharing the token. Shards map to buckets by
//! `shard_id % max_concurrency`.

use arke_common::GatewayConfig;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Serializes identifies with a minimum spacing
#[derive(Debug)]
pub struct IdentifyQueue {
    spacing: Duration,
    /// Last identify time per concurrency bucket
    slots: Vec<Mutex<Option<Instant>>>,
}

impl IdentifyQueue {
    #[must_use]
    pub fn new(spacing: Duration, max_concurrency: u32) -> Self {
        let slots = (0..max_concurrency.max(1)).map(|_| Mutex::new(None)).collect();
        Self { spacing, slots }
    }

    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.identify_spacing(), config.max_concurrency)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    pub fn max_concurrency(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Wait for this shard's slot; the caller should identify right after
    ///
    /// Waiters on the same bucket are served in arrival order.
    pub async fn wait(&self, shard_id: u32) {
        let bucket = (shard_id % self.max_concurrency()) as usize;
        let Some(slot) = self.slots.get(bucket) else {
            return;
        };

        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.spacing;
            if ready_at > Instant::now() {
                tracing::debug!(
                    shard_id,
                    bucket,
                    wait_ms = (ready_at - Instant::now()).as_millis() as u64,
                    "Waiting for identify slot"
                );
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }
}
