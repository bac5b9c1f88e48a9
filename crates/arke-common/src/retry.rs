//! Exponential backoff with jitter
//!
//! Shared by the REST dispatcher (5xx retries) and the gateway (reconnects and
//! shard restarts).

use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// Exponential backoff policy
///
/// `delay(attempt) = min(base * 2^attempt, max)`, blended with a uniformly
/// random delay in `[0, delay]` by the `jitter` factor.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BackoffPolicy {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0.0 = deterministic, 1.0 = full jitter
    pub jitter: f64,
}

impl BackoffPolicy {
    #[must_use]
    pub const fn new(base_delay_ms: u64, max_delay_ms: u64, jitter: f64) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// Same policy without randomness
    #[must_use]
    pub const fn without_jitter(self) -> Self {
        Self { jitter: 0.0, ..self }
    }

    /// Capped exponential delay for `attempt` (0-based), before jitter
    #[must_use]
    pub fn ceiling_for_attempt(&self, attempt: u32) -> Duration {
        let shift = attempt.min(20);
        let multiplier = 1_u64 << shift;
        let calculated = self.base_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(calculated.min(self.max_delay_ms))
    }

    /// Delay to wait before retry number `attempt` (0-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling_for_attempt(attempt).as_secs_f64();
        let jitter = self.jitter.clamp(0.0, 1.0);

        if jitter == 0.0 || ceiling == 0.0 {
            return Duration::from_secs_f64(ceiling);
        }

        let randomized = rand::thread_rng().gen_range(0.0..=ceiling);
        Duration::from_secs_f64(ceiling * (1.0 - jitter) + randomized * jitter)
    }

    /// Delay for `attempt`, never shorter than a server-provided hint
    pub fn delay_with_hint(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let delay = self.delay_for_attempt(attempt);
        hint.map_or(delay, |hint| delay.max(hint))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(500, 30_000, 0.25)
    }
}
