//! Account-wide request ceiling

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    ends: Instant,
    count: u32,
    frozen_until: Option<Instant>,
}

/// Shared counter every request passes through before it is sent
///
/// Counts requests in one-second windows. A global 429 freezes it for
/// everyone until the server's retry-after has passed.
#[derive(Debug)]
pub struct GlobalRateState {
    /// Requests per second, 0 = unlimited
    limit: u32,
    window: Mutex<Window>,
}

impl GlobalRateState {
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            window: Mutex::new(Window {
                ends: Instant::now(),
                count: 0,
                frozen_until: None,
            }),
        }
    }

    /// Take one slot, or return the instant to wait for
    fn try_take(&self) -> Option<Instant> {
        let mut window = self.window.lock();
        let now = Instant::now();

        if let Some(until) = window.frozen_until {
            if until > now {
                return Some(until);
            }
            window.frozen_until = None;
        }

        if self.limit == 0 {
            return None;
        }

        if now >= window.ends {
            window.ends = now + WINDOW;
            window.count = 0;
        }

        if window.count < self.limit {
            window.count += 1;
            None
        } else {
            Some(window.ends)
        }
    }

    /// Wait until the global ceiling admits one more request
    pub async fn acquire(&self) {
        while let Some(deadline) = self.try_take() {
            debug!(
                wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
                "Waiting on global rate limit"
            );
            sleep_until(deadline).await;
        }
    }

    /// Block every request for `duration`; a longer existing freeze is kept
    pub fn freeze(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut window = self.window.lock();
        window.frozen_until = Some(window.frozen_until.map_or(until, |current| current.max(until)));
    }

    pub fn is_frozen(&self) -> bool {
        self.window
            .lock()
            .frozen_until
            .is_some_and(|until| until > Instant::now())
    }
}
