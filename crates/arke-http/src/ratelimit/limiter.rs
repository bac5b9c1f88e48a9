//! Rate-limit tracker keyed by `RateLimitKey`

use super::bucket::{BucketSnapshot, BucketState};
use super::global::GlobalRateState;
use super::headers::RateLimitHeaders;
use crate::route::RateLimitKey;
use arke_common::RestConfig;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, warn};

type SharedBucket = Arc<Mutex<BucketState>>;

/// Wait used for a 429 that carries no timing information
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// What the dispatcher should do after a response was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Proceed,
    /// Rate limited: wait at least `duration`, then send again
    RetryAfter { duration: Duration, global: bool },
}

/// Exclusive right to send one request for a key
///
/// Holds the bucket lock until it is handed back through
/// [`RateLimiter::update`]. Dropping it instead releases the lock and keeps
/// the optimistic decrement.
pub struct BucketPermit {
    key: RateLimitKey,
    bucket: SharedBucket,
    guard: OwnedMutexGuard<BucketState>,
}

impl BucketPermit {
    pub fn key(&self) -> &RateLimitKey {
        &self.key
    }

    /// Tokens left after this request was counted
    pub fn remaining(&self) -> u32 {
        self.guard.remaining
    }
}

impl std::fmt::Debug for BucketPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketPermit")
            .field("key", &self.key)
            .field("remaining", &self.guard.remaining)
            .finish()
    }
}

/// Tracks every bucket seen by this client
#[derive(Debug)]
pub struct RateLimiter {
    /// Key to its current bucket record
    routes: DashMap<RateLimitKey, SharedBucket>,
    /// Canonical record per (bucket hash, major parameter)
    shared: DashMap<(String, Option<String>), SharedBucket>,
    global: Arc<GlobalRateState>,
    lag: Duration,
}

impl RateLimiter {
    pub fn new(config: &RestConfig) -> Self {
        Self::with_limits(config.global_rate_limit, config.bucket_lag())
    }

    pub fn with_limits(global_rate_limit: u32, lag: Duration) -> Self {
        Self {
            routes: DashMap::new(),
            shared: DashMap::new(),
            global: Arc::new(GlobalRateState::new(global_rate_limit)),
            lag,
        }
    }

    pub fn global(&self) -> &Arc<GlobalRateState> {
        &self.global
    }

    fn bucket_for(&self, key: &RateLimitKey) -> SharedBucket {
        Arc::clone(
            self.routes
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(BucketState::new())))
                .value(),
        )
    }

    fn is_current(&self, key: &RateLimitKey, bucket: &SharedBucket) -> bool {
        self.routes
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current.value(), bucket))
    }

    /// Wait for a token in the key's bucket and in the global ceiling
    pub async fn acquire(&self, key: &RateLimitKey) -> BucketPermit {
        loop {
            let bucket = self.bucket_for(key);
            let mut guard = Arc::clone(&bucket).lock_owned().await;

            // The key may have been redirected to a shared record while we queued
            if !self.is_current(key, &bucket) {
                debug!(key = %key, "Bucket redirected while waiting, retrying");
                continue;
            }

            guard.wait_for_capacity().await;
            self.global.acquire().await;
            guard.take();

            return BucketPermit {
                key: key.clone(),
                bucket,
                guard,
            };
        }
    }

    /// Reconcile the key's bucket with a completed response
    pub fn update(
        &self,
        permit: BucketPermit,
        headers: &RateLimitHeaders,
        status: u16,
    ) -> UpdateOutcome {
        let BucketPermit {
            key,
            bucket,
            mut guard,
        } = permit;

        if status == 429 {
            let duration = headers.retry_delay().unwrap_or(DEFAULT_RETRY_AFTER);
            let wait = duration + self.lag;

            if headers.is_global() {
                warn!(key = %key, retry_after_ms = duration.as_millis() as u64, "Global rate limit hit");
                self.global.freeze(wait);
                return UpdateOutcome::RetryAfter {
                    duration,
                    global: true,
                };
            }

            warn!(
                key = %key,
                bucket = headers.bucket.as_deref().unwrap_or("unknown"),
                scope = headers.scope.map_or("unknown", |s| s.as_str()),
                retry_after_ms = duration.as_millis() as u64,
                "Rate limited"
            );
            let target = self.reconcile(&key, &bucket, &mut guard, headers);
            exhaust_target(target, &mut guard, wait);
            return UpdateOutcome::RetryAfter {
                duration,
                global: false,
            };
        }

        if headers.bucket.is_none() {
            // Error responses from proxies carry no headers; only learn from real answers
            if status < 500 && guard.tracked && guard.hash.is_none() {
                debug!(key = %key, "Route has no bucket, tracking disabled");
                guard.tracked = false;
            }
            return UpdateOutcome::Proceed;
        }

        let target = self.reconcile(&key, &bucket, &mut guard, headers);
        // A global header on a non-429 says nothing about this bucket
        if !headers.global {
            let lag = self.lag;
            with_target(target, &mut guard, |state| state.apply(headers, lag));
        }
        UpdateOutcome::Proceed
    }

    /// Record a response without holding a permit
    pub async fn record(
        &self,
        key: &RateLimitKey,
        headers: &RateLimitHeaders,
        status: u16,
    ) -> UpdateOutcome {
        let bucket = self.bucket_for(key);
        let guard = Arc::clone(&bucket).lock_owned().await;
        self.update(
            BucketPermit {
                key: key.clone(),
                bucket,
                guard,
            },
            headers,
            status,
        )
    }

    /// Point the key at the record its bucket hash belongs to
    ///
    /// Returns the record that should receive the response numbers, or `None`
    /// when that is the record already locked by the caller.
    fn reconcile(
        &self,
        key: &RateLimitKey,
        bucket: &SharedBucket,
        guard: &mut BucketState,
        headers: &RateLimitHeaders,
    ) -> Option<SharedBucket> {
        let hash = headers.bucket.as_deref()?;

        let previous = guard.hash.clone();
        match previous.as_deref() {
            Some(current) if current == hash => return None,
            Some(current) => {
                debug!(key = %key, from = current, to = hash, "Bucket migrated");
            }
            None => {
                guard.hash = Some(hash.to_string());
                guard.tracked = true;
            }
        }

        let shared_key = (hash.to_string(), key.major().map(ToString::to_string));
        let migrating = guard.hash.as_deref() != Some(hash);

        let target = match self.shared.entry(shared_key) {
            Entry::Occupied(entry) if Arc::ptr_eq(entry.get(), bucket) => return None,
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) if !migrating => {
                entry.insert(Arc::clone(bucket));
                return None;
            }
            Entry::Vacant(entry) => {
                let fresh = Arc::new(Mutex::new(BucketState::with_hash(hash)));
                entry.insert(Arc::clone(&fresh));
                fresh
            }
        };

        debug!(key = %key, bucket = hash, "Key now shares bucket record");
        self.routes.insert(key.clone(), Arc::clone(&target));
        Some(target)
    }

    /// Current state of the key's bucket, if the key was ever used
    pub async fn bucket_snapshot(&self, key: &RateLimitKey) -> Option<BucketSnapshot> {
        let bucket = self.routes.get(key).map(|entry| Arc::clone(entry.value()))?;
        let state = bucket.lock().await;
        Some(state.snapshot())
    }

    /// Whether both keys currently resolve to the same bucket record
    pub fn shares_bucket(&self, a: &RateLimitKey, b: &RateLimitKey) -> bool {
        match (self.routes.get(a), self.routes.get(b)) {
            (Some(a), Some(b)) => Arc::ptr_eq(a.value(), b.value()),
            _ => false,
        }
    }

    /// Number of keys seen so far
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Run `f` on the target record, or on the caller's own locked state
///
/// A shared record busy with another request is left alone: that request's
/// own response carries the same numbers.
fn with_target(
    target: Option<SharedBucket>,
    own: &mut BucketState,
    f: impl FnOnce(&mut BucketState),
) {
    match target {
        None => f(own),
        Some(shared) => match shared.try_lock() {
            Ok(mut state) => f(&mut state),
            Err(_) => debug!("Shared bucket busy, skipping update"),
        },
    }
}

/// Exhaust the target record, or the caller's own locked state
///
/// Unlike numbers, a 429 must reach the shared record: if another request
/// holds it, a task applies the exhaustion once that request is done.
fn exhaust_target(target: Option<SharedBucket>, own: &mut BucketState, wait: Duration) {
    let Some(shared) = target else {
        own.exhaust(wait);
        return;
    };

    match Arc::clone(&shared).try_lock_owned() {
        Ok(mut state) => state.exhaust(wait),
        Err(_) => match Handle::try_current() {
            Ok(runtime) => {
                let until = Instant::now() + wait;
                runtime.spawn(async move {
                    let mut state = shared.lock().await;
                    state.exhaust(until.saturating_duration_since(Instant::now()));
                });
            }
            Err(_) => warn!("Shared bucket busy outside a runtime, 429 not recorded"),
        },
    }
}
