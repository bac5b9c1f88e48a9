//! Rate-limit bucket tracking
//!
//! Buckets are created lazily from response headers. Each key maps to a bucket
//! record guarded by its own async mutex, so requests sharing a key serialize
//! while unrelated keys never contend. Keys whose responses report the same
//! bucket hash are redirected to one shared record.

mod bucket;
mod global;
mod headers;
mod limiter;

pub use bucket::BucketSnapshot;
pub use global::GlobalRateState;
pub use headers::{RateLimitHeaders, RateLimitScope, MAX_HINT};
pub use limiter::{BucketPermit, RateLimiter, UpdateOutcome};
