//! # arke-http
//!
//! REST side of the client: routes, the rate-limit bucket tracker and the
//! dispatcher that paces requests using nothing but response headers.

pub mod client;
pub mod error;
pub mod ratelimit;
pub mod request;
pub mod route;
pub mod transport;

pub use client::{GatewayBotInfo, RestClient, SessionStartLimit};
pub use error::{ApiError, HttpError, HttpResult};
pub use ratelimit::{
    BucketPermit, BucketSnapshot, GlobalRateState, RateLimitHeaders, RateLimitScope, RateLimiter,
    UpdateOutcome,
};
pub use request::{Request, Response, ResponseHeaders};
pub use route::{Method, RateLimitKey, Route};
pub use transport::{HttpTransport, ReqwestTransport, TransportError, TransportRequest};
