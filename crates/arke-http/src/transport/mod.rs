//! HTTP transport boundary
//!
//! The dispatcher only needs status, headers and body back from a transport.
//! `ReqwestTransport` is the production implementation; tests script their own.

mod reqwest_transport;

pub use reqwest_transport::ReqwestTransport;

use crate::request::Response;
use crate::route::Method;
use async_trait::async_trait;

/// A fully resolved request handed to a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// JSON body, if any
    pub body: Option<Vec<u8>>,
}

/// Executes HTTP requests on behalf of the dispatcher
///
/// Implementations must return non-2xx responses as `Ok`; only failures to
/// obtain a response at all are errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<Response, TransportError>;
}

/// Transport-level failures (no response was received)
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Failed to build HTTP client: {0}")]
    Build(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_builder() {
            Self::Build(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}
