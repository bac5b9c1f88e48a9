//! REST error types
//!
//! `RetryAfter` is not an error: the dispatcher handles it internally. Only
//! exhausted retries, server failures and rejected requests reach the caller.

use crate::route::RateLimitKey;
use crate::transport::TransportError;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Error payload returned by the platform for rejected requests
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiError {
    /// Platform error code (0 when absent)
    pub code: u64,
    pub message: String,
    /// Field errors as `(path, message)` pairs
    pub errors: Vec<(String, String)>,
}

impl ApiError {
    /// Decode an error body, falling back to plain text
    pub fn from_body(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => {
                let mut errors = Vec::new();
                if let Some(nested) = map.get("errors") {
                    flatten_errors(nested, "", &mut errors);
                }
                Self {
                    code: map.get("code").and_then(Value::as_u64).unwrap_or(0),
                    message: map
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    errors,
                }
            }
            _ => Self {
                code: 0,
                message: String::from_utf8_lossy(body).trim().to_string(),
                errors: Vec::new(),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code == 0 && self.message.is_empty() && self.errors.is_empty()
    }
}

/// Collapse `{"a": {"0": {"_errors": [{"message": ..}]}}}` into `("a.0", message)`
fn flatten_errors(value: &Value, parent: &str, out: &mut Vec<(String, String)>) {
    let Value::Object(map) = value else {
        return;
    };

    for (key, child) in map {
        if key == "_errors" {
            if let Value::Array(items) = child {
                let joined = items
                    .iter()
                    .filter_map(|item| item.get("message").and_then(Value::as_str))
                    .collect::<Vec<_>>()
                    .join("\n");
                out.push((parent.to_string(), joined));
            }
        } else if child.is_object() {
            let path = if parent.is_empty() {
                key.clone()
            } else {
                format!("{parent}.{key}")
            };
            flatten_errors(child, &path, out);
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code != 0 {
            write!(f, " (code: {})", self.code)?;
        }
        for (path, message) in &self.errors {
            write!(f, "\nIn {path}: {message}")?;
        }
        if !self.message.is_empty() {
            if self.errors.is_empty() {
                write!(f, "\n{}", self.message)?;
            } else {
                write!(f, "\n\n{}", self.message)?;
            }
        }
        Ok(())
    }
}

/// Canonical reason phrase for the statuses the platform commonly returns
#[allow(clippy::trivially_copy_pass_by_ref)]
fn reason_phrase(status: &u16) -> &'static str {
    match *status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        409 => "Conflict",
        413 => "Payload Too Large",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "",
    }
}

/// REST dispatcher errors
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("Rate limit retries exhausted for {key} after {attempts} attempts")]
    RateLimitExceeded {
        key: RateLimitKey,
        attempts: u32,
        retry_after: Duration,
    },

    #[error("Server error {status} after {attempts} attempts")]
    ServerError {
        status: u16,
        attempts: u32,
        body: String,
    },

    #[error("{status} {reason}{error}", reason = reason_phrase(.status))]
    RequestRejected { status: u16, error: ApiError },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Dispatcher is shut down")]
    Shutdown,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl HttpError {
    /// HTTP status attached to this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RateLimitExceeded { .. } => Some(429),
            Self::ServerError { status, .. } | Self::RequestRejected { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Whether issuing the same request later could succeed
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::ServerError { .. } | Self::Transport(_)
        )
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Server error payload for rejected requests
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::RequestRejected { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// REST result type
pub type HttpResult<T> = Result<T, HttpError>;
