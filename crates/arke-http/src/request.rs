//! Request and response types exchanged with the dispatcher

use crate::error::HttpError;
use crate::route::{Method, Route};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Header used to attach a reason to the audit log
const AUDIT_LOG_REASON: &str = "X-Audit-Log-Reason";

/// An outbound REST request
#[derive(Debug, Clone)]
pub struct Request {
    pub(crate) route: Route,
    pub(crate) body: Option<Vec<u8>>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) headers: Vec<(String, String)>,
}

impl Request {
    #[must_use]
    pub fn new(route: Route) -> Self {
        Self {
            route,
            body: None,
            query: Vec::new(),
            headers: Vec::new(),
        }
    }

    /// Attach a JSON body
    ///
    /// GET requests cannot carry a body.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, HttpError> {
        if self.route.method() == Method::Get {
            return Err(HttpError::InvalidRequest(
                "a JSON body cannot be sent with GET".to_string(),
            ));
        }
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((name.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Audit log reason for moderation endpoints
    #[must_use]
    pub fn reason(self, reason: impl Into<String>) -> Self {
        self.header(AUDIT_LOG_REASON, reason)
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }
}

impl From<Route> for Request {
    fn from(route: Route) -> Self {
        Self::new(route)
    }
}

/// Response headers with case-insensitive lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeaders(HashMap<String, String>);

impl ResponseHeaders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ResponseHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// A completed HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: ResponseHeaders,
    pub body: Vec<u8>,
}

impl Response {
    #[must_use]
    pub fn new(status: u16, headers: ResponseHeaders, body: Vec<u8>) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True for 204 and other empty bodies
    pub fn is_empty(&self) -> bool {
        self.status == 204 || self.body.is_empty()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
