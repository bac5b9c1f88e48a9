//! Routes and rate-limit keys
//!
//! A route is an HTTP method plus a path template such as
//! `/channels/{channel_id}/messages`. The rate-limit key derived from it is the
//! method, the template and the value of the major parameter.

use arke_core::Snowflake;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters the platform uses to split buckets (in priority order)
const MAJOR_PARAMETERS: [&str; 3] = ["channel_id", "guild_id", "webhook_id"];

/// HTTP methods used by the REST API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// Identifies a rate-limit bucket
///
/// Computed once per request and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    route: String,
    major: Option<String>,
}

impl RateLimitKey {
    /// Build a key from `METHOD template` and an optional major parameter value
    pub fn new(route: impl Into<String>, major: Option<String>) -> Self {
        Self {
            route: route.into(),
            major,
        }
    }

    /// `METHOD template` part of the key
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Major parameter value, if the route has one
    pub fn major(&self) -> Option<&str> {
        self.major.as_deref()
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.major {
            Some(major) => write!(f, "{}:{major}", self.route),
            None => f.write_str(&self.route),
        }
    }
}

/// A REST route with its parameters filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    method: Method,
    template: &'static str,
    params: Vec<(&'static str, String)>,
}

impl Route {
    /// Create a route from a method and a path template
    #[must_use]
    pub fn new(method: Method, template: &'static str) -> Self {
        Self {
            method,
            template,
            params: Vec::new(),
        }
    }

    /// Fill a `{name}` placeholder of the template
    #[must_use]
    pub fn param(mut self, name: &'static str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        match self.params.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    #[must_use]
    pub fn channel_id(self, id: Snowflake) -> Self {
        self.param("channel_id", id)
    }

    #[must_use]
    pub fn guild_id(self, id: Snowflake) -> Self {
        self.param("guild_id", id)
    }

    /// Webhook routes are keyed by id and token together
    #[must_use]
    pub fn webhook(self, id: Snowflake, token: impl fmt::Display) -> Self {
        self.param("webhook_id", id).param("webhook_token", token)
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    fn value_of(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Path with all known placeholders substituted
    pub fn path(&self) -> String {
        let mut path = self.template.to_string();
        for (name, value) in &self.params {
            path = path.replace(&format!("{{{name}}}"), value);
        }
        path
    }

    /// Value of the major parameter, if the template contains one
    pub fn major_parameter(&self) -> Option<String> {
        let name = MAJOR_PARAMETERS
            .iter()
            .find(|name| self.template.contains(&format!("{{{name}}}")))?;
        let value = self.value_of(name)?;

        if *name == "webhook_id" {
            if let Some(token) = self.value_of("webhook_token") {
                return Some(format!("{value}:{token}"));
            }
        }
        Some(value.to_string())
    }

    /// Rate-limit key of this route
    pub fn bucket_key(&self) -> RateLimitKey {
        RateLimitKey::new(
            format!("{} {}", self.method, self.template),
            self.major_parameter(),
        )
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
