//! Intercepted request types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use url::Url;

/// How the client issued a request.
///
/// Only `Navigate` matters for routing; the rest are kept so the host can pass
/// the mode through verbatim.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level document load.
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// An outgoing request seen by the interception layer.
#[derive(Debug, Clone)]
pub struct Request {
    /// Upper-case HTTP method.
    pub method: String,
    /// Absolute, canonical URL. Also the cache key.
    pub url: Url,
    pub mode: RequestMode,
    pub body: Option<Bytes>,
}

impl Request {
    /// A plain GET for the given URL, as issued for subresources.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url, mode: RequestMode::NoCors, body: None }
    }

    /// A top-level page load.
    pub fn navigate(url: Url) -> Self {
        Self { method: "GET".into(), url, mode: RequestMode::Navigate, body: None }
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}
