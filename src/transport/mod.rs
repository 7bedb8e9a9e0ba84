//! Transport layer: how a [`RequestDescriptor`] reaches the server.
//!
//! The subscription engine only depends on the [`Transport`] trait. The
//! reqwest-backed [`HttpTransport`] is the production implementation.

mod cache;
mod http;

pub use cache::ResponseCache;
pub use http::{HttpTransport, HttpTransportConfig};

use crate::error::Result;
use crate::request::RequestDescriptor;
use async_trait::async_trait;
use std::time::Duration;

/// Per-request send options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Sign the request with the configured [`Signer`].
    pub require_auth: bool,
    /// Serve a cached response younger than this, if any.
    pub cache_ttl: Option<Duration>,
}

impl SendOptions {
    pub fn signed() -> Self {
        Self {
            require_auth: true,
            cache_ttl: None,
        }
    }

    pub fn with_auth(mut self, require_auth: bool) -> Self {
        self.require_auth = require_auth;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// A successful response.
#[derive(Clone, Debug, PartialEq)]
pub struct Response {
    pub status: u16,
    pub data: serde_json::Value,
}

impl Response {
    pub fn ok(data: serde_json::Value) -> Self {
        Self { status: 200, data }
    }
}

/// Sends described requests.
///
/// Implementations report non-2xx answers as errors; a returned
/// [`Response`] is always a success.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, descriptor: &RequestDescriptor, options: SendOptions) -> Result<Response>;
}

/// Produces request signatures for authenticated calls.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign `message` and return the encoded signature.
    async fn sign(&self, message: &str) -> Result<String>;
}
