//! HTTP transport over reqwest.

use super::{ResponseCache, Response, SendOptions, Signer, Transport};
use crate::error::{ClientError, Result};
use crate::request::{RequestDescriptor, RequestParams};
use crate::types::{Method, WhereOperator};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Configuration for [`HttpTransport`].
#[derive(Clone, Debug)]
pub struct HttpTransportConfig {
    /// Base URL every request path is appended to.
    pub base_url: String,

    /// Per-request timeout enforced by the HTTP client.
    pub request_timeout: Duration,

    /// Retries for connect and timeout failures.
    pub max_retries: u32,

    /// Number of responses kept for cached reads.
    pub response_cache_size: usize,

    /// Header carrying the request signature.
    pub signature_header: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/v0".to_string(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            response_cache_size: 256,
            signature_header: "x-record-signature".to_string(),
        }
    }
}

/// Error body returned by the server on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
    message: Option<String>,
}

/// Production [`Transport`] backed by a shared reqwest client.
pub struct HttpTransport {
    config: HttpTransportConfig,
    base_url: Url,
    http: reqwest::Client,
    signer: Option<Arc<dyn Signer>>,
    cache: ResponseCache,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig, signer: Option<Arc<dyn Signer>>) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ClientError::Config(format!("invalid base url '{}': {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base url '{}' cannot carry a path",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            cache: ResponseCache::new(config.response_cache_size),
            config,
            base_url,
            http,
            signer,
        })
    }

    pub fn config(&self) -> &HttpTransportConfig {
        &self.config
    }

    /// Build the full URL of `descriptor`, including query parameters.
    pub fn url_for(&self, descriptor: &RequestDescriptor) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::Config("base url cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.extend(descriptor.segments());
        }

        descriptor.params().validate()?;
        let pairs = query_pairs(descriptor.params());
        if !pairs.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, value) in &pairs {
                query.append_pair(name, value);
            }
        }

        Ok(url)
    }

    async fn signature(&self, body: &str) -> Result<String> {
        let signer = self.signer.as_ref().ok_or(ClientError::MissingSigner)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ClientError::Signing(e.to_string()))?
            .as_millis();
        let sig = signer.sign(&format!("{}.{}", timestamp, body)).await?;
        Ok(format!("t={},v=0,h={}", timestamp, sig))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, descriptor: &RequestDescriptor, options: SendOptions) -> Result<Response> {
        let fingerprint = descriptor.fingerprint();
        if let Some(ttl) = options.cache_ttl {
            if let Some(hit) = self.cache.get_fresh(&fingerprint, ttl) {
                debug!(request = %descriptor, "served from response cache");
                return Ok(hit);
            }
        }

        let url = self.url_for(descriptor)?;
        let body = descriptor.body().map(|b| b.to_string());
        let signature = if options.require_auth {
            Some(self.signature(body.as_deref().unwrap_or("")).await?)
        } else {
            None
        };

        let mut retries = 0;
        loop {
            let mut req = self.http.request(reqwest_method(descriptor.method()), url.clone());
            if let Some(body) = &body {
                req = req.header(CONTENT_TYPE, "application/json").body(body.clone());
            }
            if let Some(signature) = &signature {
                req = req.header(self.config.signature_header.as_str(), signature.as_str());
            }

            debug!(request = %descriptor, attempt = retries + 1, "sending request");
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let bytes = resp.bytes().await?;

                    if !status.is_success() {
                        let err = error_from_body(status.as_u16(), &bytes);
                        warn!(request = %descriptor, status = status.as_u16(), error = %err, "request failed");
                        return Err(err);
                    }

                    let data = if bytes.is_empty() {
                        Value::Null
                    } else {
                        serde_json::from_slice(&bytes)?
                    };
                    let response = Response {
                        status: status.as_u16(),
                        data,
                    };
                    if options.cache_ttl.is_some() {
                        self.cache.put(fingerprint, response.clone());
                    }
                    return Ok(response);
                }
                Err(e)
                    if retries < self.config.max_retries
                        && is_retriable(descriptor.method(), SendFailure::of(&e)) =>
                {
                    retries += 1;
                    warn!(request = %descriptor, attempt = retries, error = %e, "retriable transport error");
                    tokio::time::sleep(Duration::from_millis(100 * retries as u64)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// How a send failed before any response arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SendFailure {
    /// No connection was made; the server never saw the request.
    Connect,
    /// The request may have reached the server.
    Timeout,
    Other,
}

impl SendFailure {
    fn of(e: &reqwest::Error) -> Self {
        if e.is_connect() {
            SendFailure::Connect
        } else if e.is_timeout() {
            SendFailure::Timeout
        } else {
            SendFailure::Other
        }
    }
}

/// Reads retry on connect and timeout failures. Writes only retry when the
/// connection was never made, so a slow create or call is not applied twice.
fn is_retriable(method: Method, failure: SendFailure) -> bool {
    match failure {
        SendFailure::Connect => true,
        SendFailure::Timeout => method == Method::Get,
        SendFailure::Other => false,
    }
}

fn error_from_body(status: u16, bytes: &[u8]) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(bytes) {
        Ok(body) => ClientError::from_status(status, body.error.reason, body.error.message),
        Err(_) => ClientError::from_status(
            status,
            None,
            Some(String::from_utf8_lossy(bytes).into_owned()),
        ),
    }
}

/// Map validated request params onto URL query pairs.
///
/// `where` is sent as a JSON object: equality filters as `field: value`,
/// range filters as `field: {"$gt": value}`. Range filters on one field
/// merge into the same object.
fn query_pairs(params: &RequestParams) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::new();

    if !params.filters.is_empty() {
        let mut clauses = Map::new();
        for filter in &params.filters {
            let value = filter.value.to_json();
            let op = match filter.op {
                WhereOperator::Eq => {
                    clauses.insert(filter.field.clone(), value);
                    continue;
                }
                WhereOperator::Gt => "$gt",
                WhereOperator::Gte => "$gte",
                WhereOperator::Lt => "$lt",
                WhereOperator::Lte => "$lte",
            };
            let entry = clauses
                .entry(filter.field.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(ops) = entry {
                ops.insert(op.to_string(), value);
            }
        }
        pairs.push(("where", Value::Object(clauses).to_string()));
    }

    if !params.sort.is_empty() {
        let sort: Vec<Value> = params
            .sort
            .iter()
            .map(|s| json!([s.field, s.direction]))
            .collect();
        pairs.push(("sort", Value::Array(sort).to_string()));
    }

    if let Some(limit) = params.limit {
        pairs.push(("limit", limit.to_string()));
    }
    if let Some(after) = &params.after {
        pairs.push(("after", after.clone()));
    }
    if let Some(before) = &params.before {
        pairs.push(("before", before.clone()));
    }

    pairs
}
