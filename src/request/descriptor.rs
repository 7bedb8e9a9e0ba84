//! Immutable request descriptors.

use crate::error::{ClientError, Result};
use crate::types::{BasicValue, Method, SortDirection, WhereOperator};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A single `where` clause.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: WhereOperator,
    pub value: BasicValue,
}

/// A single sort clause.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Filter, sort and pagination parameters of a listing.
///
/// Field order here is the canonical serialization order used for keys.
/// Filters keep insertion order; an exact duplicate is ignored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestParams {
    #[serde(rename = "where", default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Filter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<Sort>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
}

impl RequestParams {
    /// True when no filter, sort, limit or cursor is set.
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
            && self.sort.is_empty()
            && self.limit.is_none()
            && self.after.is_none()
            && self.before.is_none()
    }

    /// Append a filter unless an identical one is already present.
    pub fn push_filter(&mut self, filter: Filter) {
        if !self.filters.contains(&filter) {
            self.filters.push(filter);
        }
    }

    pub fn push_sort(&mut self, sort: Sort) {
        self.sort.push(sort);
    }

    /// Check the combination of parameters is one the server accepts.
    pub fn validate(&self) -> Result<()> {
        for filter in &self.filters {
            if filter.field.is_empty() {
                return Err(ClientError::InvalidQuery("filter field cannot be empty".into()));
            }
            match &filter.value {
                BasicValue::Bool(_) if filter.op.is_range() => {
                    return Err(ClientError::InvalidQuery(format!(
                        "operator {} cannot be applied to boolean field '{}'",
                        filter.op, filter.field
                    )));
                }
                BasicValue::Float(f) if !f.is_finite() => {
                    return Err(ClientError::InvalidQuery(format!(
                        "non-finite value for field '{}'",
                        filter.field
                    )));
                }
                _ => {}
            }
        }

        // Filters on one field share a single `where` entry on the wire:
        // equality stands alone and each range operator appears once.
        for (i, filter) in self.filters.iter().enumerate() {
            for earlier in self.filters[..i].iter().filter(|f| f.field == filter.field) {
                if earlier.op == WhereOperator::Eq || filter.op == WhereOperator::Eq {
                    return Err(ClientError::InvalidQuery(format!(
                        "field '{}' has an equality filter combined with another filter",
                        filter.field
                    )));
                }
                if earlier.op == filter.op {
                    return Err(ClientError::InvalidQuery(format!(
                        "field '{}' has conflicting '{}' filters",
                        filter.field, filter.op
                    )));
                }
            }
        }

        for (i, sort) in self.sort.iter().enumerate() {
            if sort.field.is_empty() {
                return Err(ClientError::InvalidQuery("sort field cannot be empty".into()));
            }
            if self.sort[..i].iter().any(|s| s.field == sort.field) {
                return Err(ClientError::InvalidQuery(format!(
                    "field '{}' is sorted more than once",
                    sort.field
                )));
            }
        }

        if self.limit == Some(0) {
            return Err(ClientError::InvalidQuery("limit must be greater than zero".into()));
        }

        if self.after.is_some() && self.before.is_some() {
            return Err(ClientError::InvalidQuery(
                "cannot page both after and before a cursor".into(),
            ));
        }

        Ok(())
    }

    /// Canonical JSON form, as used in query keys.
    pub fn canonical_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ClientError::Serialization(e.to_string()))
    }
}

/// Immutable description of one remote fetch.
///
/// The path is kept as raw segments; transports are responsible for
/// percent-encoding them.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestDescriptor {
    method: Method,
    segments: Vec<String>,
    params: RequestParams,
    body: Option<serde_json::Value>,
}

impl RequestDescriptor {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            params: RequestParams::default(),
            body: None,
        }
    }

    /// `GET /collections/{collection}/records`
    pub fn list_records(collection_id: &str) -> Self {
        Self::new(Method::Get, ["collections", collection_id, "records"])
    }

    /// `GET /collections/{collection}/records/{record}`
    pub fn get_record(collection_id: &str, record_id: &str) -> Self {
        Self::new(Method::Get, ["collections", collection_id, "records", record_id])
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn with_params(mut self, params: RequestParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    /// Unencoded path, e.g. `/collections/users/records`.
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    /// SHA-256 over method, path, params and body, hex encoded.
    ///
    /// Used to key cached responses; two descriptors with equal fingerprints
    /// produce the same request on the wire.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        for segment in &self.segments {
            hasher.update([0u8]);
            hasher.update(segment.as_bytes());
        }
        hasher.update([1u8]);
        // Params and body always serialize; fall back to empty on the impossible path.
        hasher.update(self.params.canonical_json().unwrap_or_default().as_bytes());
        hasher.update([2u8]);
        if let Some(body) = &self.body {
            hasher.update(body.to_string().as_bytes());
        }
        hex::encode(hasher.finalize())
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path())
    }
}
