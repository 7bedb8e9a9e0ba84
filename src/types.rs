//! Core types shared by requests, responses and handles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method of a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operator of a `where` filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhereOperator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl WhereOperator {
    /// Whether this operator compares by ordering rather than equality.
    pub fn is_range(&self) -> bool {
        !matches!(self, WhereOperator::Eq)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WhereOperator::Eq => "==",
            WhereOperator::Gt => ">",
            WhereOperator::Gte => ">=",
            WhereOperator::Lt => "<",
            WhereOperator::Lte => "<=",
        }
    }
}

impl fmt::Display for WhereOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar value a query can filter on.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BasicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl BasicValue {
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            BasicValue::Bool(b) => serde_json::Value::Bool(*b),
            BasicValue::Int(i) => serde_json::Value::from(*i),
            BasicValue::Float(f) => serde_json::Value::from(*f),
            BasicValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl From<bool> for BasicValue {
    fn from(v: bool) -> Self {
        BasicValue::Bool(v)
    }
}

impl From<i64> for BasicValue {
    fn from(v: i64) -> Self {
        BasicValue::Int(v)
    }
}

impl From<i32> for BasicValue {
    fn from(v: i32) -> Self {
        BasicValue::Int(v as i64)
    }
}

impl From<u32> for BasicValue {
    fn from(v: u32) -> Self {
        BasicValue::Int(v as i64)
    }
}

impl From<f64> for BasicValue {
    fn from(v: f64) -> Self {
        BasicValue::Float(v)
    }
}

impl From<&str> for BasicValue {
    fn from(v: &str) -> Self {
        BasicValue::String(v.to_string())
    }
}

impl From<String> for BasicValue {
    fn from(v: String) -> Self {
        BasicValue::String(v)
    }
}

/// Sort direction of a query.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

/// Block a record was last written in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
}

/// A single record as returned by the server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block: Option<Block>,
}

/// Pagination cursors of a listing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

/// A page of records from a collection or query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionList<T> {
    pub data: Vec<RecordSnapshot<T>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl<T> CollectionList<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Metadata record describing a collection, stored in the `Collection`
/// meta-collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    pub id: String,
    /// JSON-encoded schema AST.
    pub ast: String,
}
