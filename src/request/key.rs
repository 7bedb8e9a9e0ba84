//! Canonical keys for request descriptors.

use super::descriptor::{RequestDescriptor, RequestParams};
use crate::error::{ClientError, Result};
use sha2::{Digest, Sha256};
use std::fmt;

/// Which key space a key belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeyTag {
    /// Unfiltered listing of a collection.
    Collection,
    /// Filtered, sorted or paginated listing.
    Query,
    /// Single record lookup.
    Record,
}

impl KeyTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyTag::Collection => "collection",
            KeyTag::Query => "query",
            KeyTag::Record => "record",
        }
    }
}

/// Canonical identity of a request.
///
/// Equal keys always describe the same request; the string form is stable
/// across process runs.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    /// `record:{collection}/{record}`
    pub fn record(collection_id: &str, record_id: &str) -> Self {
        Key(format!("record:{}/{}", collection_id, record_id))
    }

    /// `collection:{collection}`
    pub fn collection(collection_id: &str) -> Self {
        Key(format!("collection:{}", collection_id))
    }

    /// `query:{collection}?{params}`, or the collection key when `params` is empty.
    pub fn query(collection_id: &str, params: &RequestParams) -> Result<Self> {
        if params.is_empty() {
            return Ok(Self::collection(collection_id));
        }
        Ok(Key(format!("query:{}?{}", collection_id, params.canonical_json()?)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn tag(&self) -> Option<KeyTag> {
        let (tag, _) = self.0.split_once(':')?;
        match tag {
            "collection" => Some(KeyTag::Collection),
            "query" => Some(KeyTag::Query),
            "record" => Some(KeyTag::Record),
            _ => None,
        }
    }

    /// Short hex digest of the key, for log fields.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.0)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Key {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the key of `descriptor` under `tag`.
///
/// Record descriptors must end in `records/{id}`; the record id is taken from
/// the last path segment.
pub fn derive_key(tag: KeyTag, collection_id: &str, descriptor: &RequestDescriptor) -> Result<Key> {
    match tag {
        KeyTag::Collection => Ok(Key::collection(collection_id)),
        KeyTag::Query => Key::query(collection_id, descriptor.params()),
        KeyTag::Record => {
            let segments = descriptor.segments();
            match segments {
                [.., records, id] if records == "records" => Ok(Key::record(collection_id, id)),
                _ => Err(ClientError::InvalidQuery(format!(
                    "{} does not address a single record",
                    descriptor.path()
                ))),
            }
        }
    }
}
