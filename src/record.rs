//! Single-record handles.

use crate::codec::{encode_call_args, CallArg};
use crate::collection::Collection;
use crate::error::{ClientError, Result};
use crate::request::{Key, RequestDescriptor};
use crate::subscriptions::{Listener, Unsubscribe};
use crate::transport::SendOptions;
use crate::types::{Method, RecordSnapshot};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

/// Handle to one record of a collection.
pub struct Record<T> {
    collection: Collection<T>,
    id: String,
}

impl<T> Clone for Record<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            id: self.id.clone(),
        }
    }
}

impl<T> Record<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(collection: Collection<T>, id: String) -> Self {
        Self { collection, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub fn key(&self) -> Key {
        Key::record(self.collection.id(), &self.id)
    }

    pub fn descriptor(&self) -> RequestDescriptor {
        RequestDescriptor::get_record(self.collection.id(), &self.id)
    }

    /// One-shot fetch of the current record.
    pub async fn get(&self) -> Result<RecordSnapshot<T>> {
        self.collection.core().fetch_record(&self.descriptor()).await
    }

    /// Observe this record, sharing a poll loop with every other observer of
    /// the same record through this collection handle.
    pub fn on_snapshot(&self, listener: Listener<RecordSnapshot<T>>) -> Result<Unsubscribe> {
        self.collection
            .record_registry()
            .subscribe(self.key(), || Ok(self.descriptor()), listener)
    }

    /// Invoke a collection method on this record.
    pub async fn call(&self, function: &str, args: Vec<CallArg>) -> Result<RecordSnapshot<T>> {
        let schema = self.collection.schema().await?;
        let args = encode_call_args(args);
        self.collection
            .core()
            .ctx()
            .validator
            .validate_call(&schema, function, &args)?;

        let descriptor = RequestDescriptor::new(
            Method::Post,
            ["collections", self.collection.id(), "records", self.id.as_str(), "call", function],
        )
        .with_body(json!({ "args": args }));
        debug!(record = %self.key(), function, "calling record method");
        self.collection.core().write(&descriptor).await
    }

    /// Replace the record's data.
    pub async fn set(&self, data: &T) -> Result<RecordSnapshot<T>>
    where
        T: Serialize,
    {
        let schema = self.collection.schema().await?;
        let value =
            serde_json::to_value(data).map_err(|e| ClientError::Serialization(e.to_string()))?;
        self.collection
            .core()
            .ctx()
            .validator
            .validate_set(&schema, &value)?;

        let descriptor = self.descriptor().with_method(Method::Put).with_body(value);
        self.collection.core().write(&descriptor).await
    }

    pub async fn delete(&self) -> Result<()> {
        let descriptor = self.descriptor().with_method(Method::Delete);
        self.collection
            .core()
            .ctx()
            .transport
            .send(&descriptor, SendOptions::signed())
            .await?;
        Ok(())
    }
}
