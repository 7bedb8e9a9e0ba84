//! Filtered, sorted and paginated views of a collection.

use crate::collection::Collection;
use crate::error::Result;
use crate::request::{Filter, Key, RequestDescriptor, RequestParams, Sort};
use crate::subscriptions::{Listener, Unsubscribe};
use crate::types::{BasicValue, CollectionList, SortDirection, WhereOperator};
use serde::de::DeserializeOwned;

/// A query over one collection.
///
/// Builders consume and return the query, so a base query can be cloned and
/// refined independently. Two queries with equal parameters share a key, and
/// therefore a poll loop when observed through the same collection handle.
pub struct Query<T> {
    collection: Collection<T>,
    params: RequestParams,
}

impl<T> Clone for Query<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            params: self.params.clone(),
        }
    }
}

impl<T> Query<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(collection: Collection<T>) -> Self {
        Self {
            collection,
            params: RequestParams::default(),
        }
    }

    pub fn where_(
        mut self,
        field: impl Into<String>,
        op: WhereOperator,
        value: impl Into<BasicValue>,
    ) -> Self {
        self.params.push_filter(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.params.push_sort(Sort {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.params.limit = Some(limit);
        self
    }

    pub fn after(mut self, cursor: impl Into<String>) -> Self {
        self.params.after = Some(cursor.into());
        self
    }

    pub fn before(mut self, cursor: impl Into<String>) -> Self {
        self.params.before = Some(cursor.into());
        self
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub fn params(&self) -> &RequestParams {
        &self.params
    }

    /// Validated listing request for this query.
    pub fn descriptor(&self) -> Result<RequestDescriptor> {
        self.params.validate()?;
        Ok(RequestDescriptor::list_records(self.collection.id()).with_params(self.params.clone()))
    }

    /// Registry key; the collection key when no parameter is set.
    pub fn key(&self) -> Result<Key> {
        self.params.validate()?;
        Key::query(self.collection.id(), &self.params)
    }

    /// One-shot fetch. Never touches the subscription registry.
    pub async fn get(&self) -> Result<CollectionList<T>> {
        let descriptor = self.descriptor()?;
        self.collection.core().fetch_list(&descriptor, None).await
    }

    /// Observe this query's results, starting a poll loop if none is running
    /// for its key.
    pub fn on_snapshot(&self, listener: Listener<CollectionList<T>>) -> Result<Unsubscribe> {
        let key = self.key()?;
        self.collection
            .query_registry()
            .subscribe(key, || self.descriptor(), listener)
    }
}
