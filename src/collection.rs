//! Collection handles.

use crate::client::ClientContext;
use crate::codec::{encode_call_args, CallArg, RecordCodec};
use crate::error::{ClientError, Result};
use crate::query::Query;
use crate::record::Record;
use crate::request::{Key, RequestDescriptor};
use crate::schema::{CollectionSchema, META_COLLECTION};
use crate::subscriptions::{Listener, PollSource, SubscriptionRegistry, Unsubscribe};
use crate::transport::SendOptions;
use crate::types::{BasicValue, CollectionList, CollectionMeta, Method, RecordSnapshot, SortDirection, WhereOperator};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

/// Untyped per-collection state: identity, collaborators and the cached
/// schema. Shared by the handle and its poll sources.
pub(crate) struct CollectionCore {
    id: String,
    ctx: ClientContext,
    meta: OnceCell<CollectionMeta>,
    schema: OnceCell<Arc<CollectionSchema>>,
}

impl CollectionCore {
    fn is_meta_collection(&self) -> bool {
        self.id == META_COLLECTION
    }

    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn ctx(&self) -> &ClientContext {
        &self.ctx
    }

    async fn meta(&self) -> Result<&CollectionMeta> {
        self.meta.get_or_try_init(|| self.fetch_meta()).await
    }

    async fn fetch_meta(&self) -> Result<CollectionMeta> {
        let descriptor = RequestDescriptor::get_record(META_COLLECTION, &self.id);
        let response = match self.ctx.transport.send(&descriptor, SendOptions::default()).await {
            Ok(response) => response,
            Err(ClientError::RecordNotFound(_)) => {
                return Err(ClientError::CollectionNotFound(self.id.clone()))
            }
            Err(e) => return Err(e),
        };
        let record: RecordSnapshot<CollectionMeta> =
            RecordCodec::passthrough().decode_record(response.data)?;
        debug!(collection = %self.id, "loaded collection metadata");
        Ok(record.data)
    }

    pub(crate) async fn schema(&self) -> Result<Arc<CollectionSchema>> {
        self.schema.get_or_try_init(|| self.parse_schema()).await.cloned()
    }

    async fn parse_schema(&self) -> Result<Arc<CollectionSchema>> {
        if self.is_meta_collection() {
            return Ok(Arc::new(CollectionSchema::meta_collection()));
        }
        let meta = self.meta().await?;
        Ok(Arc::new(CollectionSchema::from_ast(&meta.ast, &self.id)?))
    }

    pub(crate) async fn is_publicly_accessible(&self) -> Result<bool> {
        if self.is_meta_collection() {
            return Ok(true);
        }
        Ok(self.schema().await?.is_publicly_accessible())
    }

    /// Send options for reads: signed unless the collection is public.
    pub(crate) async fn read_options(&self) -> Result<SendOptions> {
        Ok(SendOptions::default().with_auth(!self.is_publicly_accessible().await?))
    }

    pub(crate) async fn codec(&self) -> Result<RecordCodec> {
        let schema = self.schema().await?;
        Ok(RecordCodec::from_schema(&schema))
    }

    pub(crate) async fn fetch_list<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
        cache_ttl: Option<Duration>,
    ) -> Result<CollectionList<T>> {
        let mut options = self.read_options().await?;
        options.cache_ttl = cache_ttl;
        let response = self.ctx.transport.send(descriptor, options).await?;
        self.codec().await?.decode_list(response.data)
    }

    pub(crate) async fn fetch_record<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<RecordSnapshot<T>> {
        let options = self.read_options().await?;
        let response = self.ctx.transport.send(descriptor, options).await?;
        self.codec().await?.decode_record(response.data)
    }

    /// Send a signed write and decode the record it returns.
    pub(crate) async fn write<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<RecordSnapshot<T>> {
        let response = self.ctx.transport.send(descriptor, SendOptions::signed()).await?;
        self.codec().await?.decode_record(response.data)
    }
}

/// Polls a listing through its collection.
struct ListSource {
    core: Arc<CollectionCore>,
}

#[async_trait]
impl<T> PollSource<CollectionList<T>> for ListSource
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn poll(&self, descriptor: &RequestDescriptor) -> Result<CollectionList<T>> {
        self.core.fetch_list(descriptor, None).await
    }
}

/// Polls a single record through its collection.
struct RecordSource {
    core: Arc<CollectionCore>,
}

#[async_trait]
impl<T> PollSource<RecordSnapshot<T>> for RecordSource
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    async fn poll(&self, descriptor: &RequestDescriptor) -> Result<RecordSnapshot<T>> {
        self.core.fetch_record(descriptor).await
    }
}

struct CollectionInner<T> {
    core: Arc<CollectionCore>,
    /// Listings and queries; keyed `collection:` / `query:`.
    query_subs: SubscriptionRegistry<CollectionList<T>>,
    /// Single records; keyed `record:`.
    record_subs: SubscriptionRegistry<RecordSnapshot<T>>,
}

/// Handle to a remote collection of `T` records.
///
/// Cloning a handle shares its metadata cache and subscription registries.
pub struct Collection<T> {
    inner: Arc<CollectionInner<T>>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Collection<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    pub(crate) fn new(id: String, ctx: ClientContext) -> Self {
        let subscription_config = ctx.config.subscription_config();
        let core = Arc::new(CollectionCore {
            id,
            ctx,
            meta: OnceCell::new(),
            schema: OnceCell::new(),
        });

        let list_source: Arc<dyn PollSource<CollectionList<T>>> = Arc::new(ListSource {
            core: Arc::clone(&core),
        });
        let record_source: Arc<dyn PollSource<RecordSnapshot<T>>> = Arc::new(RecordSource {
            core: Arc::clone(&core),
        });

        Self {
            inner: Arc::new(CollectionInner {
                query_subs: SubscriptionRegistry::new(list_source, subscription_config.clone()),
                record_subs: SubscriptionRegistry::new(record_source, subscription_config),
                core,
            }),
        }
    }

    pub fn id(&self) -> &str {
        self.inner.core.id()
    }

    /// Key of the unfiltered listing.
    pub fn key(&self) -> Key {
        Key::collection(self.id())
    }

    /// Fetch and cache the collection's metadata and schema.
    pub async fn load(&self) -> Result<()> {
        self.schema().await.map(|_| ())
    }

    pub async fn get_meta(&self) -> Result<CollectionMeta> {
        if self.inner.core.is_meta_collection() {
            return Err(ClientError::InvalidQuery(format!(
                "{} has no metadata record",
                META_COLLECTION
            )));
        }
        self.inner.core.meta().await.cloned()
    }

    pub async fn schema(&self) -> Result<Arc<CollectionSchema>> {
        self.inner.core.schema().await
    }

    /// Whether `data` is a valid full record of this collection.
    pub async fn validate(&self, data: &Value) -> Result<bool> {
        let schema = self.schema().await?;
        match self.inner.core.ctx().validator.validate_set(&schema, data) {
            Ok(()) => Ok(true),
            Err(ClientError::Validation(reason)) => {
                debug!(collection = %self.id(), %reason, "record failed validation");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn is_publicly_accessible(&self) -> Result<bool> {
        self.inner.core.is_publicly_accessible().await
    }

    /// Create a record through the collection's constructor.
    pub async fn create(&self, args: Vec<CallArg>) -> Result<RecordSnapshot<T>> {
        let schema = self.schema().await?;
        let args = encode_call_args(args);
        self.inner
            .core
            .ctx()
            .validator
            .validate_call(&schema, "constructor", &args)?;

        let descriptor = RequestDescriptor::list_records(self.id())
            .with_method(Method::Post)
            .with_body(json!({ "args": args }));
        self.inner.core.write(&descriptor).await
    }

    /// One-shot listing of the whole collection, served from the response
    /// cache when fresh.
    pub async fn get(&self) -> Result<CollectionList<T>> {
        let descriptor = RequestDescriptor::list_records(self.id());
        let ttl = self.inner.core.ctx().config.list_cache_ttl();
        self.inner.core.fetch_list(&descriptor, Some(ttl)).await
    }

    pub fn record(&self, id: impl Into<String>) -> Record<T> {
        Record::new(self.clone(), id.into())
    }

    /// Empty query over this collection.
    pub fn query(&self) -> Query<T> {
        Query::new(self.clone())
    }

    pub fn where_(
        &self,
        field: impl Into<String>,
        op: WhereOperator,
        value: impl Into<BasicValue>,
    ) -> Query<T> {
        self.query().where_(field, op, value)
    }

    pub fn sort(&self, field: impl Into<String>, direction: SortDirection) -> Query<T> {
        self.query().sort(field, direction)
    }

    pub fn limit(&self, limit: u32) -> Query<T> {
        self.query().limit(limit)
    }

    pub fn after(&self, cursor: impl Into<String>) -> Query<T> {
        self.query().after(cursor)
    }

    pub fn before(&self, cursor: impl Into<String>) -> Query<T> {
        self.query().before(cursor)
    }

    /// Observe the unfiltered listing.
    pub fn on_snapshot(&self, listener: Listener<CollectionList<T>>) -> Result<Unsubscribe> {
        self.query().on_snapshot(listener)
    }

    /// Number of live (or retained) subscriptions across both registries.
    pub fn subscription_count(&self) -> usize {
        self.inner.query_subs.len() + self.inner.record_subs.len()
    }

    /// Stop every subscription created through this handle.
    pub fn stop_all(&self) {
        self.inner.query_subs.stop_all();
        self.inner.record_subs.stop_all();
    }

    pub(crate) fn core(&self) -> &Arc<CollectionCore> {
        &self.inner.core
    }

    pub(crate) fn query_registry(&self) -> &SubscriptionRegistry<CollectionList<T>> {
        &self.inner.query_subs
    }

    pub(crate) fn record_registry(&self) -> &SubscriptionRegistry<RecordSnapshot<T>> {
        &self.inner.record_subs
    }
}
