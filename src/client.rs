//! Client entry point and configuration.

use crate::collection::Collection;
use crate::error::{ClientError, Result};
use crate::schema::{SchemaValidator, Validator};
use crate::subscriptions::SubscriptionConfig;
use crate::transport::{HttpTransport, HttpTransportConfig, Signer, Transport};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Client configuration.
///
/// Every field has a default, so a partial JSON document is a valid config.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the record store API.
    pub base_url: String,

    /// Delay between poll cycles of live subscriptions.
    /// Default: 100
    pub poll_interval_ms: u64,

    /// Freshness window for cached collection listings.
    /// Default: 60 minutes
    pub list_cache_ttl_ms: u64,

    /// Per-request timeout of the HTTP transport.
    /// Default: 30s
    pub request_timeout_ms: u64,

    /// Retries for connect and timeout failures.
    pub max_retries: u32,

    /// Number of cached responses kept by the HTTP transport.
    pub response_cache_size: usize,

    /// Header carrying request signatures.
    pub signature_header: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let transport = HttpTransportConfig::default();
        Self {
            base_url: transport.base_url,
            poll_interval_ms: 100,
            list_cache_ttl_ms: 60 * 60 * 1000,
            request_timeout_ms: transport.request_timeout.as_millis() as u64,
            max_retries: transport.max_retries,
            response_cache_size: transport.response_cache_size,
            signature_header: transport.signature_header,
        }
    }
}

impl ClientConfig {
    /// Parse a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ClientError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(ClientError::Config("poll_interval_ms must be greater than zero".into()));
        }
        if self.base_url.is_empty() {
            return Err(ClientError::Config("base_url cannot be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn list_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.list_cache_ttl_ms)
    }

    pub fn subscription_config(&self) -> SubscriptionConfig {
        SubscriptionConfig {
            interval: self.poll_interval(),
        }
    }

    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            base_url: self.base_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            max_retries: self.max_retries,
            response_cache_size: self.response_cache_size,
            signature_header: self.signature_header.clone(),
        }
    }
}

/// Collaborators shared by every handle created from one client.
#[derive(Clone)]
pub(crate) struct ClientContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) validator: Arc<dyn Validator>,
    pub(crate) config: Arc<ClientConfig>,
}

/// Entry point: creates collection handles bound to one transport.
///
/// # Example
///
/// ```ignore
/// let client = Client::new(ClientConfig::default(), Some(Arc::new(my_signer)))?;
/// let users = client.collection::<User>("app/users");
///
/// let adults = users.where_("age", WhereOperator::Gte, 18).limit(20);
/// let handle = adults.on_snapshot(Listener::new(|page| println!("{} users", page.len())))?;
/// ```
#[derive(Clone)]
pub struct Client {
    ctx: ClientContext,
}

impl Client {
    /// Client over HTTP using `config`.
    pub fn new(config: ClientConfig, signer: Option<Arc<dyn Signer>>) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.transport_config(), signer)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Client over any [`Transport`].
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            ctx: ClientContext {
                transport,
                validator: Arc::new(SchemaValidator),
                config: Arc::new(config),
            },
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.ctx.validator = validator;
        self
    }

    /// Handle to a collection.
    ///
    /// Each handle owns its own subscription registries, so observers only
    /// share poll loops when they go through the same handle (or its clones).
    pub fn collection<T>(&self, id: impl Into<String>) -> Collection<T>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        Collection::new(id.into(), self.ctx.clone())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.ctx.config
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.ctx.transport
    }
}
