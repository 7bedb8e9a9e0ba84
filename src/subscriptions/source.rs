//! Poll sources: what one poll cycle actually does.

use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::transport::{SendOptions, Transport};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

/// Performs the fetch of one poll cycle and decodes the result.
#[async_trait]
pub trait PollSource<T>: Send + Sync {
    async fn poll(&self, descriptor: &RequestDescriptor) -> Result<T>;
}

/// Sends through a [`Transport`] and decodes the body with serde.
pub struct TransportSource<T> {
    transport: Arc<dyn Transport>,
    options: SendOptions,
    _marker: PhantomData<fn() -> T>,
}

impl<T> TransportSource<T> {
    pub fn new(transport: Arc<dyn Transport>, options: SendOptions) -> Self {
        Self {
            transport,
            options,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T> PollSource<T> for TransportSource<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn poll(&self, descriptor: &RequestDescriptor) -> Result<T> {
        let response = self.transport.send(descriptor, self.options).await?;
        Ok(serde_json::from_value(response.data)?)
    }
}
