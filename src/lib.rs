//! # Live Records
//!
//! Client for a remote record store that turns one-shot requests into live,
//! polled views.
//!
//! ## Core Concepts
//!
//! - **Collections**: Handles over a remote collection, with schema-aware
//!   reads and signed writes
//! - **Queries**: Filtered, sorted and paginated listings
//! - **Keys**: Canonical identities of requests; equal keys share a poll loop
//! - **Subscriptions**: Fixed-delay poll loops that fan results out to every
//!   listener and stop when the last one leaves
//!
//! ## Example
//!
//! ```ignore
//! use live_records::{Client, ClientConfig, Listener, SortDirection, WhereOperator};
//!
//! let client = Client::new(ClientConfig::default(), None)?;
//! let cities = client.collection::<City>("app/cities");
//!
//! // One-shot read
//! let page = cities.where_("country", WhereOperator::Eq, "NZ").get().await?;
//!
//! // Live view
//! let handle = cities
//!     .sort("population", SortDirection::Desc)
//!     .limit(10)
//!     .on_snapshot(Listener::new(|page| println!("{} cities", page.len())))?;
//!
//! handle.unsubscribe();
//! ```

pub mod client;
pub mod codec;
pub mod collection;
pub mod error;
pub mod query;
pub mod record;
pub mod request;
pub mod schema;
pub mod subscriptions;
pub mod transport;
pub mod types;

// Re-exports
pub use client::{Client, ClientConfig};
pub use codec::{encode_call_args, CallArg, RecordCodec};
pub use collection::Collection;
pub use error::{ClientError, Result};
pub use query::Query;
pub use record::Record;
pub use request::{derive_key, Filter, Key, KeyTag, RequestDescriptor, RequestParams, Sort};
pub use schema::{CollectionSchema, SchemaValidator, Validator};
pub use subscriptions::{
    EvictionPolicy, Listener, PollSource, PollState, PollingSubscription, SubscriptionConfig,
    SubscriptionRegistry, Unsubscribe,
};
pub use transport::{HttpTransport, HttpTransportConfig, Response, SendOptions, Signer, Transport};
pub use types::*;
