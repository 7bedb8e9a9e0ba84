//! Subscription system for live queries.
//!
//! This module turns one-shot requests into live views:
//! - A [`PollingSubscription`] owns one request and polls it on a fixed delay
//!   while it has listeners
//! - A [`SubscriptionRegistry`] shares one subscription between every
//!   observer of the same [`Key`](crate::request::Key)
//! - A [`PollSource`] decides what a single poll cycle fetches and decodes
//!
//! Subscriptions support:
//! - Many listeners per request, notified in registration order
//! - Error reporting without tearing the loop down
//! - Teardown as soon as the last listener leaves
//!
//! # Example
//!
//! ```ignore
//! let registry = SubscriptionRegistry::new(source, SubscriptionConfig::default());
//!
//! let key = Key::record("users", "alice");
//! let handle = registry.subscribe(
//!     key,
//!     || Ok(RequestDescriptor::get_record("users", "alice")),
//!     Listener::new(|user: &RecordSnapshot<User>| println!("{:?}", user.data))
//!         .with_error(|e| eprintln!("poll failed: {}", e)),
//! )?;
//!
//! // Later
//! handle.unsubscribe();
//! ```

mod polling;
mod registry;
mod source;
mod types;

pub use polling::PollingSubscription;
pub use registry::SubscriptionRegistry;
pub use source::{PollSource, TransportSource};
pub use types::{
    DataCallback, ErrorCallback, EvictionPolicy, Listener, ListenerId, PollState,
    SubscriptionConfig, Unsubscribe,
};
