//! Subscription types for live queries.

use crate::error::ClientError;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a polling subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Delay between the end of one poll cycle and the start of the next.
    /// Default: 100ms
    pub interval: Duration,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
        }
    }
}

/// What a registry does with an entry whose last listener has left.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Remove the entry as soon as its listener set is empty.
    #[default]
    EvictWhenIdle,
    /// Keep the idle entry (it does not poll) so a later subscriber reuses it.
    RetainIdle,
}

/// Where a subscription's poll loop currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollState {
    /// No listeners, no task.
    Idle,
    /// Waiting for the next cycle to start.
    Scheduled,
    /// A request is outstanding.
    InFlight,
}

/// Unique identifier for a registered listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ListenerId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

pub type DataCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;

/// A pair of callbacks receiving the outcome of every poll cycle.
pub struct Listener<T> {
    pub(crate) on_data: DataCallback<T>,
    pub(crate) on_error: Option<ErrorCallback>,
}

impl<T> Listener<T> {
    /// Listener that only observes data.
    ///
    /// Failed cycles are not delivered to it (they are logged at `debug`);
    /// attach [`Listener::with_error`] to observe them.
    pub fn new<F>(on_data: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Self {
            on_data: Arc::new(on_data),
            on_error: None,
        }
    }

    pub fn with_error<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }
}

impl<T> Clone for Listener<T> {
    fn clone(&self) -> Self {
        Self {
            on_data: Arc::clone(&self.on_data),
            on_error: self.on_error.clone(),
        }
    }
}

impl<T> fmt::Debug for Listener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("has_error_callback", &self.on_error.is_some())
            .finish()
    }
}

/// Handle returned by every subscribe call.
///
/// Dropping the handle does not unsubscribe.
#[must_use = "the listener stays registered until unsubscribe() is called"]
pub struct Unsubscribe {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl Unsubscribe {
    pub(crate) fn new<F>(action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }

    /// Remove the listener. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        let action = self.action.lock().take();
        if let Some(action) = action {
            action();
        }
    }

    /// False once `unsubscribe` has run.
    pub fn is_active(&self) -> bool {
        self.action.lock().is_some()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("active", &self.is_active())
            .finish()
    }
}
