//! Keyed registry of shared polling subscriptions.

use crate::error::Result;
use crate::request::{Key, RequestDescriptor};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

use super::polling::PollingSubscription;
use super::source::PollSource;
use super::types::{EvictionPolicy, Listener, SubscriptionConfig, Unsubscribe};

type Entries<T> = RwLock<HashMap<Key, PollingSubscription<T>>>;

/// One [`PollingSubscription`] per key, shared by every observer of that key.
///
/// A registry belongs to the handle that created it; keys from different
/// registries never share a poll loop.
pub struct SubscriptionRegistry<T> {
    entries: Arc<Entries<T>>,
    source: Arc<dyn PollSource<T>>,
    config: SubscriptionConfig,
    policy: EvictionPolicy,
}

impl<T> SubscriptionRegistry<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(source: Arc<dyn PollSource<T>>, config: SubscriptionConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            source,
            config,
            policy: EvictionPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Return the subscription for `key`, building its descriptor only if
    /// the key is not yet present.
    pub fn get_or_create<F>(&self, key: &Key, descriptor: F) -> Result<PollingSubscription<T>>
    where
        F: FnOnce() -> Result<RequestDescriptor>,
    {
        let mut entries = self.entries.write();
        self.get_or_create_locked(&mut entries, key, descriptor)
    }

    /// Get or create the subscription for `key` and register `listener` on it.
    ///
    /// The returned handle removes the listener and, under
    /// [`EvictionPolicy::EvictWhenIdle`], drops the entry once it is empty.
    pub fn subscribe<F>(&self, key: Key, descriptor: F, listener: Listener<T>) -> Result<Unsubscribe>
    where
        F: FnOnce() -> Result<RequestDescriptor>,
    {
        let mut entries = self.entries.write();
        let created = !entries.contains_key(&key);
        let subscription = self.get_or_create_locked(&mut entries, &key, descriptor)?;

        let id = match subscription.register(listener) {
            Ok(id) => id,
            Err(e) => {
                if created && self.policy == EvictionPolicy::EvictWhenIdle {
                    entries.remove(&key);
                }
                return Err(e);
            }
        };
        drop(entries);

        let weak_entries: Weak<Entries<T>> = Arc::downgrade(&self.entries);
        let policy = self.policy;
        Ok(Unsubscribe::new(move || {
            subscription.remove_listener(id);
            if policy == EvictionPolicy::EvictWhenIdle {
                if let Some(entries) = weak_entries.upgrade() {
                    evict_if_idle(&entries, &key, &subscription);
                }
            }
        }))
    }

    fn get_or_create_locked<F>(
        &self,
        entries: &mut HashMap<Key, PollingSubscription<T>>,
        key: &Key,
        descriptor: F,
    ) -> Result<PollingSubscription<T>>
    where
        F: FnOnce() -> Result<RequestDescriptor>,
    {
        if let Some(existing) = entries.get(key) {
            return Ok(existing.clone());
        }

        let subscription =
            PollingSubscription::new(descriptor()?, Arc::clone(&self.source), &self.config);
        debug!(key = %key, fingerprint = %key.fingerprint(), "created subscription");
        entries.insert(key.clone(), subscription.clone());
        Ok(subscription)
    }

    pub fn get(&self, key: &Key) -> Option<PollingSubscription<T>> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &Key) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<Key> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Stop every subscription, regardless of listeners.
    pub fn stop_all(&self) {
        let mut entries = self.entries.write();
        for subscription in entries.values() {
            subscription.stop();
        }
        if self.policy == EvictionPolicy::EvictWhenIdle {
            entries.clear();
        }
    }
}

fn evict_if_idle<T>(entries: &Entries<T>, key: &Key, subscription: &PollingSubscription<T>)
where
    T: Send + Sync + 'static,
{
    let mut entries = entries.write();
    let idle = entries
        .get(key)
        .map(|current| current.same_instance(subscription) && current.listener_count() == 0)
        .unwrap_or(false);
    if idle {
        entries.remove(key);
        debug!(key = %key, "evicted idle subscription");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct EchoSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PollSource<String> for EchoSource {
        async fn poll(&self, descriptor: &RequestDescriptor) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(descriptor.path())
        }
    }

    fn registry(policy: EvictionPolicy) -> (Arc<EchoSource>, SubscriptionRegistry<String>) {
        let source = Arc::new(EchoSource {
            calls: AtomicUsize::new(0),
        });
        let registry = SubscriptionRegistry::new(
            Arc::clone(&source) as Arc<dyn PollSource<String>>,
            SubscriptionConfig::default(),
        )
        .with_policy(policy);
        (source, registry)
    }

    fn descriptor(id: &str) -> impl FnOnce() -> Result<RequestDescriptor> + '_ {
        move || Ok(RequestDescriptor::get_record("users", id))
    }

    fn collect() -> (Arc<Mutex<Vec<String>>>, Listener<String>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (seen, Listener::new(move |v: &String| s.lock().push(v.clone())))
    }

    #[test]
    fn test_get_or_create_returns_same_instance() {
        let (_, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let key = Key::record("users", "alice");

        let a = registry.get_or_create(&key, descriptor("alice")).unwrap();
        let b = registry
            .get_or_create(&key, || panic!("factory must not run for an existing key"))
            .unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_factory_error_leaves_no_entry() {
        let (_, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let key = Key::record("users", "bad");
        let result = registry.get_or_create(&key, || Err(ClientError::InvalidQuery("bad".into())));
        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_key_shares_one_loop() {
        let (source, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let key = Key::record("users", "alice");

        let (seen_a, a) = collect();
        let (seen_b, b) = collect();
        let ha = registry.subscribe(key.clone(), descriptor("alice"), a).unwrap();
        let hb = registry.subscribe(key.clone(), descriptor("alice"), b).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&key).unwrap().listener_count(), 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(seen_a.lock().len(), 2);
        assert_eq!(seen_b.lock().len(), 2);

        ha.unsubscribe();
        assert!(registry.contains(&key));
        hb.unsubscribe();
        assert!(!registry.contains(&key));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_poll_independently() {
        let (source, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let (seen_a, a) = collect();
        let (seen_b, b) = collect();
        let _ha = registry.subscribe(Key::record("users", "a"), descriptor("a"), a).unwrap();
        let _hb = registry.subscribe(Key::record("users", "b"), descriptor("b"), b).unwrap();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(registry.len(), 2);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(*seen_a.lock(), vec!["/collections/users/records/a".to_string()]);
        assert_eq!(*seen_b.lock(), vec!["/collections/users/records/b".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_idle_entry_does_not_poll() {
        let (source, registry) = registry(EvictionPolicy::RetainIdle);
        let key = Key::record("users", "alice");

        let (_, listener) = collect();
        let handle = registry.subscribe(key.clone(), descriptor("alice"), listener).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.unsubscribe();

        assert!(registry.contains(&key));
        assert!(!registry.get(&key).unwrap().is_active());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        let original = registry.get(&key).unwrap();
        let (seen, listener) = collect();
        let _handle = registry
            .subscribe(key.clone(), || panic!("entry should be reused"), listener)
            .unwrap();
        assert!(registry.get(&key).unwrap().same_instance(&original));
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_unsubscribe_does_not_evict_new_entry() {
        let (_, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let key = Key::record("users", "alice");

        let (_, first) = collect();
        let h1 = registry.subscribe(key.clone(), descriptor("alice"), first).unwrap();
        h1.unsubscribe();
        assert!(!registry.contains(&key));

        let (_, second) = collect();
        let _h2 = registry.subscribe(key.clone(), descriptor("alice"), second).unwrap();
        h1.unsubscribe();
        assert!(registry.contains(&key));
        assert_eq!(registry.get(&key).unwrap().listener_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_all() {
        let (source, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let (_, a) = collect();
        let (_, b) = collect();
        let _ha = registry.subscribe(Key::record("users", "a"), descriptor("a"), a).unwrap();
        let _hb = registry.subscribe(Key::record("users", "b"), descriptor("b"), b).unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        registry.stop_all();
        assert!(registry.is_empty());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_subscribe_without_runtime_leaves_no_entry() {
        let (_, registry) = registry(EvictionPolicy::EvictWhenIdle);
        let (_, listener) = collect();
        let result = registry.subscribe(Key::record("users", "a"), descriptor("a"), listener);
        assert!(matches!(result, Err(ClientError::NoRuntime(_))));
        assert!(registry.is_empty());
    }
}
