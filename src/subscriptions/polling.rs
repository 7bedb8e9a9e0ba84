//! Polling subscription: one request, one poll loop, many listeners.

use crate::error::{ClientError, Result};
use crate::request::RequestDescriptor;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::source::PollSource;
use super::types::{Listener, ListenerId, PollState, SubscriptionConfig, Unsubscribe};

/// Mutable state, only touched through `Shared`'s methods.
struct Inner<T> {
    listeners: Vec<(ListenerId, Listener<T>)>,
    state: PollState,
    /// Bumped on every start and halt; a poll task only acts while its
    /// generation is current.
    generation: u64,
    task: Option<JoinHandle<()>>,
}

struct Shared<T> {
    descriptor: RequestDescriptor,
    source: Arc<dyn PollSource<T>>,
    interval: Duration,
    /// Settled cycles since creation.
    cycles: AtomicU64,
    inner: Mutex<Inner<T>>,
}

impl<T> Shared<T> {
    fn halt(&self, inner: &mut Inner<T>) {
        inner.generation += 1;
        inner.state = PollState::Idle;
        if let Some(task) = inner.task.take() {
            task.abort();
            info!(request = %self.descriptor, "poll loop stopped");
        }
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        let removed = inner.listeners.len() < before;
        if removed && inner.listeners.is_empty() {
            self.halt(&mut inner);
        }
        removed
    }

    /// Mark a cycle as started. False if this loop has been superseded.
    fn begin_cycle(&self, generation: u64) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation || inner.listeners.is_empty() {
            return false;
        }
        inner.state = PollState::InFlight;
        true
    }

    /// Mark a cycle as settled and snapshot the listeners to notify.
    fn settle_cycle(&self, generation: u64) -> Option<Vec<Listener<T>>> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return None;
        }
        inner.state = PollState::Scheduled;
        Some(inner.listeners.iter().map(|(_, l)| l.clone()).collect())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }
}

/// A single shared poll loop over one [`RequestDescriptor`].
///
/// The loop runs while at least one listener is registered. The first
/// listener starts it with an immediate cycle; the next cycle is scheduled
/// `interval` after the previous one settles, so cycles never overlap.
/// A failed cycle is reported to every `on_error` and polling continues.
///
/// Late listeners are not sent the previous result; they see data from the
/// next cycle onward.
pub struct PollingSubscription<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for PollingSubscription<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> PollingSubscription<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(
        descriptor: RequestDescriptor,
        source: Arc<dyn PollSource<T>>,
        config: &SubscriptionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                descriptor,
                source,
                interval: config.interval,
                cycles: AtomicU64::new(0),
                inner: Mutex::new(Inner {
                    listeners: Vec::new(),
                    state: PollState::Idle,
                    generation: 0,
                    task: None,
                }),
            }),
        }
    }

    /// Register a data/error callback pair.
    pub fn subscribe<D, E>(&self, on_data: D, on_error: E) -> Result<Unsubscribe>
    where
        D: Fn(&T) + Send + Sync + 'static,
        E: Fn(&ClientError) + Send + Sync + 'static,
    {
        self.add_listener(Listener::new(on_data).with_error(on_error))
    }

    /// Register a listener and return its unsubscribe handle.
    ///
    /// Fails with [`ClientError::NoRuntime`] when the first listener is added
    /// outside a Tokio runtime.
    pub fn add_listener(&self, listener: Listener<T>) -> Result<Unsubscribe> {
        let id = self.register(listener)?;
        let weak: Weak<Shared<T>> = Arc::downgrade(&self.shared);
        Ok(Unsubscribe::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.remove_listener(id);
            }
        }))
    }

    pub(crate) fn register(&self, listener: Listener<T>) -> Result<ListenerId> {
        let mut inner = self.shared.inner.lock();
        let id = ListenerId::next();

        if !inner.listeners.is_empty() {
            inner.listeners.push((id, listener));
            return Ok(id);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ClientError::NoRuntime(e.to_string()))?;

        if let Some(stale) = inner.task.take() {
            stale.abort();
        }
        inner.generation += 1;
        inner.state = PollState::Scheduled;
        inner.listeners.push((id, listener));

        let generation = inner.generation;
        let shared = Arc::clone(&self.shared);
        inner.task = Some(runtime.spawn(run_poll_loop(shared, generation)));
        info!(
            request = %self.shared.descriptor,
            interval_ms = self.shared.interval.as_millis() as u64,
            "poll loop started"
        );

        Ok(id)
    }

    /// Remove one listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.remove_listener(id)
    }

    /// Cancel the poll loop and drop every listener.
    pub fn stop(&self) {
        let mut inner = self.shared.inner.lock();
        inner.listeners.clear();
        self.shared.halt(&mut inner);
    }

    pub fn listener_count(&self) -> usize {
        self.shared.inner.lock().listeners.len()
    }

    pub fn state(&self) -> PollState {
        self.shared.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() != PollState::Idle
    }

    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.shared.descriptor
    }

    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Number of poll cycles that have settled.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    pub(crate) fn same_instance(&self, other: &PollingSubscription<T>) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

async fn run_poll_loop<T>(shared: Arc<Shared<T>>, generation: u64)
where
    T: Send + Sync + 'static,
{
    loop {
        if !shared.begin_cycle(generation) {
            break;
        }

        {
            let outcome = shared.source.poll(&shared.descriptor).await;
            let cycle = shared.cycles.fetch_add(1, Ordering::Relaxed) + 1;

            let Some(listeners) = shared.settle_cycle(generation) else {
                debug!(request = %shared.descriptor, cycle, "discarding result of superseded cycle");
                break;
            };

            match &outcome {
                Ok(_) => debug!(request = %shared.descriptor, cycle, listeners = listeners.len(), "poll cycle succeeded"),
                Err(e) => warn!(request = %shared.descriptor, cycle, error = %e, "poll cycle failed"),
            }
            dispatch(&shared.descriptor, &listeners, &outcome);
        }

        if !shared.is_current(generation) {
            break;
        }
        tokio::time::sleep(shared.interval).await;
    }
}

/// Notify listeners in registration order. A panicking callback is logged
/// and does not affect the others.
fn dispatch<T>(descriptor: &RequestDescriptor, listeners: &[Listener<T>], outcome: &Result<T>) {
    for listener in listeners {
        let result = match outcome {
            Ok(value) => catch_unwind(AssertUnwindSafe(|| (listener.on_data)(value))),
            Err(err) => match &listener.on_error {
                Some(on_error) => catch_unwind(AssertUnwindSafe(|| on_error(err))),
                None => {
                    debug!(request = %descriptor, error = %err, "listener has no error callback, failure not delivered");
                    Ok(())
                }
            },
        };
        if result.is_err() {
            error!(request = %descriptor, "listener panicked during dispatch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Method;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Returns the cycle number, failing on cycles picked by `fails`.
    struct CountingSource {
        calls: AtomicUsize,
        latency: Duration,
        fails: fn(usize) -> bool,
    }

    impl CountingSource {
        fn new() -> Arc<Self> {
            Self::with(Duration::ZERO, |_| false)
        }

        fn with(latency: Duration, fails: fn(usize) -> bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                latency,
                fails,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PollSource<usize> for CountingSource {
        async fn poll(&self, _descriptor: &RequestDescriptor) -> Result<usize> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if (self.fails)(n) {
                Err(ClientError::Http(format!("cycle {} failed", n)))
            } else {
                Ok(n)
            }
        }
    }

    fn subscription(source: Arc<CountingSource>) -> PollingSubscription<usize> {
        PollingSubscription::new(
            RequestDescriptor::new(Method::Get, ["collections", "col", "records", "id"]),
            source,
            &SubscriptionConfig::default(),
        )
    }

    fn recorder() -> (Arc<Mutex<Vec<usize>>>, Listener<usize>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        (seen, Listener::new(move |v: &usize| s.lock().push(*v)))
    }

    async fn tick(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_listener_polls_immediately_then_per_interval() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let (seen, listener) = recorder();

        let handle = sub.add_listener(listener).unwrap();
        tick(1).await;
        assert_eq!(*seen.lock(), vec![0]);

        tick(100).await;
        assert_eq!(*seen.lock(), vec![0, 1]);

        tick(200).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
        assert_eq!(sub.cycles(), 4);

        handle.unsubscribe();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_polling_after_last_unsubscribe() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let (_seen, listener) = recorder();

        let handle = sub.add_listener(listener).unwrap();
        tick(150).await;
        assert_eq!(source.calls(), 2);

        handle.unsubscribe();
        assert_eq!(sub.state(), PollState::Idle);
        assert_eq!(sub.listener_count(), 0);

        tick(10_000).await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_listener_gets_no_replay() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let (seen_a, listener_a) = recorder();
        let (seen_b, listener_b) = recorder();

        let _a = sub.add_listener(listener_a).unwrap();
        tick(50).await;
        let _b = sub.add_listener(listener_b).unwrap();
        assert!(seen_b.lock().is_empty());

        tick(60).await;
        assert_eq!(*seen_a.lock(), vec![0, 1]);
        assert_eq!(*seen_b.lock(), vec![1]);
        // Still a single loop.
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_stop_polling() {
        let source = CountingSource::with(Duration::ZERO, |n| n % 2 == 1);
        let sub = subscription(Arc::clone(&source));

        let data = Arc::new(Mutex::new(Vec::new()));
        let errors = Arc::new(AtomicUsize::new(0));
        let d = Arc::clone(&data);
        let e = Arc::clone(&errors);
        let _handle = sub
            .subscribe(
                move |v: &usize| d.lock().push(*v),
                move |_err: &ClientError| {
                    e.fetch_add(1, Ordering::SeqCst);
                },
            )
            .unwrap();

        tick(450).await;
        assert_eq!(source.calls(), 5);
        assert_eq!(*data.lock(), vec![0, 2, 4]);
        assert_eq!(errors.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_removing_one_listener_keeps_the_other() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let (seen_a, listener_a) = recorder();
        let (seen_b, listener_b) = recorder();

        let a = sub.add_listener(listener_a).unwrap();
        let _b = sub.add_listener(listener_b).unwrap();
        tick(1).await;
        assert_eq!(*seen_a.lock(), vec![0]);
        assert_eq!(*seen_b.lock(), vec![0]);

        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(sub.listener_count(), 1);

        tick(100).await;
        assert_eq!(*seen_a.lock(), vec![0]);
        assert_eq!(*seen_b.lock(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_never_overlap() {
        // Each request takes 250ms; with a 100ms delay cycles start at 0, 350, 700.
        let source = CountingSource::with(Duration::from_millis(250), |_| false);
        let sub = subscription(Arc::clone(&source));
        let (seen, listener) = recorder();
        let _handle = sub.add_listener(listener).unwrap();

        tick(1).await;
        assert_eq!(sub.state(), PollState::InFlight);
        tick(399).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(*seen.lock(), vec![0]);

        tick(400).await;
        assert_eq!(source.calls(), 3);
        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_after_unsubscribe() {
        let source = CountingSource::with(Duration::from_millis(500), |_| false);
        let sub = subscription(Arc::clone(&source));
        let (seen, listener) = recorder();

        let handle = sub.add_listener(listener).unwrap();
        tick(10).await;
        assert_eq!(sub.state(), PollState::InFlight);

        handle.unsubscribe();
        tick(2_000).await;
        assert!(seen.lock().is_empty());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resubscribe_restarts_loop() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));

        let (_, first) = recorder();
        let handle = sub.add_listener(first).unwrap();
        tick(1).await;
        handle.unsubscribe();
        tick(500).await;
        assert_eq!(source.calls(), 1);

        let (seen, second) = recorder();
        let _handle = sub.add_listener(second).unwrap();
        tick(1).await;
        assert_eq!(*seen.lock(), vec![1]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drops_all_listeners() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let (seen_a, a) = recorder();
        let (_seen_b, b) = recorder();
        let _a = sub.add_listener(a).unwrap();
        let _b = sub.add_listener(b).unwrap();

        tick(150).await;
        sub.stop();
        assert_eq!(sub.listener_count(), 0);
        assert!(!sub.is_active());

        tick(1_000).await;
        assert_eq!(source.calls(), 2);
        assert_eq!(seen_a.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_listener_is_isolated() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));
        let _bad = sub
            .add_listener(Listener::new(|_: &usize| panic!("listener bug")))
            .unwrap();
        let (seen, good) = recorder();
        let _good = sub.add_listener(good).unwrap();

        tick(150).await;
        assert_eq!(*seen.lock(), vec![0, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_error_callback_is_isolated() {
        let source = CountingSource::with(Duration::ZERO, |_| true);
        let sub = subscription(Arc::clone(&source));
        let _bad = sub
            .add_listener(
                Listener::new(|_: &usize| {}).with_error(|_: &ClientError| panic!("error handler bug")),
            )
            .unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let e = Arc::clone(&errors);
        let _good = sub
            .add_listener(
                Listener::new(|_: &usize| {}).with_error(move |err: &ClientError| e.lock().push(err.to_string())),
            )
            .unwrap();

        tick(150).await;
        assert_eq!(
            *errors.lock(),
            vec!["HTTP error: cycle 0 failed".to_string(), "HTTP error: cycle 1 failed".to_string()]
        );
        assert!(sub.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsubscribe_from_inside_callback() {
        let source = CountingSource::new();
        let sub = subscription(Arc::clone(&source));

        let slot: Arc<Mutex<Option<Unsubscribe>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&slot);
        let c = Arc::clone(&calls);
        let handle = sub
            .add_listener(Listener::new(move |_: &usize| {
                c.fetch_add(1, Ordering::SeqCst);
                if let Some(h) = s.lock().as_ref() {
                    h.unsubscribe();
                }
            }))
            .unwrap();
        *slot.lock() = Some(handle);

        tick(500).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(source.calls(), 1);
        assert_eq!(sub.state(), PollState::Idle);
    }

    #[test]
    fn test_subscribe_outside_runtime_fails() {
        let sub = subscription(CountingSource::new());
        let (_, listener) = recorder();
        let result = sub.add_listener(listener);
        assert!(matches!(result, Err(ClientError::NoRuntime(_))));
        assert_eq!(sub.listener_count(), 0);
    }
}
