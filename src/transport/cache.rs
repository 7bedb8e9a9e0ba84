//! LRU cache of recent responses.

use super::Response;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct CachedResponse {
    response: Response,
    stored_at: Instant,
}

/// Response cache keyed by request fingerprint.
///
/// Entries do not expire on their own; freshness is decided per lookup by
/// the caller's TTL.
pub struct ResponseCache {
    entries: Mutex<LruCache<String, CachedResponse>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Get a response stored less than `ttl` ago.
    pub fn get_fresh(&self, fingerprint: &str, ttl: Duration) -> Option<Response> {
        let mut entries = self.entries.lock();
        let cached = entries.get(fingerprint)?;
        if cached.stored_at.elapsed() < ttl {
            Some(cached.response.clone())
        } else {
            entries.pop(fingerprint);
            None
        }
    }

    pub fn put(&self, fingerprint: String, response: Response) {
        self.entries.lock().put(
            fingerprint,
            CachedResponse {
                response,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
