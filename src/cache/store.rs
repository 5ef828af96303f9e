//! Concurrent Store
//!
//! Mutex-guarded wrapper over [`LruCache`] holding [`ByteView`]s. The LRU is
//! allocated on the first write so an unused group costs nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::byteview::ByteView;
use super::lru::{LruCache, OnEvicted};

/// Thread-safe, lazily allocated byte-bounded store
pub struct Store {
    inner: Mutex<Option<LruCache<ByteView>>>,
    cache_bytes: u64,
    on_evicted: Option<OnEvicted<ByteView>>,
    evictions: Arc<AtomicU64>,
}

impl Store {
    /// Create a store with a byte budget (0 = unbounded)
    pub fn new(cache_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(None),
            cache_bytes,
            on_evicted: None,
            evictions: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a store that reports evictions to `on_evicted`
    pub fn with_on_evicted(cache_bytes: u64, on_evicted: OnEvicted<ByteView>) -> Self {
        Self {
            on_evicted: Some(on_evicted),
            ..Self::new(cache_bytes)
        }
    }

    /// Look up a key, promoting it on hit
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut guard = self.inner.lock();
        guard.as_mut()?.get(key).cloned()
    }

    /// Insert or replace a value
    pub fn add(&self, key: &str, value: ByteView) {
        let mut guard = self.inner.lock();
        let lru = guard.get_or_insert_with(|| self.build());
        lru.add(key, value);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |lru| lru.len())
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted bytes (keys + values)
    pub fn bytes(&self) -> u64 {
        self.inner.lock().as_ref().map_or(0, |lru| lru.bytes())
    }

    /// Total evictions since creation
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Whether the LRU has been allocated yet
    pub fn is_allocated(&self) -> bool {
        self.inner.lock().is_some()
    }

    fn build(&self) -> LruCache<ByteView> {
        let counter = self.evictions.clone();
        let user = self.on_evicted.clone();
        let cb: OnEvicted<ByteView> = Arc::new(move |key: &str, value: &ByteView| {
            counter.fetch_add(1, Ordering::Relaxed);
            if let Some(user) = &user {
                user(key, value);
            }
        });
        LruCache::new(self.cache_bytes, Some(cb))
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("cache_bytes", &self.cache_bytes)
            .field("evictions", &self.evictions())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
