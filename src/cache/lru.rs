//! LRU Core
//!
//! Single-threaded least-recently-used store with a byte budget.
//!
//! # Design
//!
//! ```text
//!   index: HashMap<String, slot>
//!
//!   head (MRU) ──► [slot 3] ◄──► [slot 0] ◄──► [slot 5] ◄── tail (LRU)
//! ```
//!
//! - Entries live in a slot arena linked by index, so promotion and
//!   removal of the oldest entry are O(1) without unsafe pointers.
//! - Accounted size is `key.len() + value.len()` summed over all entries.
//! - A budget of 0 disables eviction.
//!
//! Callers provide their own locking; see [`super::store::Store`].

use std::collections::HashMap;
use std::sync::Arc;

/// Anything the LRU can account for
pub trait Value {
    /// Size in bytes charged against the budget
    fn len(&self) -> usize;
}

/// Eviction callback, invoked with the removed key and value
pub type OnEvicted<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

struct Node<V> {
    key: String,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Byte-bounded LRU cache
pub struct LruCache<V: Value> {
    /// Maximum accounted bytes (0 = unbounded)
    max_bytes: u64,
    /// Currently accounted bytes
    nbytes: u64,
    slots: Vec<Option<Node<V>>>,
    free: Vec<usize>,
    index: HashMap<String, usize>,
    head: Option<usize>,
    tail: Option<usize>,
    on_evicted: Option<OnEvicted<V>>,
}

impl<V: Value> LruCache<V> {
    /// Create a cache holding at most `max_bytes` (0 = unbounded)
    pub fn new(max_bytes: u64, on_evicted: Option<OnEvicted<V>>) -> Self {
        Self {
            max_bytes,
            nbytes: 0,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
            on_evicted,
        }
    }

    /// Look up a key and mark it most recently used
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.move_to_front(idx);
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Look up a key without touching recency
    pub fn peek(&self, key: &str) -> Option<&V> {
        let idx = *self.index.get(key)?;
        self.slots[idx].as_ref().map(|n| &n.value)
    }

    /// Insert or replace a value, then evict until within budget
    pub fn add(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        if let Some(&idx) = self.index.get(&key) {
            self.move_to_front(idx);
            if let Some(node) = self.slots[idx].as_mut() {
                let old_len = node.value.len() as u64;
                self.nbytes = self.nbytes - old_len + value.len() as u64;
                node.value = value;
            }
        } else {
            self.nbytes += (key.len() + value.len()) as u64;
            let idx = self.alloc(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.push_front(idx);
            self.index.insert(key, idx);
        }

        while self.max_bytes != 0 && self.nbytes > self.max_bytes {
            if self.remove_oldest().is_none() {
                break;
            }
        }
    }

    /// Remove a specific key, returning its value
    ///
    /// Explicit removal does not fire the eviction callback.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let idx = self.index.remove(key)?;
        let node = self.detach(idx)?;
        self.nbytes -= (node.key.len() + node.value.len()) as u64;
        Some(node.value)
    }

    /// Evict the least recently used entry
    pub fn remove_oldest(&mut self) -> Option<(String, V)> {
        let idx = self.tail?;
        let node = self.detach(idx)?;
        self.index.remove(&node.key);
        self.nbytes -= (node.key.len() + node.value.len()) as u64;
        if let Some(cb) = &self.on_evicted {
            cb(&node.key, &node.value);
        }
        Some((node.key, node.value))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Accounted bytes
    pub fn bytes(&self) -> u64 {
        self.nbytes
    }

    /// Configured budget
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.slots[idx].as_ref() else {
                break;
            };
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }

    // -------------------------------------------------------------------------
    // List plumbing
    // -------------------------------------------------------------------------

    fn alloc(&mut self, node: Node<V>) -> usize {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(node);
                idx
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = match self.slots[idx].as_ref() {
            Some(n) => (n.prev, n.next),
            None => return,
        };
        match prev {
            Some(p) => {
                if let Some(n) = self.slots[p].as_mut() {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.slots[nx].as_mut() {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(n) = self.slots[idx].as_mut() {
            n.prev = None;
            n.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(n) = self.slots[h].as_mut() {
                n.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn move_to_front(&mut self, idx: usize) {
        if self.head == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_front(idx);
    }

    fn detach(&mut self, idx: usize) -> Option<Node<V>> {
        self.unlink(idx);
        let node = self.slots[idx].take()?;
        self.free.push(idx);
        Some(node)
    }
}

impl<V: Value> std::fmt::Debug for LruCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("max_bytes", &self.max_bytes)
            .field("nbytes", &self.nbytes)
            .field("len", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    struct Text(String);

    impl Value for Text {
        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn text(s: &str) -> Text {
        Text(s.to_string())
    }

    #[test]
    fn test_get_hit_and_miss() {
        let mut lru = LruCache::new(0, None);
        lru.add("key1", text("1234"));

        assert_eq!(lru.get("key1"), Some(&text("1234")));
        assert!(lru.get("key2").is_none());
    }

    #[test]
    fn test_remove_oldest_when_over_budget() {
        let (k1, k2, k3) = ("key1", "key2", "k3");
        let (v1, v2, v3) = ("value1", "value2", "v3");
        let cap = (k1.len() + k2.len() + v1.len() + v2.len()) as u64;

        let mut lru = LruCache::new(cap, None);
        lru.add(k1, text(v1));
        lru.add(k2, text(v2));
        lru.add(k3, text(v3));

        assert!(lru.get(k1).is_none());
        assert_eq!(lru.len(), 2);
        assert!(lru.bytes() <= cap);
    }

    #[test]
    fn test_access_promotes_entry() {
        // Budget fits exactly "a"+"1" and "b"+"2"
        let mut lru = LruCache::new(4, None);
        lru.add("a", text("1"));
        lru.add("b", text("2"));
        assert!(lru.get("a").is_some());
        lru.add("c", text("3"));

        assert!(lru.peek("a").is_some(), "recently used entry must survive");
        assert!(lru.peek("b").is_none(), "least recently used entry must go");
        assert!(lru.peek("c").is_some());
    }

    #[test]
    fn test_replace_adjusts_size_by_delta() {
        let mut lru = LruCache::new(0, None);
        lru.add("key", text("abc"));
        assert_eq!(lru.bytes(), 6);

        lru.add("key", text("abcdefg"));
        assert_eq!(lru.bytes(), 10);
        assert_eq!(lru.len(), 1);

        lru.add("key", text("a"));
        assert_eq!(lru.bytes(), 4);
    }

    #[test]
    fn test_replace_promotes_entry() {
        let mut lru = LruCache::new(0, None);
        lru.add("a", text("1"));
        lru.add("b", text("2"));
        lru.add("a", text("3"));

        assert_eq!(lru.keys(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_on_evicted_callback() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = evicted.clone();
        let cb: OnEvicted<Text> = Arc::new(move |key: &str, _value: &Text| {
            sink.lock().push(key.to_string());
        });

        let mut lru = LruCache::new(10, Some(cb));
        lru.add("key1", text("123456"));
        lru.add("k2", text("k2"));
        lru.add("k3", text("k3"));
        lru.add("k4", text("k4"));

        assert_eq!(*evicted.lock(), vec!["key1".to_string(), "k2".to_string()]);
    }

    #[test]
    fn test_zero_budget_never_evicts() {
        let mut lru = LruCache::new(0, None);
        for i in 0..1000 {
            lru.add(format!("key-{}", i), text("some value"));
        }
        assert_eq!(lru.len(), 1000);
    }

    #[test]
    fn test_oversized_entry_is_evicted_immediately() {
        let mut lru = LruCache::new(4, None);
        lru.add("big", text("far too large"));
        assert!(lru.is_empty());
        assert_eq!(lru.bytes(), 0);
    }

    #[test]
    fn test_explicit_remove() {
        let mut lru = LruCache::new(0, None);
        lru.add("a", text("1"));
        lru.add("b", text("22"));

        assert_eq!(lru.remove("a"), Some(text("1")));
        assert_eq!(lru.remove("a"), None);
        assert_eq!(lru.bytes(), 3);
        assert_eq!(lru.keys(), vec!["b".to_string()]);
    }

    #[test]
    fn test_remove_oldest_on_empty_is_none() {
        let mut lru: LruCache<Text> = LruCache::new(0, None);
        assert!(lru.remove_oldest().is_none());
    }

    #[test]
    fn test_slots_are_reused() {
        let mut lru = LruCache::new(4, None);
        for i in 0..100 {
            lru.add(format!("{}", i % 10), text("x"));
        }
        assert!(lru.slots.len() <= 3);
    }
}
