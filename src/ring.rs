//! Consistent Hash Ring
//!
//! Maps keys to node identifiers using consistent hashing with virtual
//! replicas.
//!
//! # Design
//!
//! ```text
//!            0 ──────────────────────────────► u32::MAX
//!   hashes:  [ 12, 905, 4_411, ..., 3_901_020_113 ]   (sorted)
//!             │    │     │
//!             ▼    ▼     ▼
//!   owners:  "B"  "A"   "C"   ...
//! ```
//!
//! - Each real node is placed `replicas` times at `hash("{i}{node}")`.
//! - A key is owned by the first virtual node whose hash is >= the key's
//!   hash, wrapping to the start of the ring.
//! - The ring is built once and then only read; membership changes build a
//!   new ring and swap it in.

use std::collections::HashMap;

/// Hash function used for both virtual nodes and lookup keys
pub type HashFn = fn(&[u8]) -> u32;

/// Default virtual replicas per node
pub const DEFAULT_REPLICAS: usize = 50;

/// Consistent hash ring
#[derive(Clone)]
pub struct Ring {
    hash: HashFn,
    replicas: usize,
    /// Sorted virtual node hashes
    keys: Vec<u32>,
    /// Virtual node hash -> real node
    owners: HashMap<u32, String>,
}

impl Ring {
    /// Create an empty ring. `hash` defaults to CRC32 (IEEE).
    pub fn new(replicas: usize, hash: Option<HashFn>) -> Self {
        Self {
            hash: hash.unwrap_or(crc32fast::hash),
            replicas,
            keys: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Place nodes on the ring
    pub fn add<S: AsRef<str>>(&mut self, nodes: &[S]) {
        for node in nodes {
            let node = node.as_ref();
            for i in 0..self.replicas {
                let virtual_key = format!("{}{}", i, node);
                let hash = (self.hash)(virtual_key.as_bytes());
                self.keys.push(hash);
                self.owners.insert(hash, node.to_string());
            }
        }
        self.keys.sort_unstable();
    }

    /// Node responsible for `key`, or `None` when the ring is empty
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let hash = (self.hash)(key.as_bytes());
        let idx = self.keys.partition_point(|&k| k < hash);
        let vnode = self.keys[idx % self.keys.len()];
        self.owners.get(&vnode).map(String::as_str)
    }

    /// Check if no nodes have been added
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Number of virtual nodes
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Distinct real nodes, sorted
    pub fn nodes(&self) -> Vec<String> {
        let mut nodes: Vec<String> = self.owners.values().cloned().collect();
        nodes.sort();
        nodes.dedup();
        nodes
    }
}

impl std::fmt::Debug for Ring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ring")
            .field("replicas", &self.replicas)
            .field("virtual_nodes", &self.keys.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
