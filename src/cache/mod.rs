//! Local Cache Domain
//!
//! The byte-bounded, least-recently-used store each group keeps in memory.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │ Store (parking_lot::Mutex, lazily allocated)  │
//! │   └── LruCache<ByteView>                      │
//! │         ├── index: key -> slot                │
//! │         └── recency list (MRU ... LRU)        │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Values are [`ByteView`]s: immutable, cheaply cloned, copied out on demand.

mod byteview;
mod lru;
mod store;

#[cfg(test)]
mod proptest;

pub use byteview::ByteView;
pub use lru::{LruCache, OnEvicted, Value};
pub use store::Store;

/// Default per-group budget (64 MiB)
pub const DEFAULT_CACHE_BYTES: u64 = 64 * 1024 * 1024;
