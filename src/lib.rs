//! meshcache - Distributed Read-Through Cache
//!
//! A peer-to-peer, in-memory, read-through cache. Each node keeps a
//! byte-bounded LRU per named group, routes every key to exactly one owning
//! node with a consistent hash ring, and collapses concurrent misses for the
//! same key into a single load.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           Node                                   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │    Group     │───▶│ SingleFlight │───▶│    Loader    │       │
//! │  │ (Store/LRU)  │    │   (dedup)    │    │ (user data)  │       │
//! │  └──────┬───────┘    └──────┬───────┘    └──────────────┘       │
//! │         │                   │                                    │
//! │         │            ┌──────▼───────┐          HTTP              │
//! │         └───────────▶│   HttpPool   │◀──────────────────▶ peers │
//! │                      │ (Ring + srv) │                            │
//! │                      └──────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Byte-bounded LRU store and immutable values
//! - [`error`] - Error types
//! - [`group`] - Group orchestration, loaders and the group registry
//! - [`metrics`] - Prometheus exposition of group statistics
//! - [`peers`] - Peer selection and HTTP transport
//! - [`ring`] - Consistent hash ring
//! - [`singleflight`] - Concurrent call deduplication

pub mod cache;
pub mod error;
pub mod group;
pub mod metrics;
pub mod peers;
pub mod ring;
pub mod singleflight;

// Re-export commonly used types
pub use cache::ByteView;
pub use error::{Error, Result};
pub use group::{loader_fn, Group, GroupConfig, GroupRegistry, Loader, PeerFailurePolicy};
pub use peers::{HttpGetter, HttpPool, PeerGetter, PeerPicker, PoolConfig};
pub use ring::Ring;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
