//! Peer Locator and Transport
//!
//! A group asks a [`PeerPicker`] which node owns a key; if that node is
//! someone else, it fetches through the returned [`PeerGetter`].
//!
//! ```text
//!   Group ──pick_peer(key)──► PeerPicker (HttpPool + Ring)
//!     │                              │
//!     │◄──── Arc<dyn PeerGetter> ────┘
//!     │
//!     └──get(group, key)──► HttpGetter ──HTTP GET──► owner node
//! ```

mod client;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

pub use client::HttpGetter;
pub use http::{HttpPool, PoolConfig, DEFAULT_BASE_PATH};

/// Locates the peer that owns a key
pub trait PeerPicker: Send + Sync {
    /// Returns the owning peer, or `None` when the key belongs to this node
    /// or no membership is configured.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>>;
}

/// Fetches a value from a remote node
#[async_trait]
pub trait PeerGetter: Send + Sync {
    /// Ask the remote node to run `Get(key)` in `group`
    async fn get(&self, group: &str, key: &str) -> Result<Bytes>;

    /// Address of the remote node, for logging
    fn addr(&self) -> &str;
}
