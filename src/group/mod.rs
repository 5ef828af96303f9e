//! Group - Cache Namespace Orchestration
//!
//! A group owns one local store, one deduplicator and one loader, and may be
//! attached to a peer picker. `get` walks the read path:
//!
//! ```text
//! get(key)
//!   ├─ empty key ─────────────────────────────► Err(InvalidKey)
//!   ├─ local store hit ───────────────────────► value
//!   └─ miss ─► SingleFlight::work(key)
//!                ├─ pick_peer(key) = remote ─► fetch from peer ─► value (not stored)
//!                │        └─ fetch failed ──► fall through (or fail fast)
//!                └─ loader.load(key) ────────► store locally ─► value
//! ```
//!
//! Every caller waiting on the same key receives the same outcome.

mod loader;
mod registry;
mod stats;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::cache::{ByteView, Store, DEFAULT_CACHE_BYTES};
use crate::error::{Error, Result};
use crate::peers::{PeerGetter, PeerPicker};
use crate::singleflight::SingleFlight;

pub use loader::{loader_fn, Loader, LoaderFn};
pub use registry::GroupRegistry;
pub use stats::{GroupStats, GroupStatsSnapshot};

/// What to do when the owning peer cannot be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PeerFailurePolicy {
    /// Log the peer error and load locally instead
    #[default]
    FallbackToLocal,
    /// Surface the peer error to the caller
    FailFast,
}

/// Group configuration
#[derive(Debug, Clone)]
pub struct GroupConfig {
    /// Local store budget in bytes (0 = unbounded)
    pub cache_bytes: u64,
    /// Behaviour on remote fetch failure
    pub peer_failure_policy: PeerFailurePolicy,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            cache_bytes: DEFAULT_CACHE_BYTES,
            peer_failure_policy: PeerFailurePolicy::FallbackToLocal,
        }
    }
}

impl GroupConfig {
    /// Default configuration with a specific budget
    pub fn with_cache_bytes(cache_bytes: u64) -> Self {
        Self {
            cache_bytes,
            ..Self::default()
        }
    }
}

/// A named cache namespace
pub struct Group {
    name: String,
    loader: Arc<dyn Loader>,
    main_cache: Store,
    peers: OnceCell<Arc<dyn PeerPicker>>,
    flight: SingleFlight<Result<ByteView>>,
    stats: GroupStats,
    config: GroupConfig,
}

impl Group {
    /// Create a group. Register it with a [`GroupRegistry`] to make it
    /// reachable from peers.
    pub fn new(name: impl Into<String>, config: GroupConfig, loader: Arc<dyn Loader>) -> Self {
        Self {
            name: name.into(),
            loader,
            main_cache: Store::new(config.cache_bytes),
            peers: OnceCell::new(),
            flight: SingleFlight::new(),
            stats: GroupStats::new(),
            config,
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach the peer picker. Only one may ever be attached.
    pub fn register_peers(&self, peers: Arc<dyn PeerPicker>) -> Result<()> {
        self.peers
            .set(peers)
            .map_err(|_| Error::PeersAlreadyRegistered(self.name.clone()))?;
        info!("Registered peers for group {}", self.name);
        Ok(())
    }

    /// Whether a peer picker is attached
    pub fn has_peers(&self) -> bool {
        self.peers.get().is_some()
    }

    /// Look up `key`, loading it from a peer or the loader on a miss
    #[instrument(skip(self), fields(group = %self.name))]
    pub async fn get(&self, key: &str) -> Result<ByteView> {
        self.stats.record_get();
        if key.is_empty() {
            self.stats.record_invalid_request();
            return Err(Error::InvalidKey);
        }

        if let Some(value) = self.main_cache.get(key) {
            self.stats.record_cache_hit();
            debug!("Cache hit for {}", key);
            return Ok(value);
        }

        self.load(key).await
    }

    async fn load(&self, key: &str) -> Result<ByteView> {
        self.stats.record_load();
        let shared = self.flight.work(key, || self.load_once(key)).await;
        if shared.deduped {
            self.stats.record_load_deduped();
        }
        shared.value
    }

    /// Runs inside the deduplicator, at most once at a time per key
    async fn load_once(&self, key: &str) -> Result<ByteView> {
        if let Some(peer) = self.peers.get().and_then(|p| p.pick_peer(key)) {
            match self.get_from_peer(peer.as_ref(), key).await {
                Ok(value) => {
                    self.stats.record_peer_load();
                    return Ok(value);
                }
                Err(e) => {
                    self.stats.record_peer_error();
                    if self.config.peer_failure_policy == PeerFailurePolicy::FailFast {
                        warn!("Failed to get {} from peer {}: {}", key, peer.addr(), e);
                        return Err(e);
                    }
                    warn!(
                        "Failed to get {} from peer {}, loading locally: {}",
                        key,
                        peer.addr(),
                        e
                    );
                }
            }
        }

        self.get_locally(key).await
    }

    async fn get_from_peer(&self, peer: &dyn PeerGetter, key: &str) -> Result<ByteView> {
        let bytes = peer.get(&self.name, key).await?;
        debug!("Fetched {} from peer {}", key, peer.addr());
        Ok(ByteView::from(bytes))
    }

    async fn get_locally(&self, key: &str) -> Result<ByteView> {
        match self.loader.load(key).await {
            Ok(bytes) => {
                // The loader handed over ownership, so nobody else can mutate it.
                let value = ByteView::from(bytes);
                self.populate_cache(key, value.clone());
                self.stats.record_local_load();
                info!("Loaded {} locally ({} bytes)", key, value.len());
                Ok(value)
            }
            Err(e) => {
                self.stats.record_local_load_error();
                debug!("Loader failed for {}: {}", key, e);
                Err(e)
            }
        }
    }

    fn populate_cache(&self, key: &str, value: ByteView) {
        self.main_cache.add(key, value);
    }

    /// Counter snapshot
    pub fn stats(&self) -> GroupStatsSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn record_server_request(&self) {
        self.stats.record_server_request();
    }

    /// Entries in the local store
    pub fn cache_len(&self) -> usize {
        self.main_cache.len()
    }

    /// Accounted bytes in the local store
    pub fn cache_bytes(&self) -> u64 {
        self.main_cache.bytes()
    }

    /// Evictions from the local store
    pub fn cache_evictions(&self) -> u64 {
        self.main_cache.evictions()
    }
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("has_peers", &self.has_peers())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
