//! Group Statistics
//!
//! Lock-free counters describing how a group answers requests.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Per-group counters
#[derive(Debug, Default)]
pub struct GroupStats {
    /// Any Get request, including those from peers
    gets: AtomicU64,
    /// Served from the local store
    cache_hits: AtomicU64,
    /// Served by a remote peer
    peer_loads: AtomicU64,
    /// Remote fetches that failed
    peer_errors: AtomicU64,
    /// Misses that went through the deduplicator
    loads: AtomicU64,
    /// Misses answered by another caller's in-flight load
    loads_deduped: AtomicU64,
    /// Successful loader calls
    local_loads: AtomicU64,
    /// Failed loader calls
    local_load_errors: AtomicU64,
    /// Gets that arrived over the peer transport
    server_requests: AtomicU64,
    /// Rejected requests (empty key)
    invalid_requests: AtomicU64,
}

/// Point-in-time copy of [`GroupStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupStatsSnapshot {
    pub gets: u64,
    pub cache_hits: u64,
    pub peer_loads: u64,
    pub peer_errors: u64,
    pub loads: u64,
    pub loads_deduped: u64,
    pub local_loads: u64,
    pub local_load_errors: u64,
    pub server_requests: u64,
    pub invalid_requests: u64,
}

impl GroupStatsSnapshot {
    /// Fraction of gets answered from the local store
    pub fn hit_ratio(&self) -> f64 {
        if self.gets == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.gets as f64
        }
    }
}

impl GroupStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_load(&self) {
        self.peer_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_error(&self) {
        self.peer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_deduped(&self) {
        self.loads_deduped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load(&self) {
        self.local_loads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_load_error(&self) {
        self.local_load_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_server_request(&self) {
        self.server_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid_request(&self) {
        self.invalid_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy all counters
    pub fn snapshot(&self) -> GroupStatsSnapshot {
        GroupStatsSnapshot {
            gets: self.gets.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            peer_loads: self.peer_loads.load(Ordering::Relaxed),
            peer_errors: self.peer_errors.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            loads_deduped: self.loads_deduped.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            local_load_errors: self.local_load_errors.load(Ordering::Relaxed),
            server_requests: self.server_requests.load(Ordering::Relaxed),
            invalid_requests: self.invalid_requests.load(Ordering::Relaxed),
        }
    }
}
