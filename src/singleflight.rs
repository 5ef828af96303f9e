//! Call Deduplication
//!
//! Collapses concurrent requests for the same key into one execution.
//!
//! The first caller for a key (the leader) registers an in-flight entry and
//! runs the producer inline. Callers that arrive while it runs (followers)
//! wait on the entry and receive a clone of the leader's result. The entry is
//! removed as soon as the producer finishes, so a later call runs fresh.
//!
//! If a leader is dropped before finishing, its guard removes the entry and
//! closes the channel; a waiting follower then retries and becomes the new
//! leader, so nobody waits on a result that will never come.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

type Ledger<T> = Arc<Mutex<HashMap<String, watch::Receiver<Option<T>>>>>;

/// Per-key duplicate call suppression
pub struct SingleFlight<T> {
    calls: Ledger<T>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
        }
    }
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight")
            .field("in_flight", &self.calls.lock().len())
            .finish()
    }
}

/// Outcome of a [`SingleFlight::work`] call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shared<T> {
    /// The producer's result
    pub value: T,
    /// True when this caller waited on another caller's producer
    pub deduped: bool,
}

enum Role<T> {
    Leader(LeaderGuard<T>),
    Follower(watch::Receiver<Option<T>>),
}

/// Removes the ledger entry when the leader finishes or is dropped.
struct LeaderGuard<T> {
    key: String,
    tx: watch::Sender<Option<T>>,
    calls: Ledger<T>,
}

impl<T> Drop for LeaderGuard<T> {
    fn drop(&mut self) {
        let mut calls = self.calls.lock();
        let ours = calls
            .get(&self.key)
            .is_some_and(|rx| rx.same_channel(&self.tx.subscribe()));
        if ours {
            calls.remove(&self.key);
        }
    }
}

impl<T: Clone> SingleFlight<T> {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `producer` for `key` unless a call is already in flight, in which
    /// case wait for it and share its result.
    pub async fn work<F, Fut>(&self, key: &str, producer: F) -> Shared<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = loop {
            match self.join(key) {
                Role::Leader(guard) => break guard,
                Role::Follower(mut rx) => {
                    let outcome = rx
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|v| v.clone());
                    if let Some(value) = outcome {
                        return Shared {
                            value,
                            deduped: true,
                        };
                    }
                    // Leader dropped without a result; retry and maybe lead.
                    tracing::debug!("in-flight call for {} abandoned, retrying", key);
                }
            }
        };

        let value = producer().await;
        guard.tx.send_replace(Some(value.clone()));
        drop(guard);
        Shared {
            value,
            deduped: false,
        }
    }

    /// Number of keys with a call in flight
    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    fn join(&self, key: &str) -> Role<T> {
        let mut calls = self.calls.lock();
        if let Some(rx) = calls.get(key) {
            if rx.has_changed().is_ok() {
                return Role::Follower(rx.clone());
            }
        }
        let (tx, rx) = watch::channel(None);
        calls.insert(key.to_string(), rx);
        Role::Leader(LeaderGuard {
            key: key.to_string(),
            tx,
            calls: self.calls.clone(),
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
