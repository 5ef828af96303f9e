//! meshcache Integration Tests
//!
//! Multi-node scenarios over real HTTP on ephemeral ports:
//! - Ownership: every key is loaded by exactly one node
//! - Transport: status codes, escaping, remote error propagation
//! - Degradation: unreachable owners, fallback vs fail-fast
//! - Coalescing: concurrent misses across the network

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use meshcache::{
    loader_fn, Error, Group, GroupConfig, GroupRegistry, HttpPool, PeerFailurePolicy, PeerPicker,
    PoolConfig,
};

// =============================================================================
// Cluster Harness
// =============================================================================

type Calls = Arc<Mutex<HashMap<String, usize>>>;

struct Node {
    addr: String,
    pool: Arc<HttpPool>,
    group: Arc<Group>,
    calls: Calls,
}

impl Node {
    fn loads(&self, key: &str) -> usize {
        self.calls.lock().get(key).copied().unwrap_or(0)
    }
}

/// Scores table; dot keys and keys prefixed with `echo:` load as themselves
fn lookup(key: &str) -> Option<Vec<u8>> {
    match key {
        "Tom" => Some(b"630".to_vec()),
        "Jack" => Some(b"589".to_vec()),
        "Sam" => Some(b"567".to_vec()),
        "." | ".." | "%2e" => Some(key.as_bytes().to_vec()),
        k if k.starts_with("echo:") => Some(k.as_bytes().to_vec()),
        _ => None,
    }
}

fn new_group(registry: &GroupRegistry, policy: PeerFailurePolicy, delay: Duration) -> (Arc<Group>, Calls) {
    let calls: Calls = Arc::default();
    let counter = calls.clone();
    let loader = loader_fn(move |key: String| {
        let counter = counter.clone();
        async move {
            *counter.lock().entry(key.clone()).or_insert(0) += 1;
            tokio::time::sleep(delay).await;
            lookup(&key).ok_or_else(|| Error::loader(format!("{} not exist", key)))
        }
    });
    let config = GroupConfig {
        peer_failure_policy: policy,
        ..GroupConfig::default()
    };
    let group = registry
        .new_group("scores", config, Arc::new(loader))
        .unwrap();
    (group, calls)
}

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = format!("http://{}", listener.local_addr().unwrap());
    (listener, addr)
}

/// Address of a port nobody listens on
fn dead_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://{}", listener.local_addr().unwrap())
}

fn pool_config() -> PoolConfig {
    PoolConfig {
        fetch_timeout: Duration::from_secs(2),
        ..PoolConfig::default()
    }
}

async fn start_cluster(n: usize, policy: PeerFailurePolicy, delay: Duration) -> Vec<Node> {
    let mut listeners = Vec::new();
    for _ in 0..n {
        listeners.push(bind().await);
    }
    let addrs: Vec<String> = listeners.iter().map(|(_, a)| a.clone()).collect();

    let mut nodes = Vec::new();
    for (listener, addr) in listeners {
        let registry = Arc::new(GroupRegistry::new());
        let (group, calls) = new_group(&registry, policy, delay);
        let pool = Arc::new(HttpPool::new(&addr, pool_config(), registry).unwrap());
        pool.set(&addrs);
        group.register_peers(pool.clone()).unwrap();
        tokio::spawn(pool.clone().serve(listener));
        nodes.push(Node {
            addr,
            pool,
            group,
            calls,
        });
    }
    nodes
}

/// A single node whose membership also names an unreachable peer
async fn start_with_dead_peer(policy: PeerFailurePolicy) -> Node {
    let (listener, addr) = bind().await;
    let registry = Arc::new(GroupRegistry::new());
    let (group, calls) = new_group(&registry, policy, Duration::ZERO);
    let pool = Arc::new(HttpPool::new(&addr, pool_config(), registry).unwrap());
    pool.set(&[addr.clone(), dead_addr()]);
    group.register_peers(pool.clone()).unwrap();
    tokio::spawn(pool.clone().serve(listener));
    Node {
        addr,
        pool,
        group,
        calls,
    }
}

/// First `echo:` key the node routes to a remote peer
fn remote_key(node: &Node) -> String {
    (0..10_000)
        .map(|i| format!("echo:{}", i))
        .find(|k| node.pool.pick_peer(k).is_some())
        .expect("some key must be owned remotely")
}

/// Index of the node that owns `key`
fn owner_of(nodes: &[Node], key: &str) -> usize {
    let owner = nodes[0]
        .pool
        .pick_peer(key)
        .map(|p| p.addr().to_string())
        .unwrap_or_else(|| nodes[0].addr.clone());
    nodes.iter().position(|n| n.addr == owner).unwrap()
}

// =============================================================================
// Ownership
// =============================================================================

mod ownership_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_each_key_loaded_once_cluster_wide() {
        let nodes = start_cluster(3, PeerFailurePolicy::FallbackToLocal, Duration::ZERO).await;

        for (key, value) in [("Tom", "630"), ("Jack", "589"), ("Sam", "567")] {
            for node in &nodes {
                let view = node.group.get(key).await.unwrap();
                assert_eq!(view.to_string(), value, "{} via {}", key, node.addr);
            }

            let total: usize = nodes.iter().map(|n| n.loads(key)).sum();
            assert_eq!(total, 1, "{} must be loaded exactly once", key);
            assert_eq!(nodes[owner_of(&nodes, key)].loads(key), 1);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_node_agrees_on_owner() {
        let nodes = start_cluster(3, PeerFailurePolicy::FallbackToLocal, Duration::ZERO).await;

        for i in 0..100 {
            let key = format!("echo:{}", i);
            let owner = owner_of(&nodes, &key);
            for (idx, node) in nodes.iter().enumerate() {
                match node.pool.pick_peer(&key) {
                    Some(peer) => assert_eq!(peer.addr(), nodes[owner].addr),
                    None => assert_eq!(idx, owner),
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remote_value_not_stored_by_requester() {
        let nodes = start_cluster(2, PeerFailurePolicy::FallbackToLocal, Duration::ZERO).await;
        let key = remote_key(&nodes[0]);

        let view = nodes[0].group.get(&key).await.unwrap();
        assert_eq!(view.to_string(), key);

        assert_eq!(nodes[0].group.cache_len(), 0);
        assert_eq!(nodes[1].group.cache_len(), 1);
        assert_eq!(nodes[0].group.stats().peer_loads, 1);
        assert_eq!(nodes[1].group.stats().server_requests, 1);
    }
}

// =============================================================================
// Transport
// =============================================================================

mod transport_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_keys_needing_escape() {
        let nodes = start_cluster(2, PeerFailurePolicy::FailFast, Duration::ZERO).await;

        for raw in ["a/b c", "q?x=1&y=2", "pct%20", "ünïcødé"] {
            let key = format!("echo:{}", raw);
            for node in &nodes {
                let view = node.group.get(&key).await.unwrap();
                assert_eq!(view.to_string(), key);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dot_keys_cross_the_wire() {
        let nodes = start_cluster(2, PeerFailurePolicy::FailFast, Duration::ZERO).await;
        let keys = [".", "..", "%2e"];

        for key in keys {
            for node in &nodes {
                let view = node.group.get(key).await.unwrap();
                assert_eq!(view.to_string(), key, "{:?} via {}", key, node.addr);
            }

            let total: usize = nodes.iter().map(|n| n.loads(key)).sum();
            assert_eq!(total, 1, "{:?} must be loaded exactly once", key);
            assert_eq!(nodes[owner_of(&nodes, key)].loads(key), 1);
        }

        // With two nodes each key is remote for exactly one of them
        let peer_loads: u64 = nodes.iter().map(|n| n.group.stats().peer_loads).sum();
        assert_eq!(peer_loads, keys.len() as u64);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_remote_loader_error_propagates() {
        let nodes = start_cluster(2, PeerFailurePolicy::FailFast, Duration::ZERO).await;
        let key = (0..10_000)
            .map(|i| format!("missing-{}", i))
            .find(|k| nodes[0].pool.pick_peer(k).is_some())
            .unwrap();

        let err = nodes[0].group.get(&key).await.unwrap_err();
        assert_matches!(
            err,
            Error::PeerStatus { status: 500, ref body } if *body == format!("{} not exist", key)
        );
    }

    #[tokio::test]
    async fn test_http_status_codes() {
        let nodes = start_cluster(1, PeerFailurePolicy::FallbackToLocal, Duration::ZERO).await;
        let base = format!("{}/_meshcache", nodes[0].addr);
        let client = reqwest::Client::new();

        let ok = client.get(format!("{}/scores/Tom", base)).send().await.unwrap();
        assert_eq!(ok.status(), 200);
        assert_eq!(
            ok.headers()["content-type"].to_str().unwrap(),
            "application/octet-stream"
        );
        assert_eq!(ok.bytes().await.unwrap().as_ref(), b"630");

        let missing_group = client.get(format!("{}/nope/Tom", base)).send().await.unwrap();
        assert_eq!(missing_group.status(), 404);

        let bad = client.get(format!("{}/scores", base)).send().await.unwrap();
        assert_eq!(bad.status(), 400);

        let failed = client.get(format!("{}/scores/kkk", base)).send().await.unwrap();
        assert_eq!(failed.status(), 500);
        assert_eq!(failed.text().await.unwrap(), "kkk not exist");
    }
}

// =============================================================================
// Degradation
// =============================================================================

mod degradation_tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_owner_falls_back_to_loader() {
        let node = start_with_dead_peer(PeerFailurePolicy::FallbackToLocal).await;
        let key = remote_key(&node);

        let view = node.group.get(&key).await.unwrap();
        assert_eq!(view.to_string(), key);
        assert_eq!(node.loads(&key), 1);

        let stats = node.group.stats();
        assert_eq!(stats.peer_errors, 1);
        assert_eq!(stats.local_loads, 1);

        // Now cached locally, so the dead peer is not asked again
        node.group.get(&key).await.unwrap();
        assert_eq!(node.group.stats().peer_errors, 1);
    }

    #[tokio::test]
    async fn test_unreachable_owner_fail_fast() {
        let node = start_with_dead_peer(PeerFailurePolicy::FailFast).await;
        let key = remote_key(&node);

        let err = node.group.get(&key).await.unwrap_err();
        assert!(err.is_peer_error(), "unexpected error: {}", err);
        assert_eq!(node.loads(&key), 0);
    }
}

// =============================================================================
// Coalescing
// =============================================================================

mod coalescing_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_remote_misses_load_once() {
        let nodes = start_cluster(
            2,
            PeerFailurePolicy::FallbackToLocal,
            Duration::from_millis(300),
        )
        .await;
        let key = remote_key(&nodes[0]);
        let group = nodes[0].group.clone();

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let group = group.clone();
                let key = key.clone();
                tokio::spawn(async move { group.get(&key).await })
            })
            .collect();

        for h in handles {
            assert_eq!(h.await.unwrap().unwrap().to_string(), key);
        }

        assert_eq!(nodes[1].loads(&key), 1);
        assert_eq!(nodes[0].loads(&key), 0);
        assert_eq!(nodes[0].group.stats().peer_loads, 1);
        assert_eq!(nodes[1].group.stats().server_requests, 1);
    }
}
