//! HTTP Peer Pool
//!
//! One [`HttpPool`] per node plays both sides of the peer protocol:
//!
//! - **Locator**: holds the hash ring and one [`HttpGetter`] per remote node,
//!   and answers [`PeerPicker::pick_peer`].
//! - **Server**: answers `GET <base_path><group>/<key>` by running the named
//!   group's `get` and writing the raw value bytes.
//!
//! ```text
//!   GET /_meshcache/scores/Tom
//!         │          │     │
//!         base_path  group key (percent-escaped)
//! ```

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tracing::{debug, error, info, instrument};

use super::client::{peer_client, HttpGetter, PeerClient};
use super::{PeerGetter, PeerPicker};
use crate::error::{Error, Result};
use crate::group::GroupRegistry;
use crate::ring::{Ring, DEFAULT_REPLICAS};

/// Default path prefix for peer traffic
pub const DEFAULT_BASE_PATH: &str = "/_meshcache/";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the peer pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Path prefix for peer requests
    pub base_path: String,

    /// Virtual replicas per node on the ring
    pub replicas: usize,

    /// Timeout for a single remote fetch
    pub fetch_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_string(),
            replicas: DEFAULT_REPLICAS,
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Ring and getters, always replaced together
#[derive(Default)]
struct Membership {
    ring: Option<Ring>,
    getters: HashMap<String, Arc<HttpGetter>>,
}

// =============================================================================
// Pool
// =============================================================================

/// Peer locator and peer-protocol server for one node
pub struct HttpPool {
    self_addr: String,
    base_path: String,
    replicas: usize,
    fetch_timeout: Duration,
    client: PeerClient,
    registry: Arc<GroupRegistry>,
    membership: Mutex<Membership>,
}

impl HttpPool {
    /// Create a pool for the node reachable at `self_addr`
    pub fn new(
        self_addr: impl Into<String>,
        config: PoolConfig,
        registry: Arc<GroupRegistry>,
    ) -> Result<Self> {
        if config.replicas == 0 {
            return Err(Error::Config("replicas must be at least 1".to_string()));
        }

        Ok(Self {
            self_addr: self_addr.into(),
            base_path: normalize_base_path(&config.base_path),
            replicas: config.replicas,
            fetch_timeout: config.fetch_timeout,
            client: peer_client(),
            registry,
            membership: Mutex::new(Membership::default()),
        })
    }

    /// This node's address
    pub fn self_addr(&self) -> &str {
        &self.self_addr
    }

    /// Replace the membership. `peers` should include this node's own
    /// address so it takes its share of the keyspace.
    pub fn set<S: AsRef<str>>(&self, peers: &[S]) {
        let mut ring = Ring::new(self.replicas, None);
        ring.add(peers);

        let getters = peers
            .iter()
            .map(|peer| {
                let peer = peer.as_ref();
                let getter = HttpGetter::new(
                    peer,
                    &self.base_path,
                    self.client.clone(),
                    self.fetch_timeout,
                );
                (peer.to_string(), Arc::new(getter))
            })
            .collect();

        *self.membership.lock() = Membership {
            ring: Some(ring),
            getters,
        };
        info!("[server {}] membership set to {} peers", self.self_addr, peers.len());
    }

    /// Current membership, sorted
    pub fn peers(&self) -> Vec<String> {
        self.membership
            .lock()
            .ring
            .as_ref()
            .map(Ring::nodes)
            .unwrap_or_default()
    }

    /// Serve one peer request
    #[instrument(skip_all, fields(server = %self.self_addr, path = %req.uri().path()))]
    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        debug!("{} {}", req.method(), req.uri().path());

        let Some(rest) = req.uri().path().strip_prefix(self.base_path.as_str()) else {
            return text_response(StatusCode::NOT_FOUND, "not found".to_string());
        };

        let Some((group_name, key)) = split_group_key(rest) else {
            return text_response(StatusCode::BAD_REQUEST, "bad request".to_string());
        };

        let Some(group) = self.registry.lookup(&group_name) else {
            return text_response(
                StatusCode::NOT_FOUND,
                Error::GroupNotFound(group_name).to_string(),
            );
        };

        group.record_server_request();
        match group.get(&key).await {
            Ok(view) => {
                let mut response = Response::new(Full::new(view.bytes()));
                response.headers_mut().insert(
                    CONTENT_TYPE,
                    HeaderValue::from_static("application/octet-stream"),
                );
                response
            }
            Err(e) => text_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    }

    /// Run the peer server on `listener` until accepting fails
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<()> {
        let addr = listener
            .local_addr()
            .map_err(|e| Error::Internal(format!("Peer server address error: {}", e)))?;
        info!("Peer server for {} listening on {}", self.self_addr, addr);

        loop {
            let (stream, _) = listener
                .accept()
                .await
                .map_err(|e| Error::Internal(format!("Peer server accept error: {}", e)))?;

            let io = TokioIo::new(stream);
            let pool = self.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let pool = pool.clone();
                    async move { Ok::<_, Infallible>(pool.handle(req).await) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Peer server connection error: {}", e);
                }
            });
        }
    }
}

impl PeerPicker for HttpPool {
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerGetter>> {
        let membership = self.membership.lock();
        let peer = membership.ring.as_ref()?.get(key)?;
        if peer == self.self_addr {
            return None;
        }
        debug!("[server {}] pick peer {}", self.self_addr, peer);
        membership
            .getters
            .get(peer)
            .map(|g| g.clone() as Arc<dyn PeerGetter>)
    }
}

impl std::fmt::Debug for HttpPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPool")
            .field("self_addr", &self.self_addr)
            .field("base_path", &self.base_path)
            .field("replicas", &self.replicas)
            .finish()
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn normalize_base_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}

/// Split `<group>/<key>` on the first `/` and decode both halves
fn split_group_key(rest: &str) -> Option<(String, String)> {
    let (group, key) = rest.split_once('/')?;
    let group = urlencoding::decode(group).ok()?;
    let key = urlencoding::decode(key).ok()?;
    Some((group.into_owned(), key.into_owned()))
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

// =============================================================================
// Tests
// =============================================================================
