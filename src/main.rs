//! meshcache node
//!
//! Runs one cache node: a peer server answering other nodes, and optionally a
//! frontend API for clients.
//!
//! ```text
//!   client ──GET /api?key=Tom──► API server ──► Group::get
//!                                                  │
//!                          owner is a peer? ───────┴──► GET /_meshcache/<group>/<key>
//! ```
//!
//! Example three-node cluster on one host:
//!
//! ```text
//! PEERS=http://127.0.0.1:8001,http://127.0.0.1:8002,http://127.0.0.1:8003
//! meshcache --self-addr http://127.0.0.1:8001 --peers $PEERS --api-addr 127.0.0.1:9999
//! meshcache --self-addr http://127.0.0.1:8002 --peers $PEERS
//! meshcache --self-addr http://127.0.0.1:8003 --peers $PEERS
//! ```

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{debug, error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use meshcache::group::GroupStatsSnapshot;
use meshcache::{
    loader_fn, metrics, Error, GroupConfig, GroupRegistry, HttpPool, Loader, PeerFailurePolicy,
    PoolConfig,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// meshcache - distributed read-through cache node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// This node's address as seen by its peers
    #[arg(long, env = "MESHCACHE_SELF", default_value = "http://127.0.0.1:8001")]
    self_addr: String,

    /// All cluster members, comma-separated (this node is added if missing)
    #[arg(long, env = "MESHCACHE_PEERS", value_delimiter = ',')]
    peers: Vec<String>,

    /// Peer server bind address (derived from --self-addr if unset)
    #[arg(long, env = "MESHCACHE_LISTEN")]
    listen: Option<String>,

    /// Frontend API bind address (disabled if unset)
    #[arg(long, env = "MESHCACHE_API_ADDR")]
    api_addr: Option<String>,

    /// Name of the group served by this node
    #[arg(long, env = "MESHCACHE_GROUP", default_value = "scores")]
    group: String,

    /// Local store budget per group in bytes (0 = unbounded)
    #[arg(long, env = "MESHCACHE_CACHE_BYTES", default_value_t = meshcache::cache::DEFAULT_CACHE_BYTES)]
    cache_bytes: u64,

    /// Virtual nodes per peer on the hash ring
    #[arg(long, env = "MESHCACHE_REPLICAS", default_value_t = meshcache::ring::DEFAULT_REPLICAS)]
    replicas: usize,

    /// Path prefix for peer traffic
    #[arg(long, env = "MESHCACHE_BASE_PATH", default_value = meshcache::peers::DEFAULT_BASE_PATH)]
    base_path: String,

    /// Timeout for one remote fetch in milliseconds
    #[arg(long, env = "MESHCACHE_FETCH_TIMEOUT_MS", default_value = "5000")]
    fetch_timeout_ms: u64,

    /// Return peer errors instead of falling back to the local loader
    #[arg(long, env = "MESHCACHE_FAIL_FAST")]
    fail_fast: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn group_config(&self) -> GroupConfig {
        GroupConfig {
            cache_bytes: self.cache_bytes,
            peer_failure_policy: if self.fail_fast {
                PeerFailurePolicy::FailFast
            } else {
                PeerFailurePolicy::FallbackToLocal
            },
        }
    }

    fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            base_path: self.base_path.clone(),
            replicas: self.replicas,
            fetch_timeout: Duration::from_millis(self.fetch_timeout_ms),
        }
    }

    /// Cluster membership including this node
    fn membership(&self) -> Vec<String> {
        let mut peers: Vec<String> = self
            .peers
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        if !peers.contains(&self.self_addr) {
            peers.push(self.self_addr.clone());
        }
        peers
    }

    fn listen_addr(&self) -> String {
        self.listen.clone().unwrap_or_else(|| {
            let addr = self.self_addr.as_str();
            let addr = addr
                .strip_prefix("http://")
                .or_else(|| addr.strip_prefix("https://"))
                .unwrap_or(addr);
            addr.trim_end_matches('/').to_string()
        })
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args)?;

    info!("Starting meshcache {}", meshcache::VERSION);
    info!("  Group: {}", args.group);
    info!("  Cache bytes: {}", args.cache_bytes);
    info!("  Fail fast: {}", args.fail_fast);

    let registry = Arc::new(GroupRegistry::new());
    let group = registry.new_group(&args.group, args.group_config(), Arc::new(demo_loader()))?;

    let pool = Arc::new(HttpPool::new(
        &args.self_addr,
        args.pool_config(),
        registry.clone(),
    )?);
    info!("  Peer server for: {}", pool.self_addr());
    let membership = args.membership();
    pool.set(&membership);
    group.register_peers(pool.clone())?;
    info!("  Peers: {}", pool.peers().join(", "));

    let listen = args.listen_addr();
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind peer server on {}", listen))?;

    let mut servers: Vec<BoxFuture<'static, meshcache::Result<()>>> =
        vec![pool.clone().serve(listener).boxed()];

    if let Some(api_addr) = &args.api_addr {
        let listener = TcpListener::bind(api_addr)
            .await
            .with_context(|| format!("Failed to bind API server on {}", api_addr))?;
        servers.push(run_api_server(listener, registry.clone(), args.group.clone()).boxed());
    }

    try_join_all(servers).await.context("server stopped")?;

    info!("meshcache shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(level.into())
        .add_directive("hyper=warn".parse()?)
        .add_directive("hyper_util=warn".parse()?);

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
    Ok(())
}

// =============================================================================
// Demo Data Source
// =============================================================================

/// In-memory table standing in for a slow database
fn demo_loader() -> impl Loader {
    let db: Arc<HashMap<&'static str, &'static str>> =
        Arc::new([("Tom", "630"), ("Jack", "589"), ("Sam", "567")].into_iter().collect());

    loader_fn(move |key: String| {
        let db = db.clone();
        async move {
            info!("[SlowDB] search key {}", key);
            tokio::time::sleep(Duration::from_millis(50)).await;
            db.get(key.as_str())
                .map(|v| v.as_bytes().to_vec())
                .ok_or_else(|| Error::loader(format!("{} not exist", key)))
        }
    })
}

// =============================================================================
// API Server
// =============================================================================

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str(content_type) {
        response.headers_mut().insert(CONTENT_TYPE, value);
    }
    response
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .and_then(|(_, v)| urlencoding::decode(&v.replace('+', " ")).ok().map(|v| v.into_owned()))
}

async fn api_handler(
    req: Request<Incoming>,
    registry: Arc<GroupRegistry>,
    group_name: String,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    debug!("API {} {}", req.method(), req.uri());
    const TEXT: &str = "text/plain; charset=utf-8";

    let response = match req.uri().path() {
        "/api" => {
            let key = query_param(req.uri().query(), "key").unwrap_or_default();
            match registry.lookup(&group_name) {
                None => respond(
                    StatusCode::NOT_FOUND,
                    TEXT,
                    Error::GroupNotFound(group_name).to_string(),
                ),
                Some(group) => match group.get(&key).await {
                    Ok(view) => respond(StatusCode::OK, "application/octet-stream", view.bytes()),
                    Err(e @ Error::InvalidKey) => {
                        respond(StatusCode::BAD_REQUEST, TEXT, e.to_string())
                    }
                    Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
                },
            }
        }
        "/metrics" => match metrics::render(&registry) {
            Ok(text) => respond(StatusCode::OK, &metrics::content_type(), text),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
        },
        "/stats" => {
            let stats: BTreeMap<String, GroupStatsSnapshot> = registry
                .groups()
                .iter()
                .map(|g| (g.name().to_string(), g.stats()))
                .collect();
            match serde_json::to_vec(&stats) {
                Ok(body) => respond(StatusCode::OK, "application/json", body),
                Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, TEXT, e.to_string()),
            }
        }
        "/healthz" | "/livez" | "/readyz" => respond(StatusCode::OK, TEXT, "ok"),
        _ => respond(StatusCode::NOT_FOUND, TEXT, "not found"),
    };
    Ok(response)
}

async fn run_api_server(
    listener: TcpListener,
    registry: Arc<GroupRegistry>,
    group_name: String,
) -> meshcache::Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| Error::Internal(format!("API server address error: {}", e)))?;
    info!("API server listening on {}", addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("API server accept error: {}", e)))?;

        let io = TokioIo::new(stream);
        let registry = registry.clone();
        let group_name = group_name.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                api_handler(req, registry.clone(), group_name.clone())
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("API server connection error: {}", e);
            }
        });
    }
}
