//! HTTP Peer Client
//!
//! Fetches `<base_url><group>/<key>` from the node that owns a key. Group and
//! key are percent-escaped so keys containing `/`, spaces or `?` survive the
//! trip.
//!
//! Requests go out through hyper's client, whose `Uri` keeps the path as
//! written. Keys such as `.` or `..` are therefore sent verbatim instead of
//! being folded away as dot segments.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::{Request, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, instrument};

use super::PeerGetter;
use crate::error::{Error, Result};

/// Pooled HTTP/1 client shared by every getter of a pool
pub type PeerClient = Client<HttpConnector, Empty<Bytes>>;

/// Build the shared peer client
pub fn peer_client() -> PeerClient {
    Client::builder(TokioExecutor::new()).build_http()
}

/// [`PeerGetter`] for one remote node
#[derive(Debug, Clone)]
pub struct HttpGetter {
    /// Peer address (e.g. `http://10.0.0.2:8008`)
    addr: String,
    /// `addr` + base path, always ending in `/`
    base_url: String,
    client: PeerClient,
    timeout: Duration,
}

impl HttpGetter {
    /// Create a getter for `addr` serving under `base_path`
    pub fn new(
        addr: impl Into<String>,
        base_path: &str,
        client: PeerClient,
        timeout: Duration,
    ) -> Self {
        let addr = addr.into();
        let mut base_url = format!("{}{}", addr.trim_end_matches('/'), base_path);
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            addr,
            base_url,
            client,
            timeout,
        }
    }

    /// Full URL for a group/key pair
    pub fn url_for(&self, group: &str, key: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            urlencoding::encode(group),
            urlencoding::encode(key)
        )
    }

    async fn fetch(&self, uri: Uri) -> Result<Bytes> {
        let request = Request::get(uri)
            .body(Empty::new())
            .map_err(|e| Error::Internal(format!("building peer request: {}", e)))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| Error::PeerConnection(e.to_string()))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| Error::PeerResponse(e.to_string()))?
            .to_bytes();

        if !status.is_success() {
            return Err(Error::PeerStatus {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).trim_end().to_string(),
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl PeerGetter for HttpGetter {
    #[instrument(skip(self), fields(peer = %self.addr))]
    async fn get(&self, group: &str, key: &str) -> Result<Bytes> {
        let url = self.url_for(group, key);
        debug!("Fetching {}", url);

        let uri: Uri = url
            .parse()
            .map_err(|e| Error::PeerConnection(format!("invalid peer url {}: {}", url, e)))?;

        tokio::time::timeout(self.timeout, self.fetch(uri))
            .await
            .map_err(|_| {
                Error::PeerConnection(format!("{} timed out after {:?}", url, self.timeout))
            })?
    }

    fn addr(&self) -> &str {
        &self.addr
    }
}
