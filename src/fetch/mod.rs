//! Tile transport.
//!
//! The engine consumes an opaque byte-fetch: given a templated URL and a
//! header set, return the tile's bytes or a failure. The reqwest-backed
//! client is the production implementation; tests inject
//! [`MockFetcher`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::coord::TileKey;

/// Errors from the tile transport.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// The request never completed.
    #[error("transport failure for {url}: {message}")]
    Transport { url: String, message: String },

    /// The HTTP client could not be constructed.
    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Expand a `{z}/{x}/{y}` URL template for a tile.
pub fn expand_template(template: &str, key: &TileKey) -> String {
    template
        .replace("{z}", &key.z.to_string())
        .replace("{x}", &key.x.to_string())
        .replace("{y}", &key.y.to_string())
}

/// Asynchronous tile byte fetcher.
///
/// Object-safe so the source can hold `Arc<dyn TileFetcher>`; the boxed
/// future keeps implementations free to borrow internally.
pub trait TileFetcher: Send + Sync {
    /// Fetch the bytes behind a fully expanded tile URL.
    fn fetch(
        &self,
        url: String,
        headers: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send>>;
}

/// Production fetcher backed by a pooled reqwest client.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher with connection pooling and a 30-second timeout.
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .pool_max_idle_per_host(32)
            .tcp_keepalive(std::time::Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl TileFetcher for ReqwestFetcher {
    fn fetch(
        &self,
        url: String,
        headers: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send>> {
        let client = self.client.clone();
        Box::pin(async move {
            let mut request = client.get(&url);
            for (name, value) in &headers {
                request = request.header(name, value);
            }

            let response = request.send().await.map_err(|e| FetchError::Transport {
                url: url.clone(),
                message: e.to_string(),
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    status: status.as_u16(),
                    url,
                });
            }

            response
                .bytes()
                .await
                .map(|b| b.to_vec())
                .map_err(|e| FetchError::Transport {
                    url,
                    message: e.to_string(),
                })
        })
    }
}

/// Canned-response fetcher for tests.
///
/// Responses are keyed by the expanded URL; unknown URLs answer 404.
/// An optional per-call delay models network latency.
#[derive(Default)]
pub struct MockFetcher {
    responses: dashmap::DashMap<String, Result<Vec<u8>, FetchError>>,
    delay: Option<std::time::Duration>,
    hits: std::sync::atomic::AtomicUsize,
}

impl MockFetcher {
    /// Create a mock with no canned responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock whose responses settle after `delay`.
    pub fn with_delay(delay: std::time::Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Can a successful response for a URL.
    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.responses.insert(url.into(), Ok(bytes));
    }

    /// Can a failure for a URL.
    pub fn insert_error(&self, url: impl Into<String>, error: FetchError) {
        self.responses.insert(url.into(), Err(error));
    }

    /// Number of fetches performed.
    pub fn hit_count(&self) -> usize {
        self.hits.load(std::sync::atomic::Ordering::Relaxed)
    }
}

impl TileFetcher for MockFetcher {
    fn fetch(
        &self,
        url: String,
        _headers: HashMap<String, String>,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<u8>, FetchError>> + Send>> {
        self.hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let response = self
            .responses
            .get(&url)
            .map(|r| r.value().clone())
            .unwrap_or(Err(FetchError::Status { status: 404, url }));
        let delay = self.delay;
        Box::pin(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            response
        })
    }
}
