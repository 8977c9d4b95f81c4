//! Cache-first asset serving policy.
//!
//! The manager owns the storage and applies the offline policy: install the
//! manifest, prune superseded caches on activation, and serve intercepted
//! requests cache-first with opportunistic population on the network path.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::BoxFuture;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::{request_key, CacheEntry, CacheError, CacheManifest, CacheStorage, ResponseKind};

// ==================== Request / Response ====================

/// A request seen by the fetch interception path.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    /// Request method.
    pub method: String,

    /// Request URL.
    pub url: Url,
}

impl AssetRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
        }
    }

    /// Create a GET request from a URL string.
    pub fn get_str(url: &str) -> Result<Self, CacheError> {
        let url = Url::parse(url).map_err(|e| CacheError::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }

    /// The cache key for this request.
    pub fn key(&self) -> String {
        request_key(&self.method, self.url.as_str())
    }
}

/// A response flowing back to the requester.
#[derive(Debug, Clone)]
pub struct AssetResponse {
    /// Final URL.
    pub url: String,

    /// Status code.
    pub status: u16,

    /// Response classification.
    pub kind: ResponseKind,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Whether served from cache.
    pub from_cache: bool,
}

impl AssetResponse {
    /// Create a network response.
    pub fn new(url: impl Into<String>, status: u16, kind: ResponseKind) -> Self {
        Self {
            url: url.into(),
            status,
            kind,
            headers: HashMap::new(),
            body: Vec::new(),
            from_cache: false,
        }
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Check for a 200 status.
    pub fn ok(&self) -> bool {
        self.status == 200
    }

    /// Whether the policy is allowed to store this response: a successful
    /// same-origin response. Everything else passes through uncached.
    pub fn is_cacheable(&self) -> bool {
        self.ok() && self.kind == ResponseKind::Basic
    }

    /// Rebuild a response from a stored snapshot.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            url: entry.url.clone(),
            status: entry.status,
            kind: entry.kind,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            from_cache: true,
        }
    }

    /// Snapshot this response for storage under the given request identity.
    pub fn to_entry(&self, method: &str) -> CacheEntry {
        CacheEntry {
            url: self.url.clone(),
            method: method.to_string(),
            status: self.status,
            kind: self.kind,
            headers: self.headers.clone(),
            body: self.body.clone(),
            cached_at: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==================== Fetcher seam ====================

/// The network seam used for manifest installation and cache misses.
///
/// Injectable so tests and the smoke harness can run without a network.
pub trait AssetFetcher: Send + Sync {
    /// Fetch a request from the network.
    fn fetch(&self, request: AssetRequest) -> BoxFuture<'static, Result<AssetResponse, CacheError>>;
}

// ==================== Manager ====================

/// Applies the offline caching policy against a versioned cache storage.
pub struct AssetCacheManager {
    /// Current cache version identifier.
    version: String,

    /// Install-time asset list.
    manifest: CacheManifest,

    /// Shared cache storage.
    storage: Arc<RwLock<CacheStorage>>,

    /// Network seam.
    fetcher: Arc<dyn AssetFetcher>,
}

impl AssetCacheManager {
    /// Create a manager for the given version and manifest.
    pub fn new(version: &str, manifest: CacheManifest, fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            version: version.to_string(),
            manifest,
            storage: Arc::new(RwLock::new(CacheStorage::new())),
            fetcher,
        }
    }

    /// Current cache version identifier.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The install-time manifest.
    pub fn manifest(&self) -> &CacheManifest {
        &self.manifest
    }

    /// Open a cache by name, creating it if absent.
    pub async fn open_cache(&self, name: &str) {
        self.storage.write().await.open(name);
    }

    /// Names of all existing caches.
    pub async fn cache_names(&self) -> Vec<String> {
        self.storage.read().await.keys()
    }

    /// Check whether a request is currently cached.
    pub async fn contains(&self, request: &AssetRequest) -> bool {
        self.storage
            .read()
            .await
            .get(&self.version)
            .map(|cache| {
                cache
                    .match_request(&request.method, request.url.as_str())
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// Populate the current cache with every manifest asset.
    ///
    /// The first failed or non-200 fetch aborts the install; no
    /// partial-success state is promised. The host retries the whole
    /// install until it succeeds.
    pub async fn install(&self) -> Result<(), CacheError> {
        self.storage.write().await.open(&self.version);

        for url in self.manifest.urls() {
            let request = AssetRequest::get_str(url)?;
            let response =
                self.fetcher
                    .fetch(request.clone())
                    .await
                    .map_err(|e| CacheError::InstallFailed {
                        url: url.clone(),
                        message: e.to_string(),
                    })?;

            if !response.ok() {
                return Err(CacheError::InstallFailed {
                    url: url.clone(),
                    message: format!("status {}", response.status),
                });
            }

            let entry = response.to_entry(&request.method);
            self.storage.write().await.open(&self.version).put(entry);
            trace!(url = %url, "manifest asset cached");
        }

        info!(version = %self.version, assets = self.manifest.len(), "install complete");
        Ok(())
    }

    /// Delete every cache whose name differs from the current version.
    ///
    /// Returns the pruned cache names.
    pub async fn activate(&self) -> Vec<String> {
        let mut storage = self.storage.write().await;

        let stale: Vec<String> = storage
            .keys()
            .into_iter()
            .filter(|name| *name != self.version)
            .collect();

        for name in &stale {
            storage.delete(name);
            debug!(cache = %name, "stale cache deleted");
        }

        stale
    }

    /// Serve a request cache-first.
    ///
    /// A hit returns the stored snapshot unmodified (no revalidation, no
    /// expiry). A miss goes to the network; a successful same-origin
    /// response is stored before being returned. Network failure
    /// propagates to the requester.
    pub async fn handle_fetch(&self, request: AssetRequest) -> Result<AssetResponse, CacheError> {
        {
            let storage = self.storage.read().await;
            if let Some(cache) = storage.get(&self.version) {
                if let Some(entry) = cache.match_request(&request.method, request.url.as_str()) {
                    trace!(url = %request.url, "cache hit");
                    return Ok(AssetResponse::from_entry(entry));
                }
            }
        }

        let response = self.fetcher.fetch(request.clone()).await.map_err(|e| {
            warn!(url = %request.url, error = %e, "network fetch failed");
            e
        })?;

        if response.is_cacheable() {
            let entry = response.to_entry(&request.method);
            self.storage.write().await.open(&self.version).put(entry);
            debug!(url = %request.url, "cache populated from network");
        }

        Ok(response)
    }

    /// Forward a request straight to the network, bypassing the cache.
    ///
    /// Used before the worker has been activated.
    pub async fn passthrough(&self, request: AssetRequest) -> Result<AssetResponse, CacheError> {
        self.fetcher.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory fetcher double: URL → canned response, counting hits.
    struct StaticFetcher {
        routes: Mutex<HashMap<String, Result<AssetResponse, CacheError>>>,
        hits: AtomicUsize,
    }

    impl StaticFetcher {
        fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                hits: AtomicUsize::new(0),
            }
        }

        fn route(self, url: &str, response: AssetResponse) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Ok(response));
            self
        }

        fn fail(self, url: &str) -> Self {
            self.routes
                .lock()
                .unwrap()
                .insert(url.to_string(), Err(CacheError::Network("unreachable".into())));
            self
        }

        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    impl AssetFetcher for StaticFetcher {
        fn fetch(
            &self,
            request: AssetRequest,
        ) -> BoxFuture<'static, Result<AssetResponse, CacheError>> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let result = self
                .routes
                .lock()
                .unwrap()
                .get(request.url.as_str())
                .cloned()
                .unwrap_or_else(|| Err(CacheError::Network("no route".into())));
            Box::pin(async move { result })
        }
    }

    fn basic(url: &str, body: &str) -> AssetResponse {
        AssetResponse::new(url, 200, ResponseKind::Basic).with_body(body.as_bytes().to_vec())
    }

    fn manifest(urls: &[&str]) -> CacheManifest {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[tokio::test]
    async fn test_install_caches_manifest() {
        let fetcher = StaticFetcher::new()
            .route("https://habitos.app/", basic("https://habitos.app/", "index"))
            .route(
                "https://habitos.app/app.js",
                basic("https://habitos.app/app.js", "js"),
            );
        let manager = AssetCacheManager::new(
            "habitos-v1",
            manifest(&["https://habitos.app/", "https://habitos.app/app.js"]),
            Arc::new(fetcher),
        );

        manager.install().await.unwrap();

        let request = AssetRequest::get_str("https://habitos.app/app.js").unwrap();
        assert!(manager.contains(&request).await);
    }

    #[tokio::test]
    async fn test_install_failure_propagates() {
        let fetcher = StaticFetcher::new()
            .route("https://habitos.app/", basic("https://habitos.app/", "index"))
            .fail("https://habitos.app/app.js");
        let manager = AssetCacheManager::new(
            "habitos-v1",
            manifest(&["https://habitos.app/", "https://habitos.app/app.js"]),
            Arc::new(fetcher),
        );

        let result = manager.install().await;
        assert!(matches!(result, Err(CacheError::InstallFailed { .. })));
    }

    #[tokio::test]
    async fn test_install_rejects_non_ok_status() {
        let fetcher = StaticFetcher::new().route(
            "https://habitos.app/missing.js",
            AssetResponse::new("https://habitos.app/missing.js", 404, ResponseKind::Basic),
        );
        let manager = AssetCacheManager::new(
            "habitos-v1",
            manifest(&["https://habitos.app/missing.js"]),
            Arc::new(fetcher),
        );

        let result = manager.install().await;
        assert!(matches!(result, Err(CacheError::InstallFailed { .. })));
    }

    #[tokio::test]
    async fn test_activate_prunes_stale_caches() {
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::new(StaticFetcher::new()),
        );

        manager.open_cache("habitos-v1").await;
        manager.open_cache("habitos-v0").await;
        manager.open_cache("other-app-v3").await;

        let mut deleted = manager.activate().await;
        deleted.sort();

        assert_eq!(deleted, vec!["habitos-v0", "other-app-v3"]);
        assert_eq!(manager.cache_names().await, vec!["habitos-v1".to_string()]);
    }

    #[tokio::test]
    async fn test_fetch_hit_skips_network() {
        let url = "https://habitos.app/styles.css";
        let fetcher = Arc::new(StaticFetcher::new().route(url, basic(url, "css")));
        let manager = AssetCacheManager::new(
            "habitos-v1",
            manifest(&[url]),
            Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        );

        manager.install().await.unwrap();
        assert_eq!(fetcher.hits(), 1);

        let response = manager
            .handle_fetch(AssetRequest::get_str(url).unwrap())
            .await
            .unwrap();

        assert!(response.from_cache);
        assert_eq!(response.body, b"css");
        // The hit was served without going back to the network
        assert_eq!(fetcher.hits(), 1);
    }

    #[tokio::test]
    async fn test_fetch_miss_populates_cache() {
        let url = "https://habitos.app/sounds/chime.mp3";
        let fetcher = Arc::new(StaticFetcher::new().route(url, basic(url, "audio")));
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        );

        let request = AssetRequest::get_str(url).unwrap();
        let first = manager.handle_fetch(request.clone()).await.unwrap();
        assert!(!first.from_cache);
        assert!(manager.contains(&request).await);

        let second = manager.handle_fetch(request).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(fetcher.hits(), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_ok_not_cached() {
        let url = "https://habitos.app/flaky.js";
        let fetcher = Arc::new(StaticFetcher::new().route(
            url,
            AssetResponse::new(url, 503, ResponseKind::Basic),
        ));
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        );

        let request = AssetRequest::get_str(url).unwrap();
        let response = manager.handle_fetch(request.clone()).await.unwrap();

        assert_eq!(response.status, 503);
        assert!(!manager.contains(&request).await);
    }

    #[tokio::test]
    async fn test_fetch_cross_origin_not_cached() {
        let url = "https://cdn.example.com/chart.js";
        let fetcher = Arc::new(StaticFetcher::new().route(
            url,
            AssetResponse::new(url, 200, ResponseKind::Cors).with_body(b"js".to_vec()),
        ));
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        );

        let request = AssetRequest::get_str(url).unwrap();
        let response = manager.handle_fetch(request.clone()).await.unwrap();

        assert_eq!(response.status, 200);
        assert!(!manager.contains(&request).await);
    }

    #[tokio::test]
    async fn test_fetch_network_failure_propagates() {
        let url = "https://habitos.app/api/habits";
        let fetcher = StaticFetcher::new().fail(url);
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::new(fetcher),
        );

        let result = manager
            .handle_fetch(AssetRequest::get_str(url).unwrap())
            .await;
        assert!(matches!(result, Err(CacheError::Network(_))));
    }

    #[tokio::test]
    async fn test_passthrough_does_not_cache() {
        let url = "https://habitos.app/app.js";
        let fetcher = Arc::new(StaticFetcher::new().route(url, basic(url, "js")));
        let manager = AssetCacheManager::new(
            "habitos-v1",
            CacheManifest::default(),
            Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        );

        let request = AssetRequest::get_str(url).unwrap();
        let response = manager.passthrough(request.clone()).await.unwrap();

        assert!(!response.from_cache);
        assert!(!manager.contains(&request).await);
    }

    #[test]
    fn test_request_key_includes_method() {
        let request = AssetRequest::get_str("https://habitos.app/").unwrap();
        assert_eq!(request.key(), "GET https://habitos.app/");
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            AssetRequest::get_str("not a url"),
            Err(CacheError::InvalidUrl(_))
        ));
    }
}
