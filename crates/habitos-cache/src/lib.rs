//! # Habitos Cache
//!
//! Offline asset caching for the Habitos notification worker.
//!
//! ## Features
//!
//! - **Manifest**: fixed list of assets cached at install time
//! - **Versioned caches**: exactly one cache is current; stale versions are
//!   pruned on activation
//! - **Cache-first serving**: cached snapshots win, network is the fallback
//! - **Opportunistic population**: successful same-origin responses are
//!   stored on the way back to the caller
//!
//! ## Architecture
//!
//! ```text
//! CacheStorage
//!     ├── AssetCache "habitos-v1"   (current)
//!     │       └── "GET https://…/app.js" → CacheEntry
//!     └── AssetCache "habitos-v0"   (stale, deleted on activation)
//!
//! AssetCacheManager
//!     ├── install()      manifest → current cache
//!     ├── activate()     prune stale caches
//!     └── handle_fetch() cache-first, network fallback
//! ```

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use habitos_common::HabitosError;

pub mod policy;

pub use policy::{AssetCacheManager, AssetFetcher, AssetRequest, AssetResponse};

// ==================== Errors ====================

/// Errors that can occur in cache operations.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Install failed for {url}: {message}")]
    InstallFailed { url: String, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Cache not found: {0}")]
    NotFound(String),
}

impl From<CacheError> for HabitosError {
    fn from(err: CacheError) -> Self {
        HabitosError::cache_with_source("cache operation failed", err)
    }
}

// ==================== Manifest ====================

/// The fixed, ordered list of asset URLs required for offline operation.
///
/// Read once at install time; never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheManifest {
    urls: Vec<String>,
}

impl CacheManifest {
    /// Create a manifest from a list of absolute URLs.
    pub fn new(urls: Vec<String>) -> Self {
        Self { urls }
    }

    /// The manifest URLs, in install order.
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Check whether a URL is part of the manifest.
    pub fn contains(&self, url: &str) -> bool {
        self.urls.iter().any(|u| u == url)
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.urls.len()
    }

    /// Check if the manifest is empty.
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

impl FromIterator<String> for CacheManifest {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ==================== Response kind ====================

/// Classification of a fetched response, as seen by the caching policy.
///
/// Only `Basic` (same-origin) responses are ever stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response; cacheable when the status is 200.
    Basic,
    /// Cross-origin response with CORS headers; served but never cached.
    Cors,
    /// Cross-origin response without readable body; served but never cached.
    Opaque,
}

// ==================== Cache entry ====================

/// A stored response snapshot, keyed by request identity (method + URL).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Request method.
    pub method: String,

    /// Response status.
    pub status: u16,

    /// Response classification at store time.
    pub kind: ResponseKind,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Stored-at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// The identity this entry is stored under.
    pub fn key(&self) -> String {
        request_key(&self.method, &self.url)
    }
}

/// Request identity used as the cache key.
pub(crate) fn request_key(method: &str, url: &str) -> String {
    format!("{method} {url}")
}

// ==================== Asset cache ====================

/// A named cache mapping request identity to stored response snapshots.
#[derive(Debug, Default)]
pub struct AssetCache {
    /// Cache name (the version identifier).
    name: String,

    /// Stored entries.
    entries: HashMap<String, CacheEntry>,
}

impl AssetCache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Cache name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Match a request identity.
    pub fn match_request(&self, method: &str, url: &str) -> Option<&CacheEntry> {
        self.entries.get(&request_key(method, url))
    }

    /// Store an entry (add-or-overwrite; last writer wins).
    pub fn put(&mut self, entry: CacheEntry) {
        self.entries.insert(entry.key(), entry);
    }

    /// Delete an entry.
    pub fn delete(&mut self, method: &str, url: &str) -> bool {
        self.entries.remove(&request_key(method, url)).is_some()
    }

    /// All stored keys.
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(|k| k.as_str()).collect()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Cache storage ====================

/// The named-cache registry.
///
/// Exactly one cache is "current" at any time (by version identifier); the
/// rest exist only between a deploy and the next activation.
#[derive(Debug, Default)]
pub struct CacheStorage {
    caches: HashMap<String, AssetCache>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache (creates if absent).
    pub fn open(&mut self, name: &str) -> &mut AssetCache {
        self.caches
            .entry(name.to_string())
            .or_insert_with(|| AssetCache::new(name))
    }

    /// Get a cache without creating it.
    pub fn get(&self, name: &str) -> Option<&AssetCache> {
        self.caches.get(name)
    }

    /// Check if a cache exists.
    pub fn has(&self, name: &str) -> bool {
        self.caches.contains_key(name)
    }

    /// Delete a cache.
    pub fn delete(&mut self, name: &str) -> bool {
        self.caches.remove(name).is_some()
    }

    /// All cache names.
    pub fn keys(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            kind: ResponseKind::Basic,
            headers: HashMap::new(),
            body: b"body".to_vec(),
            cached_at: 0,
        }
    }

    #[test]
    fn test_manifest() {
        let manifest = CacheManifest::new(vec![
            "https://habitos.app/".to_string(),
            "https://habitos.app/app.js".to_string(),
        ]);

        assert_eq!(manifest.len(), 2);
        assert!(manifest.contains("https://habitos.app/app.js"));
        assert!(!manifest.contains("https://habitos.app/other.js"));
    }

    #[test]
    fn test_cache_put_and_match() {
        let mut cache = AssetCache::new("habitos-v1");

        cache.put(entry("https://habitos.app/styles.css"));

        assert!(cache
            .match_request("GET", "https://habitos.app/styles.css")
            .is_some());
        assert!(cache
            .match_request("GET", "https://habitos.app/other.css")
            .is_none());
        // Identity includes the method
        assert!(cache
            .match_request("HEAD", "https://habitos.app/styles.css")
            .is_none());
    }

    #[test]
    fn test_cache_put_overwrites() {
        let mut cache = AssetCache::new("habitos-v1");

        cache.put(entry("https://habitos.app/app.js"));
        let mut newer = entry("https://habitos.app/app.js");
        newer.body = b"newer".to_vec();
        cache.put(newer);

        assert_eq!(cache.len(), 1);
        let stored = cache
            .match_request("GET", "https://habitos.app/app.js")
            .unwrap();
        assert_eq!(stored.body, b"newer");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = AssetCache::new("habitos-v1");

        cache.put(entry("https://habitos.app/styles.css"));
        assert!(cache.delete("GET", "https://habitos.app/styles.css"));
        assert!(!cache.delete("GET", "https://habitos.app/styles.css"));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_storage() {
        let mut storage = CacheStorage::new();

        assert!(!storage.has("habitos-v1"));

        storage.open("habitos-v1");
        assert!(storage.has("habitos-v1"));
        assert_eq!(storage.keys(), vec!["habitos-v1".to_string()]);

        assert!(storage.delete("habitos-v1"));
        assert!(!storage.has("habitos-v1"));
    }

    #[test]
    fn test_cache_entry_serde_round_trip() {
        let e = entry("https://habitos.app/icons/icon-192.png");
        let json = serde_json::to_string(&e).unwrap();
        let back: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back.key(), e.key());
        assert_eq!(back.body, e.body);
    }
}
