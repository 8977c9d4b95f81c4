//! Worker configuration.

use serde::{Deserialize, Serialize};
use url::Url;

use habitos_common::{HabitosError, RetryConfig};

/// Worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Application origin. Click targets default here, and manifest paths
    /// are resolved against it.
    pub origin: String,

    /// Offline cache settings.
    pub cache: CacheSettings,

    /// Install retry policy (the host retries a failed install until the
    /// manifest is fully cached).
    pub install_retry: RetryConfig,
}

/// Offline cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Version identifier naming the current cache. Bumped per deploy;
    /// caches under any other name are pruned on activation.
    pub version: String,

    /// Asset paths cached at install time, relative to the origin.
    pub manifest: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            origin: "https://habitos.app/".to_string(),
            cache: CacheSettings::default(),
            install_retry: RetryConfig::install(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            version: "habitos-v1".to_string(),
            manifest: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/styles.css".to_string(),
                "/app.js".to_string(),
                "/icons/icon-192.png".to_string(),
            ],
        }
    }
}

impl WorkerConfig {
    /// Parse the configured origin.
    pub fn origin_url(&self) -> Result<Url, HabitosError> {
        Url::parse(&self.origin)
            .map_err(|e| HabitosError::config_with_source(format!("invalid origin {}", self.origin), e))
    }

    /// Resolve the manifest paths into absolute URLs.
    pub fn manifest_urls(&self) -> Result<Vec<String>, HabitosError> {
        let origin = self.origin_url()?;
        self.cache
            .manifest
            .iter()
            .map(|path| {
                origin
                    .join(path)
                    .map(|u| u.to_string())
                    .map_err(|e| {
                        HabitosError::config_with_source(format!("invalid manifest path {path}"), e)
                    })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.cache.version, "habitos-v1");
        assert!(!config.cache.manifest.is_empty());
        assert!(config.install_retry.max_attempts > 1);
    }

    #[test]
    fn test_manifest_urls_resolve_against_origin() {
        let config = WorkerConfig::default();
        let urls = config.manifest_urls().unwrap();

        assert_eq!(urls[0], "https://habitos.app/");
        assert!(urls.contains(&"https://habitos.app/app.js".to_string()));
        assert!(urls.contains(&"https://habitos.app/icons/icon-192.png".to_string()));
    }

    #[test]
    fn test_invalid_origin_rejected() {
        let config = WorkerConfig {
            origin: "not a url".to_string(),
            ..Default::default()
        };

        assert!(config.origin_url().is_err());
        assert!(config.manifest_urls().is_err());
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = WorkerConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: WorkerConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(back.origin, config.origin);
        assert_eq!(back.cache.version, config.cache.version);
        assert_eq!(back.cache.manifest, config.cache.manifest);
    }
}
