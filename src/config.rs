//! Resolved client settings
//!
//! Everything here is plain data with defaults; the binary fills it from
//! command-line flags and library users build it directly.

use std::path::PathBuf;

use chrono::Duration;

use crate::cache::{default_ttl, FileCache};
use crate::http::TransportConfig;

/// Default API host
pub const DEFAULT_ENDPOINT: &str = "https://api.instagram.com";

/// Default API version prefix
pub const DEFAULT_VERSION: &str = "v1";

/// Default OAuth scope requested by [`crate::Client::authorize_url`]
pub const DEFAULT_SCOPE: &str = "comments+relationships+likes";

/// Settings for a [`crate::Client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Scheme and host of the API, without a trailing slash
    pub endpoint: String,
    /// Version segment prefixed to relative paths
    pub version: String,
    pub client_id: String,
    pub client_secret: String,
    /// Token used for authenticated calls; empty when none
    pub access_token: String,
    pub redirect_uri: String,
    pub scope: String,
    pub transport: TransportConfig,
    pub cache: CacheConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            version: DEFAULT_VERSION.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            access_token: String::new(),
            redirect_uri: String::new(),
            scope: DEFAULT_SCOPE.to_string(),
            transport: TransportConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

/// Settings for the response cache
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Registered engine name, matched case-insensitively
    pub engine: String,
    /// Cache directory for the file engine; the platform cache dir when `None`
    pub dir: Option<PathBuf>,
    /// Lifetime of stored entries
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            engine: "file".to_string(),
            dir: None,
            ttl: default_ttl(),
        }
    }
}

impl CacheConfig {
    /// Directory the file engine will use
    pub fn resolved_dir(&self) -> Option<PathBuf> {
        self.dir.clone().or_else(FileCache::default_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, "https://api.instagram.com");
        assert_eq!(config.version, "v1");
        assert_eq!(config.scope, "comments+relationships+likes");
        assert!(config.access_token.is_empty());
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.engine, "file");
        assert_eq!(config.ttl, Duration::minutes(2));
        assert!(config.dir.is_none());
    }

    #[test]
    fn test_resolved_dir_prefers_override() {
        let config = CacheConfig {
            dir: Some(PathBuf::from("/tmp/instaclient-test")),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_dir(),
            Some(PathBuf::from("/tmp/instaclient-test"))
        );
    }
}
