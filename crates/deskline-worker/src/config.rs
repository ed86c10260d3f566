//! Worker configuration
//!
//! The worker version drives cache namespace naming: bumping the version
//! makes activation delete every namespace of the previous version, which
//! is how stale app-shell assets are retired.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the offline worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Worker version tag, encoded into every namespace name
    pub version: String,
    /// Origin the relative manifest paths are resolved against
    pub origin: String,
    /// Absolute paths precached during install (the app shell)
    pub precache_manifest: Vec<String>,
    /// Path of the offline fallback page; must appear in the manifest
    pub offline_page: String,
    /// Path prefix of the REST API
    pub api_prefix: String,
    /// Bound applied to every network call issued by a strategy
    pub network_timeout: Duration,
    /// Replay attempts before a pending action is marked failed
    pub max_replay_attempts: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            origin: "https://app.deskline.io".to_string(),
            precache_manifest: vec![
                "/".to_string(),
                "/static/js/bundle.js".to_string(),
                "/static/css/main.css".to_string(),
                "/manifest.json".to_string(),
                "/offline.html".to_string(),
            ],
            offline_page: "/offline.html".to_string(),
            api_prefix: "/api/v1/".to_string(),
            network_timeout: Duration::from_secs(10),
            max_replay_attempts: 5,
        }
    }
}

impl WorkerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Set the origin used to resolve manifest paths
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// Set the precache manifest
    pub fn with_precache_manifest(mut self, manifest: Vec<String>) -> Self {
        self.precache_manifest = manifest;
        self
    }

    /// Set the offline page path
    pub fn with_offline_page(mut self, path: impl Into<String>) -> Self {
        self.offline_page = path.into();
        self
    }

    /// Set the network timeout
    pub fn with_network_timeout(mut self, timeout: Duration) -> Self {
        self.network_timeout = timeout;
        self
    }

    /// Set the maximum replay attempts
    pub fn with_max_replay_attempts(mut self, attempts: u32) -> Self {
        self.max_replay_attempts = attempts;
        self
    }

    /// App shell namespace for the current version
    pub fn shell_namespace(&self) -> String {
        format!("app-shell-{}", self.version)
    }

    /// API response namespace for the current version
    pub fn api_namespace(&self) -> String {
        format!("api-{}", self.version)
    }

    /// Offline fallback namespace for the current version
    pub fn offline_namespace(&self) -> String {
        format!("offline-{}", self.version)
    }

    /// The known-good namespace set; activation deletes everything else
    pub fn current_namespaces(&self) -> Vec<String> {
        vec![
            self.shell_namespace(),
            self.api_namespace(),
            self.offline_namespace(),
        ]
    }

    /// Resolve a manifest path against the configured origin
    pub fn resolve(&self, path: &str) -> String {
        format!("{}{}", self.origin.trim_end_matches('/'), path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.version.is_empty() {
            return Err("version must not be empty".to_string());
        }
        if self.version.contains('/') {
            return Err("version must not contain path separators".to_string());
        }
        if !self.api_prefix.starts_with('/') {
            return Err("api_prefix must be an absolute path".to_string());
        }
        if !self.precache_manifest.contains(&self.offline_page) {
            return Err("offline_page must be part of the precache manifest".to_string());
        }
        if self.network_timeout.is_zero() {
            return Err("network_timeout must be non-zero".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = WorkerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn namespaces_encode_version() {
        let config = WorkerConfig::new().with_version("v7");
        assert_eq!(config.shell_namespace(), "app-shell-v7");
        assert_eq!(config.api_namespace(), "api-v7");
        assert_eq!(config.offline_namespace(), "offline-v7");
        assert_eq!(config.current_namespaces().len(), 3);
    }

    #[test]
    fn resolve_joins_origin_and_path() {
        let config = WorkerConfig::new().with_origin("https://support.example.com/");
        assert_eq!(
            config.resolve("/offline.html"),
            "https://support.example.com/offline.html"
        );
    }

    #[test]
    fn validation_rejects_bad_configs() {
        assert!(WorkerConfig::new().with_version("").validate().is_err());
        assert!(WorkerConfig::new().with_version("v1/x").validate().is_err());
        assert!(WorkerConfig::new()
            .with_offline_page("/not-precached.html")
            .validate()
            .is_err());
        assert!(WorkerConfig::new()
            .with_network_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
