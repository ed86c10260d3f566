//! Error types for the offline worker

use thiserror::Error;

/// Result type for worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the offline caching layer
#[derive(Debug, Error)]
pub enum Error {
    /// Cache directory could not be determined
    #[error("Could not determine cache directory for the current platform")]
    CacheDirectoryNotFound,

    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The network layer reported a failure
    #[error("Fetch error: {0}")]
    Fetch(#[from] deskline_fetch::Error),

    /// The network could not be reached for a request
    #[error("Network unavailable for {url}")]
    NetworkUnavailable { url: String },

    /// A cache lookup returned nothing
    #[error("Cache miss for {key}")]
    CacheMiss { key: String },

    /// A cache-only strategy found no stored response.
    ///
    /// Distinct from [`Error::NetworkUnavailable`]: the network was never
    /// consulted.
    #[error("No cached response for {key}")]
    NoCachedResponse { key: String },

    /// A cache write failed (quota or I/O)
    #[error("Cache write failed: {reason}")]
    CacheWrite { reason: String },

    /// A precache fetch failed during install
    #[error("Install failed: could not precache {path}")]
    InstallResource { path: String },

    /// A queued action's re-submission failed
    #[error("Sync replay failed for action {id}: {reason}")]
    SyncReplay { id: String, reason: String },

    /// Invalid namespace name
    #[error("Invalid namespace name: {0}")]
    InvalidNamespace(String),
}

impl Error {
    /// Create a network unavailable error
    pub fn network_unavailable(url: impl Into<String>) -> Self {
        Self::NetworkUnavailable { url: url.into() }
    }

    /// Create a cache miss error
    pub fn cache_miss(key: impl Into<String>) -> Self {
        Self::CacheMiss { key: key.into() }
    }

    /// Create a no-cached-response error
    pub fn no_cached_response(key: impl Into<String>) -> Self {
        Self::NoCachedResponse { key: key.into() }
    }

    /// Create a cache write error
    pub fn cache_write(reason: impl Into<String>) -> Self {
        Self::CacheWrite {
            reason: reason.into(),
        }
    }

    /// Create an install resource error
    pub fn install_resource(path: impl Into<String>) -> Self {
        Self::InstallResource { path: path.into() }
    }

    /// Create a sync replay error
    pub fn sync_replay(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SyncReplay {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
