//! Error types for the fetch layer

use thiserror::Error;

/// Result type for fetch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for network fetch operations
#[derive(Debug, Error)]
pub enum Error {
    /// HTTP request failed at the transport level
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The request did not complete within the configured timeout
    #[error("Request to {url} timed out")]
    Timeout { url: String },

    /// The request URL could not be parsed
    #[error("Invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Unknown HTTP method string
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(String),
}

impl Error {
    /// Create a timeout error for a URL
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Create an invalid URL error
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Whether this error indicates the network was unreachable,
    /// as opposed to a malformed request.
    pub fn is_network_unavailable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}
