//! Request and response snapshot types
//!
//! These are plain-data snapshots rather than wrappers around live reqwest
//! types: the worker stores them on disk, replays them from the sync queue,
//! and synthesizes them for offline fallbacks, so they must be owned and
//! serializable.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    /// Canonical upper-case method name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether this method mutates server-side state.
    ///
    /// Mutating requests are the only requests captured into the
    /// background sync queue when the network is unreachable.
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Get | Self::Head)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            other => Err(Error::InvalidMethod(other.to_string())),
        }
    }
}

/// An outgoing request captured at the interception boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: String,
    /// Header name/value pairs in insertion order
    pub headers: Vec<(String, String)>,
    /// Request body, if any
    pub body: Option<Bytes>,
}

impl FetchRequest {
    /// Create a request with the given method and URL
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a GET request
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// URL path component, or `/` if the URL does not parse
    pub fn path(&self) -> String {
        url::Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| "/".to_string())
    }

    /// Whether this request targets an http or https URL.
    ///
    /// Anything else (extension schemes, data URLs) is never intercepted.
    pub fn is_http(&self) -> bool {
        url::Url::parse(&self.url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false)
    }

    /// Whether this request is a top-level page navigation.
    ///
    /// There is no request-mode flag outside the browser runtime, so a
    /// navigation is a GET that accepts an HTML document.
    pub fn is_navigation(&self) -> bool {
        self.method == Method::Get
            && self
                .header("accept")
                .is_some_and(|accept| accept.contains("text/html"))
    }
}

/// A response snapshot: status, headers and a fully buffered body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Header name/value pairs
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

impl FetchResponse {
    /// Create a worker-synthesized response
    pub fn synthetic(status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.into(),
        }
    }

    /// Whether the status code indicates success (2xx)
    pub fn is_ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Deserialize the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_round_trip() {
        for m in [
            Method::Get,
            Method::Head,
            Method::Post,
            Method::Put,
            Method::Patch,
            Method::Delete,
        ] {
            assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
        }
        assert!("BREW".parse::<Method>().is_err());
    }

    #[test]
    fn mutation_classification() {
        assert!(!Method::Get.is_mutation());
        assert!(!Method::Head.is_mutation());
        assert!(Method::Post.is_mutation());
        assert!(Method::Delete.is_mutation());
    }

    #[test]
    fn request_path_and_scheme() {
        let req = FetchRequest::get("https://app.deskline.io/api/v1/tickets/42?page=2");
        assert_eq!(req.path(), "/api/v1/tickets/42");
        assert!(req.is_http());

        let ext = FetchRequest::get("chrome-extension://abc/script.js");
        assert!(!ext.is_http());
    }

    #[test]
    fn navigation_detection() {
        let nav = FetchRequest::get("https://app.deskline.io/dashboard")
            .with_header("Accept", "text/html,application/xhtml+xml");
        assert!(nav.is_navigation());

        let api = FetchRequest::get("https://app.deskline.io/api/v1/tickets")
            .with_header("Accept", "application/json");
        assert!(!api.is_navigation());

        let post = FetchRequest::new(Method::Post, "https://app.deskline.io/")
            .with_header("Accept", "text/html");
        assert!(!post.is_navigation());
    }

    #[test]
    fn response_helpers() {
        let resp = FetchResponse::synthetic(503, "application/json", r#"{"error":"Offline"}"#);
        assert!(!resp.is_ok());
        assert_eq!(resp.header("Content-Type"), Some("application/json"));

        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["error"], "Offline");
    }
}
