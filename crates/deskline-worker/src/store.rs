//! Versioned cache namespaces over the local filesystem
//!
//! A namespace is a named, versioned bucket of (request key → response
//! snapshot) pairs, e.g. `app-shell-v1`. Entries live as JSON documents
//! under `{base}/{namespace}/{ab}/{cd}/{sha256(method:url)}` so no single
//! directory grows unbounded. Writes go through a temp file and rename so
//! a crashed write never leaves a truncated entry behind; an overwrite is
//! the only mutation, keyed by request identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use deskline_fetch::{FetchRequest, FetchResponse, Method};

use crate::{Error, Result, ensure_dir, get_cache_dir};

/// Normalized (method, URL) cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
    /// HTTP method
    pub method: Method,
    /// Normalized URL: fragment stripped, default port dropped, query kept
    pub url: String,
}

impl RequestKey {
    /// Build a key from method and URL, normalizing the URL.
    ///
    /// URLs that do not parse are keyed on their raw string; two requests
    /// for the same malformed URL still collide, which is all the cache
    /// needs.
    pub fn new(method: Method, url: &str) -> Self {
        let normalized = match url::Url::parse(url) {
            Ok(mut parsed) => {
                parsed.set_fragment(None);
                parsed.to_string()
            }
            Err(_) => url.to_string(),
        };
        Self {
            method,
            url: normalized,
        }
    }

    /// Key for a captured request
    pub fn for_request(request: &FetchRequest) -> Self {
        Self::new(request.method, &request.url)
    }

    /// Relative storage path: `ab/cd/{sha256(method:url)}`
    pub fn storage_path(&self) -> PathBuf {
        let digest = Sha256::digest(format!("{}:{}", self.method, self.url).as_bytes());
        let hash = hex::encode(digest);
        // abcdef -> ab/cd/abcdef
        let mut path = PathBuf::from(&hash[..2]);
        path.push(&hash[2..4]);
        path.push(hash);
        path
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// A stored response snapshot plus its capture time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// HTTP status of the captured response
    pub status: u16,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: bytes::Bytes,
    /// When the response was captured
    pub captured_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Snapshot a response at the current time
    pub fn capture(response: &FetchResponse) -> Self {
        Self {
            status: response.status,
            headers: response.headers.clone(),
            body: response.body.clone(),
            captured_at: Utc::now(),
        }
    }

    /// Rehydrate the stored snapshot into a response
    pub fn into_response(self) -> FetchResponse {
        FetchResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }

    /// Age of this entry
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.captured_at
    }
}

/// The process-wide cache store: a directory of namespaces
#[derive(Debug, Clone)]
pub struct CacheStore {
    /// Base directory holding one subdirectory per namespace
    base_dir: PathBuf,
}

impl CacheStore {
    /// Create a store in [the user's cache directory][get_cache_dir]
    pub async fn new() -> Result<Self> {
        let base_dir = get_cache_dir()?;
        ensure_dir(&base_dir).await?;
        debug!("Initialized cache store at: {:?}", base_dir);
        Ok(Self { base_dir })
    }

    /// Create a store with a custom base directory
    pub async fn with_base_dir(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        ensure_dir(base_dir).await?;
        debug!("Initialized cache store at: {base_dir:?}");
        Ok(Self {
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// Get the base directory of this store
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Open a namespace, creating it if absent. Idempotent.
    pub async fn open(&self, namespace: &str) -> Result<NamespaceHandle> {
        if namespace.is_empty() || namespace.contains('/') || namespace.contains("..") {
            return Err(Error::InvalidNamespace(namespace.to_string()));
        }
        let dir = self.base_dir.join(namespace);
        ensure_dir(&dir).await?;
        trace!("Opened namespace {namespace}");
        Ok(NamespaceHandle {
            name: namespace.to_string(),
            dir,
        })
    }

    /// List every namespace currently on disk
    pub async fn list_namespaces(&self) -> Result<Vec<String>> {
        let mut namespaces = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                namespaces.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        namespaces.sort();
        Ok(namespaces)
    }

    /// Delete a namespace and every entry under it.
    ///
    /// Returns `Ok(true)` if the namespace existed, `Ok(false)` if it was
    /// already absent.
    pub async fn delete_namespace(&self, namespace: &str) -> Result<bool> {
        if namespace.is_empty() || namespace.contains('/') || namespace.contains("..") {
            return Err(Error::InvalidNamespace(namespace.to_string()));
        }
        let dir = self.base_dir.join(namespace);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!("Deleted namespace {namespace}");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle to one open namespace
///
/// Cheap to clone; all state lives on disk.
#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    name: String,
    dir: PathBuf,
}

impl NamespaceHandle {
    /// Namespace name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(key.storage_path())
    }

    /// Read the entry for a key.
    ///
    /// Returns `Ok(None)` on a miss. A corrupt entry is treated as a miss
    /// and removed, so one bad write cannot wedge a URL forever.
    pub async fn get(&self, key: &RequestKey) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!("Cache miss in {} for {key}", self.name);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice(&raw) {
            Ok(entry) => {
                trace!("Cache hit in {} for {key}", self.name);
                Ok(Some(entry))
            }
            Err(e) => {
                warn!("Corrupt cache entry in {} for {key}: {e}", self.name);
                let _ = tokio::fs::remove_file(&path).await;
                Ok(None)
            }
        }
    }

    /// Store a response snapshot for a key, overwriting any existing entry.
    ///
    /// Only successful (2xx) responses may be stored; redirects and errors
    /// are rejected with [`Error::CacheWrite`]. Request bodies are never
    /// written, only the response.
    pub async fn put(&self, key: &RequestKey, response: &FetchResponse) -> Result<()> {
        if !response.is_ok() {
            return Err(Error::cache_write(format!(
                "refusing to cache non-success status {} for {key}",
                response.status
            )));
        }

        let entry = CacheEntry::capture(response);
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            ensure_dir(parent).await?;
        }

        let payload = serde_json::to_vec(&entry)?;
        trace!(
            "Writing {} bytes to {} for {key}",
            payload.len(),
            self.name
        );

        // Temp file + rename keeps the entry atomic with respect to readers.
        let temp_path = path.with_extension("tmp");
        let write_result = async {
            tokio::fs::write(&temp_path, &payload).await?;
            tokio::fs::rename(&temp_path, &path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;

        if let Err(e) = write_result {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(Error::cache_write(e.to_string()));
        }
        Ok(())
    }

    /// Whether an entry exists for a key
    pub async fn contains(&self, key: &RequestKey) -> bool {
        tokio::fs::metadata(self.entry_path(key)).await.is_ok()
    }

    /// Remove the entry for a key.
    ///
    /// Returns `Ok(true)` if an entry existed and was deleted.
    pub async fn remove(&self, key: &RequestKey) -> Result<bool> {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of entries in this namespace
    pub async fn len(&self) -> Result<usize> {
        let mut count = 0;
        let mut stack = vec![self.dir.clone()];
        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                } else if entry.path().extension().is_none() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Whether this namespace holds no entries
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
