//! Offline request-caching layer for the Deskline helpdesk web client
//!
//! This crate is the worker-side caching module of the Deskline platform:
//! it intercepts outgoing requests, decides per URL which caching strategy
//! governs them, serves responses from versioned local caches or the
//! network, and keeps the client functional when connectivity is absent:
//! - Versioned cache namespaces over the local filesystem
//! - Five interchangeable caching strategies (cache-first, network-first,
//!   stale-while-revalidate, network-only, cache-only)
//! - A dispatcher that always produces a response, with an offline
//!   fallback chain as the terminal error boundary
//! - An install/activate lifecycle that precaches the app shell and
//!   garbage-collects caches from prior versions
//! - A durable background-sync queue that replays writes captured offline

use std::path::{Path, PathBuf};

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fallback;
pub mod lifecycle;
pub mod messages;
pub mod notify;
pub mod routes;
pub mod stats;
pub mod store;
pub mod strategy;
pub mod sync;

pub use config::WorkerConfig;
pub use dispatcher::OfflineWorker;
pub use error::{Error, Result};
pub use lifecycle::LifecycleState;
pub use routes::{RouteRule, RouteTable, StrategyKind};
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use store::{CacheEntry, CacheStore, NamespaceHandle, RequestKey};
pub use sync::{FileQueueStore, PendingAction, QueueStore, SyncQueue};

/// Get the base Deskline cache directory
///
/// Returns a path like:
/// - Linux: `~/.cache/deskline`
/// - macOS: `~/Library/Caches/deskline`
/// - Windows: `C:\Users\{user}\AppData\Local\deskline\cache`
pub fn get_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .ok_or(Error::CacheDirectoryNotFound)
        .map(|dir| dir.join("deskline"))
}

/// Ensure a directory exists, creating it if necessary
pub(crate) async fn ensure_dir(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if tokio::fs::metadata(path).await.is_err() {
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}
