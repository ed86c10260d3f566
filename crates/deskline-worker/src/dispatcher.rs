//! Request dispatching
//!
//! [`OfflineWorker`] is the single entry point for every intercepted
//! request: it resolves the governing strategy, executes it against the
//! right namespace, and falls back to the offline handler on any failure,
//! so the page always receives a response and never an unhandled error.
//!
//! The worker owns all process-wide state of the caching layer (cache
//! store, sync queue, lifecycle, counters); nothing else writes to them.

use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use deskline_fetch::{FetchRequest, FetchResponse, Method, NetworkFetch};

use crate::config::WorkerConfig;
use crate::fallback;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::messages::{ClientMessage, WorkerReply};
use crate::routes::RouteTable;
use crate::stats::{CacheStats, CacheStatsSnapshot};
use crate::store::{CacheStore, NamespaceHandle};
use crate::strategy;
use crate::sync::{FileQueueStore, PendingAction, QueueStore, SyncQueue};
use crate::{Result, get_cache_dir};

/// The offline caching worker
///
/// Constructed once per process and shared by reference across tasks.
pub struct OfflineWorker<S: QueueStore = FileQueueStore> {
    store: CacheStore,
    fetcher: Arc<dyn NetworkFetch>,
    routes: RouteTable,
    config: WorkerConfig,
    lifecycle: Lifecycle,
    queue: SyncQueue<S>,
    stats: CacheStats,
}

impl OfflineWorker<FileQueueStore> {
    /// Create a worker with platform-default storage locations
    pub async fn new(config: WorkerConfig, fetcher: Arc<dyn NetworkFetch>) -> Result<Self> {
        let base = get_cache_dir()?;
        Self::with_base_dir(base, config, fetcher).await
    }

    /// Create a worker rooted at a custom directory.
    ///
    /// Caches live under `{base}/caches`, the sync queue under
    /// `{base}/queue`; the queue is outside the namespace directory so
    /// activation cleanup can never touch it.
    pub async fn with_base_dir(
        base: impl AsRef<Path>,
        config: WorkerConfig,
        fetcher: Arc<dyn NetworkFetch>,
    ) -> Result<Self> {
        let base = base.as_ref();
        let store = CacheStore::with_base_dir(base.join("caches")).await?;
        let queue_store = FileQueueStore::new(base.join("queue")).await?;
        let queue = SyncQueue::new(queue_store, config.max_replay_attempts);
        Ok(Self {
            lifecycle: Lifecycle::new(config.clone()),
            store,
            fetcher,
            routes: RouteTable::default(),
            config,
            queue,
            stats: CacheStats::new(),
        })
    }
}

impl<S: QueueStore> OfflineWorker<S> {
    /// Replace the default route table
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// The worker configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The cache store owned by this worker
    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Current lifecycle state
    pub async fn state(&self) -> LifecycleState {
        self.lifecycle.state().await
    }

    /// Snapshot of the worker's counters
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    /// Precache the app shell (install phase)
    pub async fn install(&self) -> Result<()> {
        self.lifecycle
            .install(&self.store, &self.fetcher, self.config.network_timeout)
            .await
    }

    /// Purge stale namespaces and take control (activate phase)
    pub async fn activate(&self) -> Result<()> {
        self.lifecycle.activate(&self.store).await
    }

    /// Handle one intercepted request. Total: always produces a response.
    pub async fn handle(&self, request: &FetchRequest) -> FetchResponse {
        // Only GET requests over http(s) are managed by the cache.
        if !request.is_http() || request.method != Method::Get {
            return self.pass_through(request).await;
        }

        let strategy = self.routes.resolve(&request.path());
        debug!("{} {} via {strategy:?}", request.method, request.url);

        let result = match self.namespace_for(request).await {
            Ok(namespace) => {
                strategy::execute(
                    strategy,
                    request,
                    &namespace,
                    &self.fetcher,
                    self.config.network_timeout,
                    &self.stats,
                )
                .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => response,
            Err(e) => {
                debug!("Strategy {strategy:?} failed for {}: {e}", request.url);
                fallback::fallback(request, &self.store, &self.config, &self.stats).await
            }
        }
    }

    /// Handle a control message from a client page
    pub async fn on_message(&self, message: ClientMessage) -> Result<Option<WorkerReply>> {
        match message {
            ClientMessage::SkipWaiting => {
                self.lifecycle.skip_waiting(&self.store).await?;
                Ok(None)
            }
            ClientMessage::GetVersion => Ok(Some(WorkerReply::Version {
                version: self.config.shell_namespace(),
            })),
        }
    }

    /// Replay the sync queue; invoked when connectivity returns.
    ///
    /// Returns the number of actions replayed successfully.
    pub async fn process_queue(&self) -> Result<usize> {
        self.queue
            .process(&self.fetcher, self.config.network_timeout, &self.stats)
            .await
    }

    /// Pending actions awaiting replay
    pub async fn pending_actions(&self) -> Result<Vec<PendingAction>> {
        self.queue.pending().await
    }

    /// API requests get the API namespace; everything else shares the
    /// app-shell namespace.
    async fn namespace_for(&self, request: &FetchRequest) -> Result<NamespaceHandle> {
        let namespace = if request.path().starts_with(&self.config.api_prefix) {
            self.config.api_namespace()
        } else {
            self.config.shell_namespace()
        };
        self.store.open(&namespace).await
    }

    /// Forward an unmanaged request straight to the network.
    ///
    /// A mutation that cannot reach the network is captured into the sync
    /// queue and acknowledged with a synthetic 202 so the page still gets
    /// a response while offline.
    async fn pass_through(&self, request: &FetchRequest) -> FetchResponse {
        self.stats.record_network_fetch();
        let result =
            tokio::time::timeout(self.config.network_timeout, self.fetcher.fetch(request)).await;

        match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) if !e.is_network_unavailable() => {
                warn!("Unmanaged request to {} failed: {e}", request.url);
                fallback::fallback(request, &self.store, &self.config, &self.stats).await
            }
            // Timeout or unreachable network
            _ => {
                if request.method.is_mutation() {
                    match self.queue.capture(request).await {
                        Ok(action) => {
                            debug!("Captured offline mutation as action {}", action.id);
                            return queued_response(&action);
                        }
                        Err(e) => warn!("Could not queue offline mutation: {e}"),
                    }
                }
                fallback::fallback(request, &self.store, &self.config, &self.stats).await
            }
        }
    }
}

/// Acknowledgement for a mutation captured while offline
fn queued_response(action: &PendingAction) -> FetchResponse {
    let body = json!({
        "status": "queued",
        "id": action.id,
        "message": "You are offline; the change was queued and will sync automatically.",
    });
    FetchResponse::synthetic(202, "application/json", body.to_string())
}
