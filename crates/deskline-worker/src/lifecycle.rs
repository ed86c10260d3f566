//! Worker lifecycle management
//!
//! Install precaches the app shell, activate garbage-collects namespaces
//! from prior versions, matching the install/activate/terminate lifecycle
//! of the hosting runtime. Transitions are serialized behind a mutex; the
//! runtime guarantees install and activate never overlap, and the mutex
//! keeps that true for embedders driving the worker directly.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use deskline_fetch::{FetchRequest, Method, NetworkFetch};

use crate::config::WorkerConfig;
use crate::store::{CacheStore, RequestKey};
use crate::{Error, Result};

/// Lifecycle states of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Precaching the app shell
    Installing,
    /// Installed, waiting to take control of clients
    Waiting,
    /// In control; old namespaces have been purged
    Active,
    /// Replaced by a newer worker
    Redundant,
}

/// Drives the install/activate state machine
#[derive(Debug)]
pub struct Lifecycle {
    config: WorkerConfig,
    state: Mutex<LifecycleState>,
}

impl Lifecycle {
    /// Create a lifecycle manager in the Installing state
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(LifecycleState::Installing),
        }
    }

    /// Current lifecycle state
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// Precache the app shell.
    ///
    /// Every manifest resource is fetched before anything is written, so a
    /// single failed fetch fails the whole install and leaves no partial
    /// shell behind. On success the worker moves to Waiting.
    pub async fn install(
        &self,
        store: &CacheStore,
        fetcher: &Arc<dyn NetworkFetch>,
        timeout: Duration,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        info!(
            "Installing worker {} ({} precache resources)",
            self.config.version,
            self.config.precache_manifest.len()
        );

        // Fetch everything first; fail atomically.
        let mut snapshots = Vec::with_capacity(self.config.precache_manifest.len());
        for path in &self.config.precache_manifest {
            let url = self.config.resolve(path);
            let request = FetchRequest::get(&url);
            let response = tokio::time::timeout(timeout, fetcher.fetch(&request))
                .await
                .map_err(|_| Error::install_resource(path))?
                .map_err(|e| {
                    warn!("Precache fetch for {path} failed: {e}");
                    Error::install_resource(path)
                })?;
            if !response.is_ok() {
                warn!("Precache fetch for {path} answered {}", response.status);
                return Err(Error::install_resource(path));
            }
            snapshots.push((RequestKey::new(Method::Get, &url), path.clone(), response));
        }

        let shell = store.open(&self.config.shell_namespace()).await?;
        let offline = store.open(&self.config.offline_namespace()).await?;
        for (key, path, response) in &snapshots {
            shell.put(key, response).await?;
            if path == &self.config.offline_page {
                offline.put(key, response).await?;
            }
        }

        *state = LifecycleState::Waiting;
        info!("Install complete; worker is waiting");
        Ok(())
    }

    /// Delete every namespace not belonging to the current version and
    /// take control. Idempotent: running it twice yields the same
    /// namespace set.
    pub async fn activate(&self, store: &CacheStore) -> Result<()> {
        let mut state = self.state.lock().await;
        let keep = self.config.current_namespaces();

        for namespace in store.list_namespaces().await? {
            if !keep.contains(&namespace) {
                debug!("Deleting stale namespace {namespace}");
                store.delete_namespace(&namespace).await?;
            }
        }

        *state = LifecycleState::Active;
        info!("Worker {} active", self.config.version);
        Ok(())
    }

    /// Force immediate activation, skipping the Waiting state.
    ///
    /// Driven by the `SKIP_WAITING` client message; runs the same
    /// namespace cleanup as a normal activation.
    pub async fn skip_waiting(&self, store: &CacheStore) -> Result<()> {
        debug!("SKIP_WAITING requested");
        self.activate(store).await
    }

    /// Mark this worker as replaced by a newer version
    pub async fn retire(&self) {
        let mut state = self.state.lock().await;
        *state = LifecycleState::Redundant;
        info!("Worker {} retired", self.config.version);
    }
}
