//! Background sync queue
//!
//! Mutations that could not reach the network are captured as pending
//! actions and replayed, in insertion order, when connectivity returns.
//! Replay is at-least-once; every action carries a random idempotency key
//! that is attached to the replayed request so the server can drop
//! duplicates.
//!
//! The queue is durable: actions are stored one JSON document per file,
//! named by creation time so directory order is insertion order. A replay
//! failure for one action never aborts the rest of the batch.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use deskline_fetch::{FetchRequest, NetworkFetch};

use crate::stats::CacheStats;
use crate::{Error, Result, ensure_dir};

/// Header carrying the action id on replayed requests
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

/// Lifecycle state of a pending action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionStatus {
    /// Waiting for the next sync trigger
    Pending,
    /// Currently being replayed
    InFlight,
    /// Replayed successfully (transient; the action is removed)
    Done,
    /// Gave up after the configured number of attempts
    Failed,
}

/// Process-wide capture counter; breaks filename ties within one
/// millisecond so insertion order is never ambiguous.
static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

/// An offline-captured mutation awaiting replay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Random 128-bit id, doubling as the idempotency key
    pub id: String,
    /// Capture sequence number within this process
    pub seq: u64,
    /// Target URL
    pub url: String,
    /// HTTP method
    pub method: deskline_fetch::Method,
    /// Request headers
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Option<bytes::Bytes>,
    /// Capture time
    pub created_at: DateTime<Utc>,
    /// Current status
    pub status: ActionStatus,
    /// Replay attempts so far
    pub attempts: u32,
}

impl PendingAction {
    /// Capture a request as a pending action
    pub fn capture(request: &FetchRequest) -> Self {
        let mut raw = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut raw);
        Self {
            id: hex::encode(raw),
            seq: CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed),
            url: request.url.clone(),
            method: request.method,
            headers: request.headers.clone(),
            body: request.body.clone(),
            created_at: Utc::now(),
            status: ActionStatus::Pending,
            attempts: 0,
        }
    }

    /// Rebuild the request for replay, with the idempotency key attached
    pub fn to_request(&self) -> FetchRequest {
        let mut request = FetchRequest::new(self.method, &self.url);
        request.headers = self.headers.clone();
        request.body = self.body.clone();
        request.with_header(IDEMPOTENCY_HEADER, &self.id)
    }
}

/// Durable storage contract for pending actions
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a newly captured action
    async fn enqueue(&self, action: &PendingAction) -> Result<()>;

    /// All actions not yet done or failed, in insertion order
    async fn list_pending(&self) -> Result<Vec<PendingAction>>;

    /// Rewrite an existing action (status/attempt changes)
    async fn update(&self, action: &PendingAction) -> Result<()>;

    /// Remove an action by id. Returns true if it existed.
    async fn remove(&self, id: &str) -> Result<bool>;
}

/// File-backed [`QueueStore`]: one JSON document per action
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    dir: PathBuf,
}

impl FileQueueStore {
    /// Create a store under the given directory
    pub async fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        ensure_dir(&dir).await?;
        debug!("Initialized sync queue at: {:?}", dir);
        Ok(Self { dir })
    }

    /// Deterministic filename: creation time first so directory order is
    /// insertion order.
    fn action_path(&self, action: &PendingAction) -> PathBuf {
        self.dir.join(format!(
            "{:020}-{:06}-{}.json",
            action.created_at.timestamp_millis(),
            action.seq,
            action.id
        ))
    }

    async fn write_action(&self, action: &PendingAction) -> Result<()> {
        let path = self.action_path(action);
        let payload = serde_json::to_vec(action)?;
        let temp_path = path.with_extension("tmp");
        let result = async {
            tokio::fs::write(&temp_path, &payload).await?;
            tokio::fs::rename(&temp_path, &path).await?;
            Ok::<(), std::io::Error>(())
        }
        .await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(&temp_path).await;
        }
        result?;
        Ok(())
    }

    async fn sorted_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

#[async_trait]
impl QueueStore for FileQueueStore {
    async fn enqueue(&self, action: &PendingAction) -> Result<()> {
        debug!("Queueing {} {} as action {}", action.method, action.url, action.id);
        self.write_action(action).await
    }

    async fn list_pending(&self) -> Result<Vec<PendingAction>> {
        let mut actions = Vec::new();
        for path in self.sorted_files().await? {
            let raw = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<PendingAction>(&raw) {
                Ok(action) => {
                    if matches!(action.status, ActionStatus::Pending | ActionStatus::InFlight) {
                        actions.push(action);
                    }
                }
                Err(e) => warn!("Skipping corrupt queue entry {path:?}: {e}"),
            }
        }
        Ok(actions)
    }

    async fn update(&self, action: &PendingAction) -> Result<()> {
        self.write_action(action).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        for path in self.sorted_files().await? {
            let matches_id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| stem.ends_with(id));
            if matches_id {
                tokio::fs::remove_file(&path).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Replays queued actions when connectivity returns
#[derive(Debug, Clone)]
pub struct SyncQueue<S: QueueStore> {
    store: S,
    max_attempts: u32,
}

impl<S: QueueStore> SyncQueue<S> {
    /// Create a queue over the given store
    pub fn new(store: S, max_attempts: u32) -> Self {
        Self {
            store,
            max_attempts,
        }
    }

    /// Capture a request that could not reach the network
    pub async fn capture(&self, request: &FetchRequest) -> Result<PendingAction> {
        let action = PendingAction::capture(request);
        self.store.enqueue(&action).await?;
        Ok(action)
    }

    /// Pending actions in insertion order
    pub async fn pending(&self) -> Result<Vec<PendingAction>> {
        self.store.list_pending().await
    }

    /// Replay every pending action against the network.
    ///
    /// Successes are removed from the queue; failures stay queued for the
    /// next sync trigger until they exhaust their attempts, at which point
    /// they are marked failed. One action's failure never stops the batch.
    /// Returns the number of actions replayed successfully.
    pub async fn process(
        &self,
        fetcher: &Arc<dyn NetworkFetch>,
        timeout: Duration,
        stats: &CacheStats,
    ) -> Result<usize> {
        let pending = self.store.list_pending().await?;
        if pending.is_empty() {
            return Ok(0);
        }
        info!("Replaying {} queued action(s)", pending.len());

        let mut replayed = 0;
        for mut action in pending {
            action.status = ActionStatus::InFlight;
            if let Err(e) = self.store.update(&action).await {
                warn!("Could not mark action {} in-flight: {e}", action.id);
            }

            match self.replay_one(&action, fetcher, timeout).await {
                Ok(()) => {
                    stats.record_replay_success();
                    self.store.remove(&action.id).await?;
                    debug!("Action {} replayed and removed", action.id);
                    replayed += 1;
                }
                Err(e) => {
                    stats.record_replay_failure();
                    action.attempts += 1;
                    action.status = if action.attempts >= self.max_attempts {
                        warn!(
                            "Action {} failed permanently after {} attempts: {e}",
                            action.id, action.attempts
                        );
                        ActionStatus::Failed
                    } else {
                        debug!(
                            "Action {} failed (attempt {}), keeping queued: {e}",
                            action.id, action.attempts
                        );
                        ActionStatus::Pending
                    };
                    if let Err(e) = self.store.update(&action).await {
                        warn!("Could not persist failure for action {}: {e}", action.id);
                    }
                }
            }
        }
        Ok(replayed)
    }

    async fn replay_one(
        &self,
        action: &PendingAction,
        fetcher: &Arc<dyn NetworkFetch>,
        timeout: Duration,
    ) -> Result<()> {
        let request = action.to_request();
        let response = tokio::time::timeout(timeout, fetcher.fetch(&request))
            .await
            .map_err(|_| Error::sync_replay(&action.id, "replay timed out"))?
            .map_err(|e| Error::sync_replay(&action.id, e.to_string()))?;

        if response.is_ok() {
            Ok(())
        } else {
            Err(Error::sync_replay(
                &action.id,
                format!("server answered {}", response.status),
            ))
        }
    }
}
