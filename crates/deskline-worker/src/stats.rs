//! Worker statistics tracking
//!
//! Lightweight atomic counters shared across strategy executions, the
//! dispatcher and the sync queue. Cheap enough to be always on; the
//! snapshot is what a diagnostics page would render.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for cache and network activity
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
    network_fetches: Arc<AtomicU64>,
    fallbacks_served: Arc<AtomicU64>,
    replay_successes: Arc<AtomicU64>,
    replay_failures: Arc<AtomicU64>,
}

/// Point-in-time snapshot of [`CacheStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsSnapshot {
    /// Requests answered from a cache namespace
    pub hits: u64,
    /// Cache lookups that found nothing
    pub misses: u64,
    /// Requests that went out over the network
    pub network_fetches: u64,
    /// Responses produced by the offline fallback chain
    pub fallbacks_served: u64,
    /// Queued actions replayed successfully
    pub replay_successes: u64,
    /// Queued action replays that failed
    pub replay_failures: u64,
    /// Hit rate over all cache lookups, 0.0 to 100.0
    pub hit_rate: f64,
}

impl CacheStats {
    /// Create a zeroed stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cache hit
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a network fetch attempt
    pub fn record_network_fetch(&self) {
        self.network_fetches.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fallback response
    pub fn record_fallback(&self) {
        self.fallbacks_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful queue replay
    pub fn record_replay_success(&self) {
        self.replay_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed queue replay
    pub fn record_replay_failure(&self) {
        self.replay_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of the current counters
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            hits as f64 / lookups as f64 * 100.0
        };

        CacheStatsSnapshot {
            hits,
            misses,
            network_fetches: self.network_fetches.load(Ordering::Relaxed),
            fallbacks_served: self.fallbacks_served.load(Ordering::Relaxed),
            replay_successes: self.replay_successes.load(Ordering::Relaxed),
            replay_failures: self.replay_failures.load(Ordering::Relaxed),
            hit_rate,
        }
    }
}
