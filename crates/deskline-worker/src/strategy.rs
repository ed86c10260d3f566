//! Strategy executors
//!
//! The five interchangeable algorithms that combine cache access with a
//! network call, each encoding a different consistency/latency trade-off.
//! Every network call is bounded by the configured timeout; an elapsed
//! timeout counts as the network being unavailable.
//!
//! A cache write failure never fails the request: the response was already
//! obtained from the network, so the write is logged and swallowed. The
//! stale-while-revalidate refresh is the only work permitted to outlive
//! the request that started it.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use deskline_fetch::{FetchRequest, FetchResponse, NetworkFetch};

use crate::routes::StrategyKind;
use crate::stats::CacheStats;
use crate::store::{NamespaceHandle, RequestKey};
use crate::{Error, Result};

/// Execute the given strategy for a request against one cache namespace
pub async fn execute(
    kind: StrategyKind,
    request: &FetchRequest,
    cache: &NamespaceHandle,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    match kind {
        StrategyKind::CacheFirst => cache_first(request, cache, fetcher, timeout, stats).await,
        StrategyKind::NetworkFirst => network_first(request, cache, fetcher, timeout, stats).await,
        StrategyKind::StaleWhileRevalidate => {
            stale_while_revalidate(request, cache, fetcher, timeout, stats).await
        }
        StrategyKind::NetworkOnly => network_only(request, fetcher, timeout, stats).await,
        StrategyKind::CacheOnly => cache_only(request, cache, stats).await,
    }
}

/// Issue the network call under the configured bound.
///
/// Timeouts and transport failures collapse into
/// [`Error::NetworkUnavailable`]; anything else propagates as-is.
async fn fetch_bounded(
    request: &FetchRequest,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    stats.record_network_fetch();
    match tokio::time::timeout(timeout, fetcher.fetch(request)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(e)) if e.is_network_unavailable() => {
            debug!("Network unavailable for {}: {e}", request.url);
            Err(Error::network_unavailable(&request.url))
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            debug!("Network call for {} exceeded {timeout:?}", request.url);
            Err(Error::network_unavailable(&request.url))
        }
    }
}

/// Store a successful response, swallowing write failures
async fn write_through(cache: &NamespaceHandle, key: &RequestKey, response: &FetchResponse) {
    if !response.is_ok() {
        return;
    }
    if let Err(e) = cache.put(key, response).await {
        warn!("Cache write for {key} failed: {e}");
    }
}

/// Cached entry if present, network otherwise. Immutable static assets.
async fn cache_first(
    request: &FetchRequest,
    cache: &NamespaceHandle,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    let key = RequestKey::for_request(request);
    if let Some(entry) = cache.get(&key).await? {
        stats.record_hit();
        return Ok(entry.into_response());
    }
    stats.record_miss();

    let response = fetch_bounded(request, fetcher, timeout, stats).await?;
    write_through(cache, &key, &response).await;
    Ok(response)
}

/// Network when reachable, cache when it is not. API traffic.
async fn network_first(
    request: &FetchRequest,
    cache: &NamespaceHandle,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    let key = RequestKey::for_request(request);
    match fetch_bounded(request, fetcher, timeout, stats).await {
        Ok(response) => {
            write_through(cache, &key, &response).await;
            Ok(response)
        }
        Err(Error::NetworkUnavailable { .. }) => match cache.get(&key).await? {
            Some(entry) => {
                stats.record_hit();
                debug!("Serving stale cache for {key} while offline");
                Ok(entry.into_response())
            }
            None => {
                stats.record_miss();
                Err(Error::network_unavailable(&request.url))
            }
        },
        Err(e) => Err(e),
    }
}

/// Serve stale immediately, refresh the cache in the background.
///
/// On a hit the revalidation fetch runs in a spawned task and may
/// complete after this call returns; the refreshed value is visible to
/// the next request for the same key.
async fn stale_while_revalidate(
    request: &FetchRequest,
    cache: &NamespaceHandle,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    let key = RequestKey::for_request(request);
    if let Some(entry) = cache.get(&key).await? {
        stats.record_hit();

        let revalidate_request = request.clone();
        let revalidate_cache = cache.clone();
        let revalidate_fetcher = Arc::clone(fetcher);
        let revalidate_stats = stats.clone();
        tokio::spawn(async move {
            let key = RequestKey::for_request(&revalidate_request);
            match fetch_bounded(
                &revalidate_request,
                &revalidate_fetcher,
                timeout,
                &revalidate_stats,
            )
            .await
            {
                Ok(response) => write_through(&revalidate_cache, &key, &response).await,
                Err(e) => debug!("Revalidation for {key} failed: {e}"),
            }
        });

        return Ok(entry.into_response());
    }
    stats.record_miss();

    let response = fetch_bounded(request, fetcher, timeout, stats).await?;
    write_through(cache, &key, &response).await;
    Ok(response)
}

/// Straight to the network; the cache is never consulted or written.
async fn network_only(
    request: &FetchRequest,
    fetcher: &Arc<dyn NetworkFetch>,
    timeout: Duration,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    fetch_bounded(request, fetcher, timeout, stats).await
}

/// Cache or nothing; a miss is a distinct failure, not a network error.
async fn cache_only(
    request: &FetchRequest,
    cache: &NamespaceHandle,
    stats: &CacheStats,
) -> Result<FetchResponse> {
    let key = RequestKey::for_request(request);
    match cache.get(&key).await? {
        Some(entry) => {
            stats.record_hit();
            Ok(entry.into_response())
        }
        None => {
            stats.record_miss();
            Err(Error::no_cached_response(key.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::CacheStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Scripted fetcher: counts calls, optionally fails, serves a fixed body
    struct MockFetcher {
        calls: AtomicUsize,
        offline: AtomicBool,
        status: u16,
        body: &'static [u8],
    }

    impl MockFetcher {
        fn serving(body: &'static [u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                offline: AtomicBool::new(false),
                status: 200,
                body,
            }
        }

        fn offline() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                offline: AtomicBool::new(true),
                status: 200,
                body: b"",
            }
        }

        fn with_status(mut self, status: u16) -> Self {
            self.status = status;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NetworkFetch for MockFetcher {
        async fn fetch(&self, request: &FetchRequest) -> deskline_fetch::Result<FetchResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.offline.load(Ordering::SeqCst) {
                return Err(deskline_fetch::Error::timeout(&request.url));
            }
            Ok(FetchResponse::synthetic(
                self.status,
                "application/json",
                self.body,
            ))
        }
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    async fn namespace() -> (TempDir, NamespaceHandle) {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::with_base_dir(temp.path()).await.unwrap();
        let ns = store.open("test-v1").await.unwrap();
        (temp, ns)
    }

    #[tokio::test]
    async fn cache_first_serves_hit_without_network() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/static/js/bundle.js");
        let key = RequestKey::for_request(&request);
        ns.put(&key, &FetchResponse::synthetic(200, "text/javascript", &b"cached"[..]))
            .await
            .unwrap();

        let mock = MockFetcher::serving(b"fresh");
        let fetcher: Arc<dyn NetworkFetch> = Arc::new(mock);

        let response = execute(StrategyKind::CacheFirst, &request, &ns, &fetcher, TIMEOUT, &stats)
            .await
            .unwrap();

        assert_eq!(&response.body[..], b"cached");
        assert_eq!(stats.snapshot().network_fetches, 0);
    }

    #[tokio::test]
    async fn cache_first_fills_cache_on_miss() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/static/css/main.css");
        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::serving(b"body{}"));

        let response = execute(StrategyKind::CacheFirst, &request, &ns, &fetcher, TIMEOUT, &stats)
            .await
            .unwrap();
        assert_eq!(&response.body[..], b"body{}");

        let key = RequestKey::for_request(&request);
        assert!(ns.contains(&key).await);
    }

    #[tokio::test]
    async fn network_first_prefers_fresh_response() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/api/v1/tickets");
        let key = RequestKey::for_request(&request);
        ns.put(&key, &FetchResponse::synthetic(200, "application/json", &b"stale"[..]))
            .await
            .unwrap();

        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::serving(b"fresh"));
        let response = execute(
            StrategyKind::NetworkFirst,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        assert_eq!(&response.body[..], b"fresh");
        // The cache now holds the fresh copy
        let entry = ns.get(&key).await.unwrap().unwrap();
        assert_eq!(&entry.body[..], b"fresh");
    }

    #[tokio::test]
    async fn network_first_falls_back_to_cache_when_offline() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/api/v1/tickets/42");
        let key = RequestKey::for_request(&request);
        ns.put(&key, &FetchResponse::synthetic(200, "application/json", &b"stale"[..]))
            .await
            .unwrap();

        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::offline());
        let response = execute(
            StrategyKind::NetworkFirst,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        assert_eq!(&response.body[..], b"stale");
    }

    #[tokio::test]
    async fn network_first_fails_with_no_cache_and_no_network() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/api/v1/tickets");
        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::offline());

        let err = execute(
            StrategyKind::NetworkFirst,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NetworkUnavailable { .. }));
    }

    #[tokio::test]
    async fn network_first_does_not_cache_error_responses() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/api/v1/tickets");
        let fetcher: Arc<dyn NetworkFetch> =
            Arc::new(MockFetcher::serving(b"gone").with_status(404));

        let response = execute(
            StrategyKind::NetworkFirst,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        // The error is returned to the caller but never persisted
        assert_eq!(response.status, 404);
        assert!(!ns.contains(&RequestKey::for_request(&request)).await);
    }

    #[tokio::test]
    async fn stale_while_revalidate_serves_stale_then_refreshes() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/dashboard");
        let key = RequestKey::for_request(&request);
        ns.put(&key, &FetchResponse::synthetic(200, "text/html", &b"stale page"[..]))
            .await
            .unwrap();

        let mock = Arc::new(MockFetcher::serving(b"fresh page"));
        let fetcher: Arc<dyn NetworkFetch> = mock.clone();

        let response = execute(
            StrategyKind::StaleWhileRevalidate,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        // Stale copy returned without waiting on the revalidation
        assert_eq!(&response.body[..], b"stale page");

        // Wait for the background refresh to land
        let mut refreshed = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(entry) = ns.get(&key).await.unwrap() {
                if &entry.body[..] == b"fresh page" {
                    refreshed = true;
                    break;
                }
            }
        }
        assert!(refreshed, "revalidation never updated the cache");
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn stale_while_revalidate_fetches_directly_on_miss() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/tickets");
        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::serving(b"ticket list"));

        let response = execute(
            StrategyKind::StaleWhileRevalidate,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        assert_eq!(&response.body[..], b"ticket list");
        assert!(ns.contains(&RequestKey::for_request(&request)).await);
    }

    #[tokio::test]
    async fn network_only_never_touches_cache() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/live/feed");
        let fetcher: Arc<dyn NetworkFetch> = Arc::new(MockFetcher::serving(b"live"));

        let response = execute(
            StrategyKind::NetworkOnly,
            &request,
            &ns,
            &fetcher,
            TIMEOUT,
            &stats,
        )
        .await
        .unwrap();

        assert_eq!(&response.body[..], b"live");
        assert!(!ns.contains(&RequestKey::for_request(&request)).await);
    }

    #[tokio::test]
    async fn cache_only_raises_distinct_failure_on_empty_cache() {
        let (_temp, ns) = namespace().await;
        let stats = CacheStats::new();
        let request = FetchRequest::get("https://app.deskline.io/static/logo.png");
        let mock = Arc::new(MockFetcher::serving(b"never served"));
        let fetcher: Arc<dyn NetworkFetch> = mock.clone();

        let err = execute(StrategyKind::CacheOnly, &request, &ns, &fetcher, TIMEOUT, &stats)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NoCachedResponse { .. }));
        // The network was never consulted
        assert_eq!(mock.calls(), 0);
    }
}
