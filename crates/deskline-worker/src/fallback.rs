//! Offline fallback handling
//!
//! The terminal error boundary of the worker: when every strategy path
//! has failed, this module still produces a response. Policy, in order:
//! an offline page for navigations, a stale API snapshot for API calls,
//! and a synthetic 503 JSON error for everything else.
//!
//! Nothing in here may fail; cache errors during fallback degrade to the
//! next step of the chain.

use serde_json::json;
use tracing::{debug, warn};

use deskline_fetch::{FetchRequest, FetchResponse, Method};

use crate::config::WorkerConfig;
use crate::stats::CacheStats;
use crate::store::{CacheStore, RequestKey};

/// Produce a best-effort response for a request that could not be served
pub async fn fallback(
    request: &FetchRequest,
    store: &CacheStore,
    config: &WorkerConfig,
    stats: &CacheStats,
) -> FetchResponse {
    stats.record_fallback();

    // Navigations get the precached offline page
    if request.is_navigation() {
        if let Some(page) = offline_page(store, config).await {
            debug!("Serving offline page for navigation to {}", request.url);
            return page;
        }
    }

    // API calls get whatever was last cached for that exact request
    if request.path().starts_with(&config.api_prefix) {
        if let Some(stale) = stale_api_entry(request, store, config).await {
            debug!("Serving stale API snapshot for {}", request.url);
            return stale;
        }
    }

    debug!("Synthesizing offline error for {}", request.url);
    offline_error()
}

/// The precached offline page, if install ever stored one
async fn offline_page(store: &CacheStore, config: &WorkerConfig) -> Option<FetchResponse> {
    let namespace = match store.open(&config.offline_namespace()).await {
        Ok(ns) => ns,
        Err(e) => {
            warn!("Could not open offline namespace: {e}");
            return None;
        }
    };
    let key = RequestKey::new(Method::Get, &config.resolve(&config.offline_page));
    match namespace.get(&key).await {
        Ok(entry) => entry.map(super::store::CacheEntry::into_response),
        Err(e) => {
            warn!("Offline page lookup failed: {e}");
            None
        }
    }
}

/// A previously cached response for this exact API request
async fn stale_api_entry(
    request: &FetchRequest,
    store: &CacheStore,
    config: &WorkerConfig,
) -> Option<FetchResponse> {
    let namespace = match store.open(&config.api_namespace()).await {
        Ok(ns) => ns,
        Err(e) => {
            warn!("Could not open API namespace: {e}");
            return None;
        }
    };
    let key = RequestKey::for_request(request);
    match namespace.get(&key).await {
        Ok(entry) => entry.map(super::store::CacheEntry::into_response),
        Err(e) => {
            warn!("Stale API lookup failed: {e}");
            None
        }
    }
}

/// The absolute last resort: a well-formed 503 with a JSON body
fn offline_error() -> FetchResponse {
    let body = json!({
        "error": "Offline",
        "message": "You appear to be offline and this content is not cached.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });
    FetchResponse::synthetic(503, "application/json", body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, CacheStore, WorkerConfig, CacheStats) {
        let temp = TempDir::new().unwrap();
        let store = CacheStore::with_base_dir(temp.path()).await.unwrap();
        (temp, store, WorkerConfig::default(), CacheStats::new())
    }

    #[tokio::test]
    async fn navigation_gets_offline_page_when_precached() {
        let (_temp, store, config, stats) = setup().await;
        let ns = store.open(&config.offline_namespace()).await.unwrap();
        let key = RequestKey::new(Method::Get, &config.resolve(&config.offline_page));
        ns.put(&key, &FetchResponse::synthetic(200, "text/html", &b"<h1>Offline</h1>"[..]))
            .await
            .unwrap();

        let request = FetchRequest::get(format!("{}/tickets", config.origin))
            .with_header("Accept", "text/html");
        let response = fallback(&request, &store, &config, &stats).await;

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"<h1>Offline</h1>");
    }

    #[tokio::test]
    async fn api_request_gets_stale_snapshot() {
        let (_temp, store, config, stats) = setup().await;
        let ns = store.open(&config.api_namespace()).await.unwrap();
        let request = FetchRequest::get(format!("{}/api/v1/tickets/42", config.origin));
        let key = RequestKey::for_request(&request);
        ns.put(&key, &FetchResponse::synthetic(200, "application/json", &b"{\"id\":42}"[..]))
            .await
            .unwrap();

        let response = fallback(&request, &store, &config, &stats).await;
        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"{\"id\":42}");
    }

    #[tokio::test]
    async fn everything_else_gets_503_json() {
        let (_temp, store, config, stats) = setup().await;
        let request = FetchRequest::get(format!("{}/api/v1/never-seen", config.origin));

        let response = fallback(&request, &store, &config, &stats).await;
        assert_eq!(response.status, 503);
        assert_eq!(response.header("content-type"), Some("application/json"));

        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body["error"], "Offline");
        assert!(body["message"].is_string());
        // Timestamp must parse as RFC 3339 / ISO 8601
        let ts = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[tokio::test]
    async fn navigation_without_offline_page_still_gets_a_response() {
        let (_temp, store, config, stats) = setup().await;
        let request = FetchRequest::get(format!("{}/dashboard", config.origin))
            .with_header("Accept", "text/html");

        let response = fallback(&request, &store, &config, &stats).await;
        assert_eq!(response.status, 503);
        assert_eq!(stats.snapshot().fallbacks_served, 1);
    }
}
