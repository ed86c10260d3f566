//! HTTP fetcher implementation
//!
//! The [`NetworkFetch`] trait is the contract the caching strategies depend
//! on; [`HttpFetcher`] is the production implementation. Every request is
//! wrapped in a bounded timeout so a stalled connection cannot hang a
//! strategy indefinitely.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::types::{FetchRequest, FetchResponse, Method};

/// Default request timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum retries (0 = no retries)
const DEFAULT_MAX_RETRIES: u32 = 0;

/// Default initial backoff in milliseconds
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;

/// Default maximum backoff in milliseconds
const DEFAULT_MAX_BACKOFF_MS: u64 = 5_000;

/// Default jitter factor (0.0 to 1.0)
const DEFAULT_JITTER_FACTOR: f64 = 0.1;

/// Network fetch capability
///
/// The offline worker only ever talks to the network through this trait,
/// which lets tests substitute a scripted fetcher and keeps the strategy
/// executors independent of any particular HTTP client.
#[async_trait]
pub trait NetworkFetch: Send + Sync {
    /// Issue a request and buffer the full response.
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// reqwest-backed [`NetworkFetch`] implementation
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
    jitter_factor: f64,
    user_agent: Option<String>,
}

impl HttpFetcher {
    /// Create a fetcher with default settings
    pub fn new() -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            user_agent: None,
        })
    }

    /// Create a fetcher with a custom reqwest client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            jitter_factor: DEFAULT_JITTER_FACTOR,
            user_agent: None,
        }
    }

    /// Set the per-request timeout.
    ///
    /// Default is 10 seconds. A request that does not complete within this
    /// window fails with [`Error::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum number of retries for failed requests.
    ///
    /// Default is 0. Only connection errors, timeouts and 5xx responses are
    /// retried; replayed mutations carry an idempotency key so retrying is
    /// safe for them as well.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the initial backoff duration in milliseconds.
    ///
    /// Default is 100ms. Backoff doubles on each retry up to the cap.
    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Set a custom user agent string
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Backoff duration for a retry attempt, with jitter
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn backoff(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff_ms as f64 * 2.0_f64.powi(attempt as i32);
        let capped = base.min(self.max_backoff_ms as f64);
        let jitter_range = capped * self.jitter_factor;
        let jitter = rand::random::<f64>() * 2.0 * jitter_range - jitter_range;
        Duration::from_millis((capped + jitter).max(0.0) as u64)
    }

    /// Build and send the request once, buffering the body
    async fn send_once(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, &request.url);
        if let Some(ref user_agent) = self.user_agent {
            builder = builder.header("User-Agent", user_agent);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response.bytes().await?;

        trace!("Response status {} for {}", status, request.url);
        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }

    /// Send with retry and the bounded timeout applied per attempt
    async fn send_with_retry(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.backoff(attempt - 1);
                debug!("Retry attempt {} after {:?} backoff", attempt, backoff);
                sleep(backoff).await;
            }

            debug!(
                "{} {} (attempt {})",
                request.method,
                request.url,
                attempt + 1
            );

            let result = tokio::time::timeout(self.timeout, self.send_once(request)).await;

            match result {
                Ok(Ok(response)) => {
                    if response.status >= 500 && attempt < self.max_retries {
                        warn!(
                            "Request returned {} (attempt {}): will retry",
                            response.status,
                            attempt + 1
                        );
                        last_error = None;
                        continue;
                    }
                    return Ok(response);
                }
                Ok(Err(e)) => {
                    let retryable = e.is_network_unavailable();
                    if retryable && attempt < self.max_retries {
                        warn!("Request failed (attempt {}): {}, will retry", attempt + 1, e);
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
                Err(_) => {
                    let e = Error::timeout(&request.url);
                    if attempt < self.max_retries {
                        warn!("Request timed out (attempt {}), will retry", attempt + 1);
                        last_error = Some(e);
                    } else {
                        return Err(e);
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::timeout(&request.url)))
    }
}

#[async_trait]
impl NetworkFetch for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        self.send_with_retry(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetch_buffers_status_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/tickets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(&b"[]"[..])
                    .insert_header("content-type", "application/json"),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let request = FetchRequest::get(format!("{}/api/v1/tickets", server.uri()));
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("application/json"));
        assert_eq!(&response.body[..], b"[]");
    }

    #[tokio::test]
    async fn request_headers_and_body_are_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/tickets"))
            .and(header("x-idempotency-key", "abc123"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new().unwrap();
        let request = FetchRequest::new(Method::Post, format!("{}/api/v1/tickets", server.uri()))
            .with_header("x-idempotency-key", "abc123")
            .with_body(&br#"{"subject":"printer on fire"}"#[..]);
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 201);
        server.verify().await;
    }

    #[tokio::test]
    async fn slow_response_maps_to_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new()
            .unwrap()
            .with_timeout(Duration::from_millis(50));
        let request = FetchRequest::get(format!("{}/slow", server.uri()));
        let err = fetcher.fetch(&request).await.unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_network_unavailable());
    }

    #[tokio::test]
    async fn connection_refused_is_network_unavailable() {
        // Port 1 is never listening
        let fetcher = HttpFetcher::new()
            .unwrap()
            .with_timeout(Duration::from_secs(2));
        let request = FetchRequest::get("http://127.0.0.1:1/unreachable");
        let err = fetcher.fetch(&request).await.unwrap_err();

        assert!(err.is_network_unavailable());
    }

    #[tokio::test]
    async fn retries_recover_from_server_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(&b"ok"[..]))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new()
            .unwrap()
            .with_max_retries(2)
            .with_initial_backoff_ms(1);
        let request = FetchRequest::get(format!("{}/flaky", server.uri()));
        let response = fetcher.fetch(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(&response.body[..], b"ok");
    }
}
