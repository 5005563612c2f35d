//! Network utilities for HTTP requests, rate limiting, and markup parsing.
//!
//! - **HTTP Client**: a reqwest client with browser headers, a fixed timeout
//!   and permissive certificate handling (the mirrors rotate certificates
//!   faster than they renew them)
//! - **Rate Limiting**: optional per-source delay between requests
//! - **Retry Logic**: bounded retries with exponential backoff on 429 and
//!   transport errors; any other status fails at once so callers can move on
//!   to the next mirror
//! - **Markup Parsing**: see [`html`]
//!
//! # Examples
//!
//! ```rust,no_run
//! use jmfetch::net::HttpClient;
//! use std::time::Duration;
//!
//! # async fn example() -> jmfetch::Result<()> {
//! let client = HttpClient::new("jm", Duration::from_secs(60))?
//!     .with_rate_limit(500)
//!     .with_max_retries(3);
//!
//! let html = client.get_text("https://18comic.vip/album/350234").await?;
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderName, HeaderValue},
    redirect,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub mod html;

/// Browser identity sent with every request.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Minimum spacing between requests of one client.
///
/// Each caller reserves the next free slot under the lock, then sleeps
/// outside it, so concurrent downloads are paced rather than bunched.
/// Clones share the schedule. A zero delay never sleeps.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    next_slot: Arc<Mutex<Option<Instant>>>,
    delay: Duration,
}

impl RateLimiter {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            next_slot: Arc::new(Mutex::new(None)),
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Waits for this caller's slot.
    pub async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }

        let slot = {
            let mut next = self.next_slot.lock();
            let now = Instant::now();
            let slot = next.filter(|at| *at > now).unwrap_or(now);
            *next = Some(slot + self.delay);
            slot
        };

        tokio::time::sleep_until(slot.into()).await;
    }
}

/// HTTP client wrapper with rate limiting, bounded retry and default headers.
///
/// Cloning is cheap: the underlying connection pool is shared.
#[derive(Clone, Debug)]
pub struct HttpClient {
    source_id: String,
    inner: Client,
    rate_limiter: RateLimiter,
    max_retries: u32,
    headers: HeaderMap,
}

impl HttpClient {
    /// Creates a content client that follows redirects.
    ///
    /// Defaults: no rate limiting, 3 retries, browser User-Agent.
    pub fn new(source_id: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self::with_client(source_id, inner))
    }

    /// Creates a client for reachability checks: redirects are reported
    /// rather than followed and failures are never retried.
    pub fn for_probing(source_id: impl Into<String>, timeout: Duration) -> crate::Result<Self> {
        let inner = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self::with_client(source_id, inner).with_max_retries(0))
    }

    fn with_client(source_id: impl Into<String>, inner: Client) -> Self {
        Self {
            source_id: source_id.into(),
            inner,
            rate_limiter: RateLimiter::new(0),
            max_retries: 3,
            headers: HeaderMap::new(),
        }
    }

    /// Sets the minimum delay between requests in milliseconds.
    pub fn with_rate_limit(mut self, delay_ms: u64) -> Self {
        self.rate_limiter = RateLimiter::new(delay_ms);
        self
    }

    /// Sets the maximum number of retries for throttled or failed requests.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Adds a header sent with every request. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Performs a GET request, layering `extra` over the default headers.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`](crate::Error::NotFound) - HTTP 404
    /// * [`Error::RateLimit`](crate::Error::RateLimit) - HTTP 429 after every retry
    /// * [`Error::Source`](crate::Error::Source) - any other non-success status
    /// * [`Error::Network`](crate::Error::Network) - transport errors after every retry
    pub async fn get_with(&self, url: &str, extra: &HeaderMap) -> crate::Result<Bytes> {
        let mut headers = self.headers.clone();
        for (name, value) in extra {
            headers.insert(name.clone(), value.clone());
        }

        let mut attempts = 0;

        loop {
            self.rate_limiter.wait().await;

            match self.inner.get(url).headers(headers.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response.bytes().await?);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        if attempts < self.max_retries {
                            attempts += 1;
                            let delay = Duration::from_secs(2_u64.pow(attempts));
                            tracing::debug!(%url, attempts, "throttled, backing off");
                            tokio::time::sleep(delay).await;
                            continue;
                        }

                        let retry_after = response
                            .headers()
                            .get("retry-after")
                            .and_then(|v| v.to_str().ok())
                            .and_then(|v| v.parse::<u64>().ok());

                        return Err(crate::Error::rate_limit(retry_after));
                    }

                    if status == StatusCode::NOT_FOUND {
                        return Err(crate::Error::not_found(url.to_string()));
                    }

                    return Err(crate::Error::source(
                        &self.source_id,
                        format!("HTTP {} for {}", status, url),
                    ));
                }
                Err(e) => {
                    if attempts < self.max_retries {
                        attempts += 1;
                        tracing::debug!(%url, attempts, error = %e, "request failed, retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Performs a GET request and returns the body as text. Invalid UTF-8
    /// sequences are replaced rather than rejected.
    pub async fn get_text(&self, url: &str) -> crate::Result<String> {
        self.get_text_with(url, &HeaderMap::new()).await
    }

    /// Like [`get_text`](HttpClient::get_text) with extra headers.
    pub async fn get_text_with(&self, url: &str, extra: &HeaderMap) -> crate::Result<String> {
        let bytes = self.get_with(url, extra).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Sends a single GET and reports the status without reading the body.
    pub async fn status(&self, url: &str) -> crate::Result<StatusCode> {
        self.rate_limiter.wait().await;
        let response = self
            .inner
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;
        Ok(response.status())
    }
}

/// Builds a header map from name/value pairs, skipping invalid entries.
pub fn header_map(pairs: &[(&str, &str)]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
            headers.insert(name, value);
        }
    }
    headers
}
