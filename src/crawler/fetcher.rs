//! Fetching: the `Fetcher` seam, its reqwest implementation, and the
//! slot-limited wrapper every crawl fetch goes through.

use async_trait::async_trait;
use std::error::Error as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

/// Errors that can occur during fetching
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("DNS lookup failed: {0}")]
    Dns(String),
    #[error("too many redirects")]
    TooManyRedirects,
    #[error("content too large: more than {0} bytes")]
    ContentTooLarge(usize),
    #[error("fetch slots closed")]
    Closed,
    #[error("request failed: {0}")]
    Other(String),
}

impl FetchError {
    /// Worth retrying after a backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_) | Self::Other(_))
    }

    /// Short label for statistics and logs
    pub fn class(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connect",
            Self::Dns(_) => "dns",
            Self::TooManyRedirects => "redirects",
            Self::ContentTooLarge(_) => "too_large",
            Self::Closed => "closed",
            Self::Other(_) => "other",
        }
    }
}

/// Raw HTTP response, whatever its status
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// URL after redirects
    pub final_url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// First header with this name, case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters, lower-cased
    pub fn content_type(&self) -> Option<String> {
        self.header("content-type")
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
    }

    /// `Retry-After` given in seconds
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")?
            .trim()
            .parse::<u64>()
            .ok()
            .map(Duration::from_secs)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Anything that can turn a URL into a response
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed fetcher
pub struct HttpFetcher {
    client: reqwest::Client,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_body_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, max_body_bytes })
    }

    fn classify(err: reqwest::Error, timeout: Duration) -> FetchError {
        if err.is_timeout() {
            return FetchError::Timeout(timeout);
        }
        if err.is_redirect() {
            return FetchError::TooManyRedirects;
        }
        // hyper reports resolver failures as connect errors; the cause chain says which
        let mut chain = String::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push_str(&cause.to_string().to_ascii_lowercase());
            chain.push(' ');
            source = cause.source();
        }
        if chain.contains("dns error") || chain.contains("failed to lookup address") {
            FetchError::Dns(err.to_string())
        } else if err.is_connect() {
            FetchError::Connect(err.to_string())
        } else {
            FetchError::Other(err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let mut response = self
            .client
            .get(url.as_str())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| Self::classify(e, timeout))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
            .collect();

        if let Some(len) = response.content_length() {
            if len as usize > self.max_body_bytes {
                return Err(FetchError::ContentTooLarge(self.max_body_bytes));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| Self::classify(e, timeout))?
        {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(FetchError::ContentTooLarge(self.max_body_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(FetchResponse {
            final_url,
            status,
            headers,
            body,
        })
    }
}

/// Wraps a fetcher with the global fetch ceiling and a hard timeout.
///
/// A slot is held only while the request is in flight. The semaphore is
/// FIFO-fair, so every domain waiting for a slot eventually gets one.
pub struct LimitedFetcher {
    inner: Arc<dyn Fetcher>,
    slots: Arc<Semaphore>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl LimitedFetcher {
    pub fn new(inner: Arc<dyn Fetcher>, max_in_flight: usize) -> Self {
        Self {
            inner,
            slots: Arc::new(Semaphore::new(max_in_flight.max(1))),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Highest number of simultaneous fetches seen so far
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Fetcher for LimitedFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let _permit = self.slots.acquire().await.map_err(|_| FetchError::Closed)?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        // The inner fetcher gets a little slack so its own timeout fires first
        let result = match tokio::time::timeout(timeout + Duration::from_secs(1), self.inner.fetch(url, timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout)),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
