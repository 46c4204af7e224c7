use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Proxy, StatusCode};
use std::time::Duration;
use url::Url;

use super::models::RawEntry;
use super::parser::parse_feed;
use crate::config::FeedConfig;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const MAX_RETRIES: u32 = 3;
const INITIAL_RETRY_DELAY_MS: u64 = 500;
const FEEDCAST_USER_AGENT: &str = concat!("feedcast/", env!("CARGO_PKG_VERSION"));

/// Source of raw feed entries polled by the ingestion loop
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawEntry>>;
}

/// HTTP feed fetcher for a single configured feed
pub struct FeedFetcher {
    client: Client,
    url: String,
}

impl FeedFetcher {
    /// Create a fetcher for the feed described by the configuration
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let url = config
            .source_url()
            .ok_or_else(|| Error::Config("feed source is not configured".to_string()))?;
        Self::with_url(&url, config.request_timeout_secs, &config.proxy_url)
    }

    /// Create a fetcher for an explicit URL
    pub fn with_url(url: &str, timeout_secs: u64, proxy_url: &Option<String>) -> Result<Self> {
        Url::parse(url)?;
        Ok(Self {
            client: Self::build_client(timeout_secs, proxy_url)?,
            url: url.to_string(),
        })
    }

    /// The resolved feed URL this fetcher polls
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build HTTP client with optional proxy
    fn build_client(timeout_secs: u64, proxy_url: &Option<String>) -> Result<Client> {
        let mut builder = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(10));

        if let Some(ref proxy) = proxy_url {
            let proxy = Proxy::all(proxy)
                .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!("Using HTTP proxy for feed fetching");
        }

        builder.build().map_err(Error::Http)
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/atom+xml,application/rss+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(FEEDCAST_USER_AGENT));
        headers
    }

    /// Fetch with retry and exponential backoff
    async fn fetch_with_retry(&self) -> Result<(StatusCode, Bytes)> {
        let mut last_error = None;
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;

        for attempt in 0..MAX_RETRIES {
            tracing::debug!(url = %self.url, attempt = attempt + 1, "Fetching feed");

            match self
                .client
                .get(&self.url)
                .headers(Self::build_headers())
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();

                    // Throttled or briefly unavailable: back off and retry
                    if status == StatusCode::TOO_MANY_REQUESTS
                        || status == StatusCode::SERVICE_UNAVAILABLE
                    {
                        tracing::warn!(
                            "Received {} for {}, retrying after {}ms...",
                            status,
                            self.url,
                            delay_ms
                        );
                        last_error = Some(Error::FeedFetch(format!(
                            "HTTP {} for URL: {}",
                            status, self.url
                        )));
                    } else {
                        match response.bytes().await {
                            Ok(bytes) => return Ok((status, bytes)),
                            Err(e) => {
                                tracing::warn!("Failed to read response body: {}", e);
                                last_error = Some(Error::Http(e));
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Request failed for {} (attempt {}): {}",
                        self.url,
                        attempt + 1,
                        e
                    );
                    last_error = Some(Error::Http(e));
                }
            }

            if attempt < MAX_RETRIES - 1 {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                delay_ms *= 2;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            Error::FeedFetch(format!(
                "Failed to fetch URL after {} retries: {}",
                MAX_RETRIES, self.url
            ))
        }))
    }

    fn ensure_content_size(&self, size: usize) -> Result<()> {
        if size > MAX_FEED_BYTES {
            return Err(Error::FeedFetch(format!(
                "Feed too large ({} bytes) for URL: {}",
                size, self.url
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self) -> Result<Vec<RawEntry>> {
        let (status, content) = self.fetch_with_retry().await?;

        if !status.is_success() {
            return Err(Error::FeedFetch(format!(
                "HTTP {} for URL: {}",
                status, self.url
            )));
        }
        self.ensure_content_size(content.len())?;

        parse_feed(&content)
    }
}
