//! HTTP access for product pages and their images
//!
//! Every request carries desktop browser headers and the configured timeout.
//! Failures never propagate: a timeout, network error or non-2xx status is
//! logged and reported as "no content". There are no retries.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::config::HttpConfig;

/// Raw bytes of a downloaded file plus the server-declared content type
#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Source of remote content for the importer
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch a page body, or `None` if nothing usable came back
    async fn fetch_page(&self, url: &str) -> Option<String>;

    /// Fetch a binary asset such as an image, or `None` on failure
    async fn fetch_asset(&self, url: &str) -> Option<FetchedAsset>;
}

/// Fetcher backed by a shared `reqwest` client
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .default_headers(browser_headers())
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client })
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("en-US,en;q=0.9"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(
        header::UPGRADE_INSECURE_REQUESTS,
        HeaderValue::from_static("1"),
    );
    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Option<String> {
        debug!("Fetching page {}", url);

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Failed to fetch {}: {}", url, response.status());
            return None;
        }

        match response.text().await {
            Ok(body) => Some(body),
            Err(e) => {
                warn!("Failed to read body of {}: {}", url, e);
                None
            }
        }
    }

    async fn fetch_asset(&self, url: &str) -> Option<FetchedAsset> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to download {}: {}", url, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Failed to download {}: {}", url, response.status());
            return None;
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(bytes) => Some(FetchedAsset {
                bytes: bytes.to_vec(),
                content_type,
            }),
            Err(e) => {
                warn!("Failed to read {}: {}", url, e);
                None
            }
        }
    }
}
