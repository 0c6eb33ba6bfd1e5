use std::sync::Arc;

use anyhow::anyhow;
use tracing::{error, info, warn};

use crate::downloader::ImageDownloader;
use crate::error::ImportError;
use crate::fetcher::Fetcher;
use crate::models::{ImportResult, ImportedProduct};
use crate::scrapers::ScraperRegistry;
use crate::storage::Storage;

/// Sequences fetch, scrape and image download for one product URL
pub struct ProductImporter {
    registry: ScraperRegistry,
    fetcher: Arc<dyn Fetcher>,
    downloader: ImageDownloader,
    folder: String,
}

impl ProductImporter {
    pub fn new(
        registry: ScraperRegistry,
        fetcher: Arc<dyn Fetcher>,
        storage: Arc<dyn Storage>,
        folder: impl Into<String>,
    ) -> Self {
        let downloader = ImageDownloader::new(fetcher.clone(), storage);

        Self {
            registry,
            fetcher,
            downloader,
            folder: folder.into(),
        }
    }

    /// Import a product page. Never fails: errors are folded into the result.
    pub async fn import(&self, url: &str) -> ImportResult {
        match self.run(url).await {
            Ok(product) => ImportResult::ok(product),
            Err(e) => {
                error!("Import of {} failed: {}", url, e);
                ImportResult::failed(e.to_string())
            }
        }
    }

    async fn run(&self, url: &str) -> Result<ImportedProduct, ImportError> {
        let parsed = url::Url::parse(url.trim()).map_err(|e| anyhow!("invalid URL {url}: {e}"))?;
        let url = parsed.as_str();

        let Some(scraper) = self.registry.find(url) else {
            let host = parsed.host_str().unwrap_or(url);
            warn!(
                "No scraper for {} (supported: {})",
                host,
                self.registry.platforms().join(", ")
            );
            return Err(ImportError::UnsupportedSource(host.to_string()));
        };
        info!("Importing {} from {}", url, scraper.platform());

        let html = self
            .fetcher
            .fetch_page(url)
            .await
            .ok_or(ImportError::FetchFailure)?;

        let extracted = scraper
            .extract_product_data(&html, url)
            .ok_or(ImportError::ExtractionFailure)?;

        let downloaded = self
            .downloader
            .download_all(&extracted.images, &self.folder, Some(&scraper.config().base_url))
            .await;
        if downloaded.len() < extracted.images.len() {
            warn!(
                "Only {} of {} images could be downloaded for {}",
                downloaded.len(),
                extracted.images.len(),
                url
            );
        }

        info!("Imported '{}' from {}", extracted.name, scraper.platform());
        Ok(ImportedProduct::from_extracted(
            extracted,
            url,
            scraper.platform(),
            downloaded,
        ))
    }
}
