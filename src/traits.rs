//! Traits and interfaces for marketplace-agnostic product scraping

use crate::models::ExtractedProduct;

/// Configuration for a marketplace scraper
#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// Platform identifier recorded on imported products
    pub name: String,
    /// Substring of the host name that selects this scraper
    pub domain_pattern: String,
    /// Site root used to absolutize root-relative links
    pub base_url: String,
    /// CSS selectors for extracting data
    pub selectors: SiteSelectors,
}

/// Ordered CSS selectors for each field of a product page.
///
/// Within a list, the first selector yielding a usable value wins.
#[derive(Debug, Clone, Default)]
pub struct SiteSelectors {
    pub name: Vec<String>,
    pub price: Vec<String>,
    pub description: Vec<String>,
    pub images: Vec<String>,
}

/// Trait for marketplace-specific scrapers
pub trait ProductScraper: Send + Sync {
    /// Get the configuration for this scraper
    fn config(&self) -> &ScraperConfig;

    /// Extract product fields from a fetched page
    ///
    /// # Arguments
    /// * `html` - Raw HTML of the product page
    /// * `url` - The URL the page was fetched from
    ///
    /// # Returns
    /// * `Option<ExtractedProduct>` - The product data, or `None` when nothing usable was found
    fn extract_product_data(&self, html: &str, url: &str) -> Option<ExtractedProduct>;

    /// Platform identifier, e.g. `temu`
    fn platform(&self) -> &str {
        &self.config().name
    }

    /// Whether this scraper handles the given product URL
    fn matches(&self, url: &str) -> bool {
        let pattern = self.config().domain_pattern.to_lowercase();
        match url::Url::parse(url) {
            Ok(parsed) => parsed
                .host_str()
                .is_some_and(|host| host.to_lowercase().contains(&pattern)),
            Err(_) => url.to_lowercase().contains(&pattern),
        }
    }
}
