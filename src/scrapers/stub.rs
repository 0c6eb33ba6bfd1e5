//! Marketplaces that are recognised but not yet scraped

use tracing::warn;

use crate::models::ExtractedProduct;
use crate::traits::{ProductScraper, ScraperConfig, SiteSelectors};

/// Scraper for a known marketplace whose page layout is not handled yet.
///
/// It claims the domain so the importer reports an extraction failure
/// rather than an unsupported site.
pub struct UnimplementedScraper {
    config: ScraperConfig,
}

impl UnimplementedScraper {
    fn new(name: &str, domain_pattern: &str, base_url: &str) -> Self {
        Self {
            config: ScraperConfig {
                name: name.to_string(),
                domain_pattern: domain_pattern.to_string(),
                base_url: base_url.to_string(),
                selectors: SiteSelectors::default(),
            },
        }
    }

    pub fn aliexpress() -> Self {
        Self::new("aliexpress", "aliexpress.", "https://www.aliexpress.com")
    }

    pub fn shein() -> Self {
        Self::new("shein", "shein.com", "https://www.shein.com")
    }
}

impl ProductScraper for UnimplementedScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn extract_product_data(&self, _html: &str, url: &str) -> Option<ExtractedProduct> {
        warn!(
            "Product extraction for {} is not implemented yet ({})",
            self.config.name, url
        );
        None
    }
}
