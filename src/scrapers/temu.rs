//! Temu.com product page scraper

use std::collections::HashSet;
use std::sync::LazyLock;

use anyhow::{Result, bail};
use regex::Regex;
use scraper::Html;
use tracing::{error, info};

use super::{
    element_text, extract_bare_price, extract_price, first_text, name_from_url, parse_selectors,
    placeholder_name,
};
use crate::description;
use crate::models::ExtractedProduct;
use crate::traits::{ProductScraper, ScraperConfig, SiteSelectors};

/// Query parameter Temu share links use to carry the main gallery image
const GALLERY_PARAM: &str = "top_gallery_url";

static GOODS_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]goods_id=(\d+)").expect("goods_id pattern"));
static GOODS_ID_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-g-(\d+)\.html").expect("goods path pattern"));
static SKU_ID_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]sku_id=(\d+)").expect("sku_id pattern"));
static GOODS_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-g-\d+$").expect("goods suffix pattern"));

/// Scraper implementation for Temu.com
pub struct TemuScraper {
    config: ScraperConfig,
    max_images: usize,
}

impl TemuScraper {
    /// Create a new Temu scraper keeping at most `max_images` image URLs
    pub fn new(max_images: usize) -> Self {
        let config = ScraperConfig {
            name: "temu".to_string(),
            domain_pattern: "temu.com".to_string(),
            base_url: "https://www.temu.com".to_string(),
            selectors: SiteSelectors {
                name: strings(&[
                    "h1",
                    "._2rn4tqXP",
                    ".goods-title",
                    "[data-testid=\"product-title\"]",
                    ".product-title",
                    "meta[property=\"og:title\"]",
                ]),
                price: strings(&[
                    "[data-testid=\"price\"]",
                    "._2de9ERAH",
                    ".goods-price",
                    ".price",
                    "[class*=\"price\"]",
                    "meta[property=\"product:price:amount\"]",
                ]),
                description: strings(&[
                    "._3Qx9jdLK",
                    ".goods-description",
                    "[data-testid=\"product-description\"]",
                    "meta[name=\"description\"]",
                    "meta[property=\"og:description\"]",
                ]),
                images: strings(&[
                    "img[class*=\"goods\"]",
                    "img[src*=\"kwcdn\"]",
                    "img[data-src*=\"kwcdn\"]",
                    ".gallery img",
                    "meta[property=\"og:image\"]",
                ]),
            },
        };

        Self { config, max_images }
    }

    fn extract(&self, html: &str, url: &str) -> Result<ExtractedProduct> {
        if html.trim().is_empty() {
            bail!("empty document");
        }

        let document = Html::parse_document(html);
        let selectors = &self.config.selectors;
        let mut defaulted = Vec::new();

        let name = match first_text(&document, &parse_selectors(&selectors.name)) {
            Some(name) => name,
            None => {
                defaulted.push("name".to_string());
                name_from_url(url, Some(&*GOODS_SUFFIX))
                    .unwrap_or_else(|| placeholder_name(self.platform(), url))
            }
        };

        let price = self.extract_price(&document).unwrap_or_else(|| {
            defaulted.push("price".to_string());
            "0.00".to_string()
        });

        let description = match first_text(&document, &parse_selectors(&selectors.description)) {
            Some(description) => description,
            None => {
                defaulted.push("description".to_string());
                description::synthesize(&name)
            }
        };

        let images = self.extract_images(&document, url);
        let external_id = capture(&GOODS_ID_PARAM, url).or_else(|| capture(&GOODS_ID_PATH, url));
        let sku = capture(&SKU_ID_PARAM, url);

        Ok(ExtractedProduct {
            name,
            price,
            description,
            images,
            sku,
            external_id,
            defaulted,
        })
    }

    fn extract_price(&self, document: &Html) -> Option<String> {
        parse_selectors(&self.config.selectors.price)
            .iter()
            .find_map(|selector| {
                document.select(selector).find_map(|element| {
                    let text = element_text(element);
                    extract_price(&text).or_else(|| {
                        element
                            .value()
                            .attr("content")
                            .and_then(extract_bare_price)
                    })
                })
            })
    }

    fn extract_images(&self, document: &Html, url: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut images = Vec::new();

        // The gallery image from a share link is the product's hero shot
        if let Some(gallery) = gallery_param(url) {
            seen.insert(gallery.clone());
            images.push(gallery);
        }

        for selector in parse_selectors(&self.config.selectors.images) {
            for element in document.select(&selector) {
                let value = element.value();
                let src = value
                    .attr("data-src")
                    .or_else(|| value.attr("src"))
                    .or_else(|| value.attr("content"))
                    .map(str::trim);

                if let Some(src) = src
                    && !src.is_empty()
                    && !src.starts_with("data:")
                    && seen.insert(src.to_string())
                {
                    images.push(src.to_string());
                }
            }
        }

        images.truncate(self.max_images);
        images
    }
}

impl ProductScraper for TemuScraper {
    fn config(&self) -> &ScraperConfig {
        &self.config
    }

    fn extract_product_data(&self, html: &str, url: &str) -> Option<ExtractedProduct> {
        match self.extract(html, url) {
            Ok(product) => {
                info!(
                    "Extracted '{}' ({}) with {} images from {}",
                    product.name,
                    product.price,
                    product.images.len(),
                    self.config.name
                );
                Some(product)
            }
            Err(e) => {
                error!("Failed to extract product data from {}: {}", url, e);
                None
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern.captures(text).map(|caps| caps[1].to_string())
}

fn gallery_param(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == GALLERY_PARAM)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://www.temu.com/mens-cotton-casual-pants-g-601099512345678.html?sku_id=17592186044416&top_gallery_url=https%3A%2F%2Fimg.kwcdn.com%2Fproduct%2Fhero.jpg";

    const PAGE: &str = r#"
        <html>
          <head>
            <meta property="og:image" content="https://img.kwcdn.com/product/og.jpg">
          </head>
          <body>
            <h1>  Men's Casual Pants
                  Loose Fit </h1>
            <div class="goods-price"><span>₦1,250.00</span> only</div>
            <div class="goods-description">Soft everyday trousers.</div>
            <div class="gallery">
              <img class="goods-img" src="https://img.kwcdn.com/product/1.jpg">
              <img class="goods-img" data-src="https://img.kwcdn.com/product/2.jpg" src="data:image/gif;base64,R0lG">
              <img class="goods-img" src="https://img.kwcdn.com/product/1.jpg">
              <img src="//img.kwcdn.com/product/3.jpg">
            </div>
          </body>
        </html>
    "#;

    #[test]
    fn extracts_fields_from_markup() {
        let product = TemuScraper::new(5).extract_product_data(PAGE, URL).unwrap();

        assert_eq!(product.name, "Men's Casual Pants Loose Fit");
        assert_eq!(product.price, "1250.00");
        assert_eq!(product.description, "Soft everyday trousers.");
        assert_eq!(product.external_id.as_deref(), Some("601099512345678"));
        assert_eq!(product.sku.as_deref(), Some("17592186044416"));
        assert!(product.defaulted.is_empty());
    }

    #[test]
    fn images_are_deduplicated_and_capped() {
        let product = TemuScraper::new(5).extract_product_data(PAGE, URL).unwrap();

        assert_eq!(
            product.images,
            vec![
                "https://img.kwcdn.com/product/hero.jpg",
                "https://img.kwcdn.com/product/1.jpg",
                "https://img.kwcdn.com/product/2.jpg",
                "//img.kwcdn.com/product/3.jpg",
                "https://img.kwcdn.com/product/og.jpg",
            ]
        );

        let capped = TemuScraper::new(2).extract_product_data(PAGE, URL).unwrap();
        assert_eq!(capped.images.len(), 2);
    }

    #[test]
    fn falls_back_to_url_name_default_price_and_synthesized_copy() {
        let product = TemuScraper::new(5)
            .extract_product_data("<html><body><p>nothing here</p></body></html>", URL)
            .unwrap();

        assert_eq!(product.name, "Mens Cotton Casual Pants");
        assert_eq!(product.price, "0.00");
        assert!(product.description.contains("cotton pants"));
        assert_eq!(product.defaulted, vec!["name", "price", "description"]);
    }

    #[test]
    fn placeholder_name_when_url_has_no_slug() {
        let product = TemuScraper::new(5)
            .extract_product_data("<html><body></body></html>", "https://www.temu.com/?goods_id=42")
            .unwrap();

        assert!(product.name.starts_with("temu-42-"), "{}", product.name);
        assert_eq!(product.external_id.as_deref(), Some("42"));
    }

    #[test]
    fn price_meta_tag_accepts_bare_numbers() {
        let html = r#"<html><head><meta property="product:price:amount" content="3,499"></head></html>"#;
        let product = TemuScraper::new(5).extract_product_data(html, URL).unwrap();

        assert_eq!(product.price, "3499");
    }

    #[test]
    fn empty_document_is_an_extraction_failure() {
        assert!(TemuScraper::new(5).extract_product_data("   ", URL).is_none());
    }
}
