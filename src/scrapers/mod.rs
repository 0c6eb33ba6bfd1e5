//! Marketplace scrapers and the registry that picks one per URL

mod stub;
mod temu;

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::traits::ProductScraper;

pub use stub::UnimplementedScraper;
pub use temu::TemuScraper;

/// Ordered table of scrapers keyed by domain pattern
pub struct ScraperRegistry {
    scrapers: Vec<Box<dyn ProductScraper>>,
}

impl ScraperRegistry {
    pub fn new(scrapers: Vec<Box<dyn ProductScraper>>) -> Self {
        Self { scrapers }
    }

    /// Temu is fully supported; AliExpress and Shein are registered but yield no data
    pub fn with_defaults(max_images: usize) -> Self {
        Self::new(vec![
            Box::new(TemuScraper::new(max_images)),
            Box::new(UnimplementedScraper::aliexpress()),
            Box::new(UnimplementedScraper::shein()),
        ])
    }

    /// Select the scraper for a product URL
    pub fn find(&self, url: &str) -> Option<&dyn ProductScraper> {
        self.scrapers
            .iter()
            .find(|scraper| scraper.matches(url))
            .map(|scraper| &**scraper)
    }

    pub fn platforms(&self) -> Vec<&str> {
        self.scrapers.iter().map(|s| s.platform()).collect()
    }
}

static PRICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:₦|\$|€|£|¥|NGN\s?|USD\s?)\s*(\d[\d,]*(?:\.\d+)?)").expect("price pattern")
});

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d[\d,]*(?:\.\d+)?)\s*$").expect("number pattern"));

static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("digit pattern"));

/// Pull the first currency-prefixed amount out of a text, without separators
pub fn extract_price(text: &str) -> Option<String> {
    PRICE
        .captures(text)
        .map(|caps| caps[1].replace(',', ""))
}

/// Accept a plain number, as found in price meta tags
pub fn extract_bare_price(text: &str) -> Option<String> {
    BARE_NUMBER
        .captures(text)
        .map(|caps| caps[1].replace(',', ""))
}

pub(crate) fn parse_selectors(selectors: &[String]) -> Vec<Selector> {
    selectors
        .iter()
        .filter_map(|s| match Selector::parse(s) {
            Ok(selector) => Some(selector),
            Err(e) => {
                debug!("Skipping invalid selector {}: {:?}", s, e);
                None
            }
        })
        .collect()
}

/// Visible text of an element, falling back to its `content` attribute for meta tags
pub(crate) fn element_text(element: ElementRef<'_>) -> String {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        element
            .value()
            .attr("content")
            .map(|c| c.trim().to_string())
            .unwrap_or_default()
    } else {
        text
    }
}

/// First non-empty text across an ordered list of selectors
pub(crate) fn first_text(document: &Html, selectors: &[Selector]) -> Option<String> {
    selectors.iter().find_map(|selector| {
        document
            .select(selector)
            .map(element_text)
            .find(|text| !text.is_empty())
    })
}

/// Derive a readable product name from the last path segment of a URL
pub fn name_from_url(url: &str, strip_suffix: Option<&Regex>) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;

    let stem = segment
        .rsplit_once('.')
        .map_or(segment, |(stem, _)| stem);
    let stem = match strip_suffix {
        Some(pattern) => pattern.replace(stem, ""),
        None => stem.into(),
    };
    let decoded = urlencoding::decode(&stem).map_or_else(|_| stem.to_string(), |d| d.into_owned());

    let name = decoded
        .split(|c: char| matches!(c, '-' | '_' | '+') || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(title_case)
        .collect::<Vec<_>>()
        .join(" ");

    (!name.is_empty()).then_some(name)
}

/// Placeholder name built from the URL's numeric ids: `platform-NNN-LLL`
pub fn placeholder_name(platform: &str, url: &str) -> String {
    let digits = DIGITS
        .find_iter(url)
        .max_by_key(|m| m.as_str().len())
        .map_or("0", |m| m.as_str());

    let mut rng = rand::thread_rng();
    let letters: String = (0..3).map(|_| rng.gen_range(b'A'..=b'Z') as char).collect();

    format!("{platform}-{digits}-{letters}")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}
