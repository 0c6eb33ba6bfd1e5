//! Data models for imported products and stored images

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fields a scraper pulled out of a product page, before any image is downloaded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedProduct {
    pub name: String,
    pub price: String,
    pub description: String,
    pub images: Vec<String>,
    pub sku: Option<String>,
    pub external_id: Option<String>,
    /// Fields that were filled by a fallback instead of page markup
    pub defaulted: Vec<String>,
}

/// Product data returned by a successful import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedProduct {
    pub name: String,
    pub price: String,
    pub description: String,
    pub images: Vec<String>,
    pub source_url: String,
    pub source_platform: String,
    pub sku: Option<String>,
    pub external_id: Option<String>,
    pub defaulted: Vec<String>,
    /// Images that were downloaded into storage during the import
    pub downloaded: Vec<StoredImage>,
}

impl ImportedProduct {
    pub fn from_extracted(
        extracted: ExtractedProduct,
        source_url: &str,
        source_platform: &str,
        downloaded: Vec<StoredImage>,
    ) -> Self {
        Self {
            name: extracted.name,
            price: extracted.price,
            description: extracted.description,
            images: extracted.images,
            source_url: source_url.to_string(),
            source_platform: source_platform.to_string(),
            sku: extracted.sku,
            external_id: extracted.external_id,
            defaulted: extracted.defaulted,
            downloaded,
        }
    }
}

/// Outcome of one import call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ImportedProduct>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ImportResult {
    pub fn ok(data: ImportedProduct) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Heuristic classification of a product title
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    pub product_type: Option<&'static str>,
    pub style: &'static str,
    pub material: Option<&'static str>,
    pub color: Option<&'static str>,
    pub features: Vec<&'static str>,
}

/// Derived renditions generated next to an original image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Original,
    Thumbnail,
    Medium,
}

impl Variant {
    fn webp_suffix(self) -> &'static str {
        match self {
            Self::Original => "",
            Self::Thumbnail => "_thumb",
            Self::Medium => "_medium",
        }
    }
}

/// An image file on a storage disk, attached to an owner ("imageable")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredImage {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub extension: String,
    /// Path of the original file relative to the disk root
    pub path: String,
    pub disk: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub is_optimized: bool,
    pub metadata: Map<String, Value>,
    pub imageable_type: Option<String>,
    pub imageable_id: Option<i64>,
    pub sort_order: i64,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredImage {
    /// Directory holding the original, relative to the disk root (empty for the root)
    pub fn directory(&self) -> &str {
        self.path
            .rsplit_once('/')
            .map_or("", |(dir, _)| dir)
    }

    fn sibling(&self, folder: &str, file: &str) -> String {
        let dir = self.directory();
        if dir.is_empty() {
            format!("{folder}/{file}")
        } else {
            format!("{dir}/{folder}/{file}")
        }
    }

    pub fn thumbnail_path(&self) -> String {
        self.sibling("thumbnails", &self.filename)
    }

    pub fn medium_path(&self) -> String {
        self.sibling("medium", &self.filename)
    }

    /// WebP rendition path; the source extension stays in the name so that
    /// `x.jpg` and `x.png` in one folder do not share a WebP file
    pub fn webp_path(&self, variant: Variant) -> String {
        let suffix = variant.webp_suffix();
        let name = match self.filename.rsplit_once('.') {
            Some((stem, ext)) => format!("{stem}{suffix}.{ext}.webp"),
            None => format!("{}{suffix}.webp", self.filename),
        };
        self.sibling("webp", &name)
    }

    /// Every derived file the optimizer may have written for this image
    pub fn derived_paths(&self) -> Vec<String> {
        vec![
            self.thumbnail_path(),
            self.medium_path(),
            self.webp_path(Variant::Original),
            self.webp_path(Variant::Thumbnail),
            self.webp_path(Variant::Medium),
        ]
    }

    pub fn optimized_at(&self) -> Option<&str> {
        self.metadata.get("optimized_at").and_then(Value::as_str)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn image_at(path: &str) -> StoredImage {
        let filename = path.rsplit('/').next().unwrap().to_string();
        StoredImage {
            id: 1,
            extension: filename.rsplit('.').next().unwrap().to_string(),
            original_name: filename.clone(),
            filename,
            mime_type: "image/jpeg".to_string(),
            path: path.to_string(),
            disk: "public".to_string(),
            size: 0,
            width: None,
            height: None,
            is_optimized: false,
            metadata: Map::new(),
            imageable_type: None,
            imageable_id: None,
            sort_order: 0,
            is_featured: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derived_paths_sit_next_to_the_original() {
        let image = image_at("products/1700000000_ab12cd34_0.jpg");

        assert_eq!(
            image.thumbnail_path(),
            "products/thumbnails/1700000000_ab12cd34_0.jpg"
        );
        assert_eq!(image.medium_path(), "products/medium/1700000000_ab12cd34_0.jpg");
        assert_eq!(
            image.webp_path(Variant::Thumbnail),
            "products/webp/1700000000_ab12cd34_0_thumb.jpg.webp"
        );
    }

    #[test]
    fn derived_paths_for_root_level_files() {
        let image = image_at("photo.png");

        assert_eq!(image.directory(), "");
        assert_eq!(image.medium_path(), "medium/photo.png");
        assert_eq!(image.webp_path(Variant::Original), "webp/photo.png.webp");
    }

    #[test]
    fn webp_paths_differ_for_same_stem_originals() {
        let jpg = image_at("uploads/banner.jpg");
        let png = image_at("uploads/banner.png");

        for variant in [Variant::Original, Variant::Thumbnail, Variant::Medium] {
            assert_ne!(jpg.webp_path(variant), png.webp_path(variant));
        }
        assert_eq!(image_at("uploads/raw").webp_path(Variant::Medium), "uploads/webp/raw_medium.webp");
    }

    #[test]
    fn failed_result_serializes_without_data() {
        let json = serde_json::to_value(ImportResult::failed("boom")).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("data").is_none());
    }
}
