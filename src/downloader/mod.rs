//! Downloads scraped image URLs into a storage disk
//!
//! Partial success is normal: an image that cannot be fetched or stored is
//! logged and skipped.

use std::io::Cursor;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::fetcher::Fetcher;
use crate::models::StoredImage;
use crate::storage::Storage;

const KNOWN_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "avif", "bmp"];
const DEFAULT_EXTENSION: &str = "jpg";

/// Fetches remote images and writes them through a [`Storage`]
pub struct ImageDownloader {
    fetcher: Arc<dyn Fetcher>,
    storage: Arc<dyn Storage>,
}

impl ImageDownloader {
    pub fn new(fetcher: Arc<dyn Fetcher>, storage: Arc<dyn Storage>) -> Self {
        Self { fetcher, storage }
    }

    /// Download every usable URL into `folder`, returning the saved records.
    ///
    /// `site_root` absolutizes root-relative URLs such as `/assets/x.jpg`.
    pub async fn download_all(
        &self,
        urls: &[String],
        folder: &str,
        site_root: Option<&str>,
    ) -> Vec<StoredImage> {
        let mut saved = Vec::new();

        for (index, raw) in urls.iter().enumerate() {
            let Some(url) = normalize_url(raw, site_root) else {
                warn!("Skipping invalid image URL: {}", raw);
                continue;
            };

            let Some(asset) = self.fetcher.fetch_asset(&url).await else {
                continue;
            };

            let extension = extension_from_url(&url)
                .or_else(|| asset.content_type.as_deref().and_then(extension_from_content_type))
                .unwrap_or(DEFAULT_EXTENSION);
            let filename = generate_filename(index, extension);
            let path = join_path(folder, &filename);

            if let Err(e) = self.storage.put(&path, &asset.bytes) {
                warn!("Failed to store image {} at {}: {}", url, path, e);
                continue;
            }
            debug!("Stored {} as {}", url, path);

            let (width, height) = dimensions(&asset.bytes).unzip();
            let mime_type = asset
                .content_type
                .as_deref()
                .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_string())
                .filter(|ct| ct.starts_with("image/"))
                .unwrap_or_else(|| mime_from_extension(extension).to_string());

            let mut metadata = Map::new();
            metadata.insert("source_url".to_string(), Value::String(url.clone()));

            let now = Utc::now();
            saved.push(StoredImage {
                id: 0,
                original_name: original_name(&url).unwrap_or_else(|| filename.clone()),
                filename,
                mime_type,
                extension: extension.to_string(),
                path,
                disk: self.storage.name().to_string(),
                size: asset.bytes.len() as i64,
                width,
                height,
                is_optimized: false,
                metadata,
                imageable_type: None,
                imageable_id: None,
                sort_order: saved.len() as i64,
                is_featured: saved.is_empty(),
                created_at: now,
                updated_at: now,
            });
        }

        info!("Downloaded {} of {} images", saved.len(), urls.len());
        saved
    }
}

/// Turn a scraped image reference into an absolute http(s) URL
pub fn normalize_url(raw: &str, site_root: Option<&str>) -> Option<String> {
    let raw = raw.trim();
    let absolute = if raw.starts_with("//") {
        format!("https:{raw}")
    } else if raw.starts_with('/') {
        format!("{}{}", site_root?.trim_end_matches('/'), raw)
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        return None;
    };

    let parsed = url::Url::parse(&absolute).ok()?;
    (matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some())
        .then(|| parsed.to_string())
}

/// Extension from the last path segment, when it names a known image type
pub fn extension_from_url(url: &str) -> Option<&'static str> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    KNOWN_EXTENSIONS.iter().copied().find(|known| *known == ext)
}

pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/avif" => Some("avif"),
        "image/bmp" => Some("bmp"),
        _ => None,
    }
}

pub fn mime_from_extension(extension: &str) -> &'static str {
    match extension {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// `<unix timestamp>_<random suffix>_<index>.<extension>`
fn generate_filename(index: usize, extension: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}.{}", Utc::now().timestamp(), suffix, index, extension)
}

fn join_path(folder: &str, filename: &str) -> String {
    let folder = folder.trim_matches('/');
    if folder.is_empty() {
        filename.to_string()
    } else {
        format!("{folder}/{filename}")
    }
}

fn original_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).map_or_else(|_| s.to_string(), |d| d.into_owned()))
}

fn dimensions(bytes: &[u8]) -> Option<(i64, i64)> {
    image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
        .map(|(w, h)| (i64::from(w), i64::from(h)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::mock::MockFetcher;
    use crate::storage::LocalDisk;
    use tempfile::tempdir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgb8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn normalizes_protocol_and_root_relative_urls() {
        assert_eq!(
            normalize_url("//img.cdn.com/x.jpg", None).as_deref(),
            Some("https://img.cdn.com/x.jpg")
        );
        assert_eq!(
            normalize_url("/assets/x.jpg", Some("https://www.temu.com")).as_deref(),
            Some("https://www.temu.com/assets/x.jpg")
        );
        assert_eq!(normalize_url("/assets/x.jpg", None), None);
        assert_eq!(normalize_url("javascript:alert(1)", None), None);
        assert_eq!(normalize_url("https://", None), None);
    }

    #[test]
    fn extension_prefers_url_then_content_type() {
        assert_eq!(extension_from_url("https://a.com/p/1.PNG?w=800"), Some("png"));
        assert_eq!(extension_from_url("https://a.com/p/image"), None);
        assert_eq!(extension_from_content_type("image/webp; q=1"), Some("webp"));
        assert_eq!(extension_from_content_type("text/html"), None);
    }

    #[test]
    fn generated_filenames_carry_timestamp_suffix_and_index() {
        let name = generate_filename(3, "png");
        let pattern = regex::Regex::new(r"^\d+_[a-z0-9]{8}_3\.png$").unwrap();

        assert!(pattern.is_match(&name), "{name}");
    }

    #[tokio::test]
    async fn skips_failures_and_keeps_the_rest() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalDisk::new("public", dir.path(), "/storage"));
        let fetcher = Arc::new(
            MockFetcher::default()
                .with_asset("https://img.cdn.com/a", &png_bytes(4, 3), Some("image/png"))
                .with_asset("https://www.temu.com/assets/b.gif", b"not really a gif", None),
        );
        let downloader = ImageDownloader::new(fetcher.clone(), storage.clone());

        let urls = vec![
            "//img.cdn.com/a".to_string(),
            "https://img.cdn.com/missing.jpg".to_string(),
            "not a url".to_string(),
            "/assets/b.gif".to_string(),
        ];
        let saved = downloader
            .download_all(&urls, "products", Some("https://www.temu.com"))
            .await;

        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].extension, "png");
        assert_eq!(saved[0].mime_type, "image/png");
        assert_eq!((saved[0].width, saved[0].height), (Some(4), Some(3)));
        assert!(saved[0].is_featured);
        assert_eq!(saved[1].extension, "gif");
        assert_eq!(saved[1].original_name, "b.gif");
        assert!(!saved[1].is_featured);
        assert_eq!(saved[1].sort_order, 1);
        assert!(saved.iter().all(|img| storage.exists(&img.path)));
        assert!(saved[0].path.starts_with("products/"));

        assert_eq!(fetcher.requests().len(), 3);
    }

    #[tokio::test]
    async fn unknown_type_falls_back_to_jpg() {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalDisk::new("public", dir.path(), "/storage"));
        let fetcher = Arc::new(MockFetcher::default().with_asset(
            "https://img.cdn.com/raw/601099",
            b"opaque bytes",
            None,
        ));
        let downloader = ImageDownloader::new(fetcher, storage.clone());

        let saved = downloader
            .download_all(&["https://img.cdn.com/raw/601099".to_string()], "products", None)
            .await;

        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].extension, "jpg");
        assert_eq!(saved[0].mime_type, "image/jpeg");
        assert!(saved[0].filename.ends_with("_0.jpg"));
        assert_eq!((saved[0].width, saved[0].height), (None, None));
        assert!(storage.exists(&saved[0].path));
    }
}
