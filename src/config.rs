//! Environment-driven configuration
//!
//! Values are read once at startup (after `dotenvy` has loaded `.env`) and
//! handed to each component explicitly.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// Desktop browser identity sent with every outbound request
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub storage: StorageConfig,
    pub http: HttpConfig,
    pub import: ImportConfig,
    pub images: ImageConfig,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Name recorded on each image row
    pub disk: String,
    /// Filesystem root of the disk
    pub root: PathBuf,
    /// Public URL prefix for files on the disk
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub user_agent: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub max_images: usize,
    /// Storage folder imported images are written to
    pub folder: String,
}

#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// Originals larger than this on either side are downscaled in place
    pub max_dimension: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub medium_size: u32,
    pub jpeg_quality: u8,
    /// Only honoured when built with the `webp` feature
    pub webp_enabled: bool,
    pub webp_quality_original: f32,
    pub webp_quality_thumbnail: f32,
    pub webp_quality_medium: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite:database/images.db".to_string(),
            storage: StorageConfig {
                disk: "public".to_string(),
                root: PathBuf::from("storage/app/public"),
                url: "/storage".to_string(),
            },
            http: HttpConfig::default(),
            import: ImportConfig {
                max_images: 5,
                folder: "products".to_string(),
            },
            images: ImageConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: BROWSER_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: 2000,
            thumbnail_width: 300,
            thumbnail_height: 400,
            medium_size: 800,
            jpeg_quality: 85,
            webp_enabled: cfg!(feature = "webp"),
            webp_quality_original: 85.0,
            webp_quality_thumbnail: 80.0,
            webp_quality_medium: 85.0,
        }
    }
}

impl Config {
    /// Build the configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(var)
    }

    /// Build the configuration from any key lookup, blank values counting as unset
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(disk) = var("STORAGE_DISK") {
            config.storage.disk = disk;
        }
        if let Some(root) = var("STORAGE_ROOT") {
            config.storage.root = PathBuf::from(root);
        }
        if let Some(url) = var("STORAGE_URL") {
            config.storage.url = url.trim_end_matches('/').to_string();
        }
        if let Some(agent) = var("HTTP_USER_AGENT") {
            config.http.user_agent = agent;
        }
        if let Some(secs) = var("HTTP_TIMEOUT_SECS") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("HTTP_TIMEOUT_SECS is not a number: {secs}"))?;
            config.http.timeout = Duration::from_secs(secs);
        }
        if let Some(max) = var("IMPORT_MAX_IMAGES") {
            config.import.max_images = max
                .parse()
                .with_context(|| format!("IMPORT_MAX_IMAGES is not a number: {max}"))?;
        }
        if let Some(folder) = var("IMPORT_FOLDER") {
            config.import.folder = folder.trim_matches('/').to_string();
        }
        if let Some(webp) = var("IMAGE_WEBP") {
            let requested = parse_flag(&webp)?;
            config.images.webp_enabled = cfg!(feature = "webp") && requested;
        }

        Ok(config)
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean flag, got {other}"),
    }
}
