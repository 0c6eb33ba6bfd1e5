use thiserror::Error;

/// Hard failures of a single product import
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unsupported site: {0}")]
    UnsupportedSource(String),

    #[error("Failed to fetch page content")]
    FetchFailure,

    #[error("Failed to extract product data")]
    ExtractionFailure,

    #[error("Import failed: {0}")]
    Other(#[from] anyhow::Error),
}

/// Failure while generating variants for one stored image
#[derive(Debug, Error)]
pub enum OptimizationError {
    #[error("image file missing from storage: {0}")]
    Missing(String),

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[cfg(feature = "webp")]
    #[error("WebP encoding failed: {0}")]
    WebP(String),
}
