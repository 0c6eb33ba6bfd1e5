//! Image post-processing: in-place downscale plus thumbnail, medium and WebP variants
//!
//! Variants are always re-derived from the current original, so re-running
//! over the same image rewrites identical files.

use std::io::Cursor;
use std::sync::Arc;

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ImageConfig;
use crate::error::OptimizationError;
use crate::models::{StoredImage, Variant};
use crate::storage::Storage;

/// Options for a batch run over the catalog
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Re-process images already marked optimized
    pub force: bool,
    /// Only process images with at least one variant file missing
    pub only_missing: bool,
    pub show_progress: bool,
}

/// Totals reported at the end of a batch run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub optimized: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Bytes on disk for originals and variants of every image in the batch
    pub total_bytes: u64,
    /// Indices into the batch of the records that were rewritten
    pub updated: Vec<usize>,
}

pub struct ImageOptimizer {
    storage: Arc<dyn Storage>,
    config: ImageConfig,
}

impl ImageOptimizer {
    pub fn new(storage: Arc<dyn Storage>, config: ImageConfig) -> Self {
        Self { storage, config }
    }

    /// Generate all variants for one stored image and update its record
    pub fn optimize(&self, image: &mut StoredImage) -> Result<(), OptimizationError> {
        if !self.storage.exists(&image.path) {
            return Err(OptimizationError::Missing(image.path.clone()));
        }

        let reader = ImageReader::open(self.storage.path(&image.path)?)?.with_guessed_format()?;
        let format = reader.format().unwrap_or(ImageFormat::Jpeg);
        let mut original = reader.decode()?;

        let max = self.config.max_dimension;
        if original.width() > max || original.height() > max {
            debug!(
                "Downscaling {} from {}x{}",
                image.path,
                original.width(),
                original.height()
            );
            original = original.resize(max, max, FilterType::Lanczos3);
            let bytes = self.encode(&original, format)?;
            self.storage.put(&image.path, &bytes)?;
        }

        let (width, height) = original.dimensions();
        image.width = Some(i64::from(width));
        image.height = Some(i64::from(height));
        image.size = self.storage.size(&image.path)? as i64;

        let thumbnail = original.resize_to_fill(
            self.config.thumbnail_width,
            self.config.thumbnail_height,
            FilterType::Lanczos3,
        );
        let medium = self.bounded(&original, self.config.medium_size);

        self.write_variant(&image.thumbnail_path(), &thumbnail, format)?;
        self.write_variant(&image.medium_path(), &medium, format)?;

        #[cfg(feature = "webp")]
        if self.config.webp_enabled {
            for (variant, rendition, quality) in [
                (Variant::Original, &original, self.config.webp_quality_original),
                (Variant::Thumbnail, &thumbnail, self.config.webp_quality_thumbnail),
                (Variant::Medium, &medium, self.config.webp_quality_medium),
            ] {
                let bytes = encode_webp(rendition, quality)?;
                self.write_file(&image.webp_path(variant), &bytes)?;
            }
        }

        image.is_optimized = true;
        image.metadata.insert(
            "optimized_at".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );
        image
            .metadata
            .insert("webp".to_string(), Value::Bool(self.config.webp_enabled));
        image.updated_at = Utc::now();

        info!("Optimized {} ({}x{})", image.path, width, height);
        Ok(())
    }

    /// Run [`optimize`](Self::optimize) over a batch, one image at a time.
    ///
    /// A failing image is logged and counted; the rest of the batch still runs.
    pub fn optimize_batch(&self, images: &mut [StoredImage], options: BatchOptions) -> BatchSummary {
        let progress = if options.show_progress {
            let bar = ProgressBar::new(images.len() as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            {
                bar.set_style(style.progress_chars("=> "));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut summary = BatchSummary::default();

        for (index, image) in images.iter_mut().enumerate() {
            progress.set_message(image.filename.clone());

            if self.should_skip(image, options) {
                debug!(
                    "Skipping {} (optimized at {})",
                    image.path,
                    image.optimized_at().unwrap_or("never")
                );
                summary.skipped += 1;
            } else {
                match self.optimize(image) {
                    Ok(()) => {
                        summary.optimized += 1;
                        summary.updated.push(index);
                    }
                    Err(e) => {
                        error!("Failed to optimize image {} ({}): {}", image.id, image.path, e);
                        summary.errors += 1;
                    }
                }
            }

            summary.total_bytes += self.storage_bytes(image);
            progress.inc(1);
        }

        progress.finish_with_message("done");
        info!(
            "Optimization finished: {} optimized, {} skipped, {} errors",
            summary.optimized, summary.skipped, summary.errors
        );
        summary
    }

    /// Whether every variant this optimizer would write already exists
    pub fn has_all_variants(&self, image: &StoredImage) -> bool {
        let mut paths = vec![image.thumbnail_path(), image.medium_path()];
        if self.config.webp_enabled {
            paths.extend([
                image.webp_path(Variant::Original),
                image.webp_path(Variant::Thumbnail),
                image.webp_path(Variant::Medium),
            ]);
        }
        paths.iter().all(|path| self.storage.exists(path))
    }

    /// Bytes used by the original and every derived file that exists
    pub fn storage_bytes(&self, image: &StoredImage) -> u64 {
        std::iter::once(image.path.clone())
            .chain(image.derived_paths())
            .filter_map(|path| self.storage.size(&path).ok())
            .sum()
    }

    fn should_skip(&self, image: &StoredImage, options: BatchOptions) -> bool {
        if options.force {
            false
        } else if options.only_missing {
            self.has_all_variants(image)
        } else {
            image.is_optimized
        }
    }

    /// Scale down to fit a square bound, never up
    fn bounded(&self, source: &DynamicImage, bound: u32) -> DynamicImage {
        if source.width() > bound || source.height() > bound {
            source.resize(bound, bound, FilterType::Lanczos3)
        } else {
            source.clone()
        }
    }

    fn write_variant(
        &self,
        path: &str,
        rendition: &DynamicImage,
        format: ImageFormat,
    ) -> Result<(), OptimizationError> {
        let bytes = self.encode(rendition, format)?;
        self.write_file(path, &bytes)
    }

    fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), OptimizationError> {
        if let Some((dir, _)) = path.rsplit_once('/') {
            self.storage.make_directory(dir)?;
        }
        self.storage.put(path, bytes)?;
        Ok(())
    }

    fn encode(&self, rendition: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
        let mut buffer = Cursor::new(Vec::new());
        match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
                DynamicImage::ImageRgb8(rendition.to_rgb8()).write_with_encoder(encoder)?;
            }
            other => rendition.write_to(&mut buffer, other)?,
        }
        Ok(buffer.into_inner())
    }
}

/// Lossy WebP at the given quality (0-100)
#[cfg(feature = "webp")]
fn encode_webp(rendition: &DynamicImage, quality: f32) -> Result<Vec<u8>, OptimizationError> {
    // libwebp only takes 8-bit RGB or RGBA buffers
    let pixels = if rendition.color().has_alpha() {
        DynamicImage::ImageRgba8(rendition.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(rendition.to_rgb8())
    };
    let encoder = webp::Encoder::from_image(&pixels)
        .map_err(|e| OptimizationError::WebP(e.to_string()))?;
    Ok(encoder.encode(quality).to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::image_at;
    use crate::storage::LocalDisk;
    use tempfile::{TempDir, tempdir};

    fn setup(webp: bool) -> (TempDir, Arc<LocalDisk>, ImageOptimizer) {
        let dir = tempdir().unwrap();
        let storage = Arc::new(LocalDisk::new("public", dir.path(), "/storage"));
        let config = ImageConfig {
            webp_enabled: webp,
            ..ImageConfig::default()
        };
        let optimizer = ImageOptimizer::new(storage.clone(), config);
        (dir, storage, optimizer)
    }

    fn store(storage: &LocalDisk, path: &str, width: u32, height: u32, format: ImageFormat) -> StoredImage {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::new_rgb8(width, height)
            .write_to(&mut bytes, format)
            .unwrap();
        storage.put(path, bytes.get_ref()).unwrap();
        image_at(path)
    }

    fn dimensions_of(storage: &LocalDisk, path: &str) -> (u32, u32) {
        image::image_dimensions(storage.path(path).unwrap()).unwrap()
    }

    #[test]
    fn thumbnails_are_always_cover_cropped_to_300_by_400() {
        let (_dir, storage, optimizer) = setup(false);

        for (name, w, h) in [("wide.png", 1000, 200), ("tiny.png", 50, 50), ("tall.png", 300, 1200)] {
            let mut image = store(&storage, &format!("products/{name}"), w, h, ImageFormat::Png);
            optimizer.optimize(&mut image).unwrap();

            assert_eq!(dimensions_of(&storage, &image.thumbnail_path()), (300, 400), "{name}");
        }
    }

    #[test]
    fn medium_fits_within_bounds_without_upscaling() {
        let (_dir, storage, optimizer) = setup(false);

        let mut large = store(&storage, "p/large.png", 1600, 400, ImageFormat::Png);
        optimizer.optimize(&mut large).unwrap();
        assert_eq!(dimensions_of(&storage, &large.medium_path()), (800, 200));

        let mut small = store(&storage, "p/small.png", 120, 90, ImageFormat::Png);
        optimizer.optimize(&mut small).unwrap();
        assert_eq!(dimensions_of(&storage, &small.medium_path()), (120, 90));
    }

    #[test]
    fn oversized_originals_are_downscaled_in_place() {
        let (_dir, storage, optimizer) = setup(false);
        let mut image = store(&storage, "p/huge.jpg", 3000, 1500, ImageFormat::Jpeg);

        optimizer.optimize(&mut image).unwrap();

        assert_eq!(dimensions_of(&storage, &image.path), (2000, 1000));
        assert_eq!((image.width, image.height), (Some(2000), Some(1000)));
        assert_eq!(image.size as u64, storage.size(&image.path).unwrap());
        assert!(image.is_optimized);
        assert!(image.optimized_at().is_some());
    }

    #[test]
    fn second_run_reproduces_the_same_files() {
        let (_dir, storage, optimizer) = setup(true);
        let mut image = store(&storage, "p/photo.png", 2400, 1200, ImageFormat::Png);

        optimizer.optimize(&mut image).unwrap();
        let first: Vec<Option<u64>> = image
            .derived_paths()
            .iter()
            .map(|p| storage.size(p).ok())
            .collect();
        let first_size = image.size;

        optimizer.optimize(&mut image).unwrap();
        let second: Vec<Option<u64>> = image
            .derived_paths()
            .iter()
            .map(|p| storage.size(p).ok())
            .collect();

        assert_eq!(first, second);
        assert_eq!(first_size, image.size);
        assert_eq!((image.width, image.height), (Some(2000), Some(1000)));
    }

    #[cfg(feature = "webp")]
    #[test]
    fn webp_variants_are_written_when_enabled() {
        let (_dir, storage, optimizer) = setup(true);
        let mut image = store(&storage, "p/shirt.png", 900, 900, ImageFormat::Png);

        optimizer.optimize(&mut image).unwrap();

        assert!(optimizer.has_all_variants(&image));
        assert_eq!(
            ImageFormat::from_path(storage.path(&image.webp_path(Variant::Thumbnail)).unwrap()).unwrap(),
            ImageFormat::WebP
        );
        assert_eq!(dimensions_of(&storage, &image.webp_path(Variant::Medium)), (800, 800));
    }

    /// Smooth gradients with light grain, closer to a product photo than flat colour
    fn photo_like(width: u32, height: u32) -> DynamicImage {
        use rand::{Rng, SeedableRng};

        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let pixels = image::RgbImage::from_fn(width, height, |x, y| {
            let mut grain = || rng.gen_range(0..12u8);
            image::Rgb([
                (x * 200 / width) as u8 + grain(),
                (y * 200 / height) as u8 + grain(),
                ((x + y) * 120 / (width + height)) as u8 + grain(),
            ])
        });
        DynamicImage::ImageRgb8(pixels)
    }

    #[cfg(feature = "webp")]
    #[test]
    fn lossy_webp_is_smaller_than_the_jpeg_it_replaces() {
        let (_dir, storage, optimizer) = setup(true);
        let mut bytes = Cursor::new(Vec::new());
        photo_like(1200, 900)
            .write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, 85))
            .unwrap();
        storage.put("p/photo.jpg", bytes.get_ref()).unwrap();
        let mut image = image_at("p/photo.jpg");

        optimizer.optimize(&mut image).unwrap();

        let size = |path: &str| storage.size(path).unwrap();
        assert!(size(&image.webp_path(Variant::Original)) < size(&image.path));
        assert!(size(&image.webp_path(Variant::Thumbnail)) < size(&image.thumbnail_path()));
    }

    #[test]
    fn rows_pointing_outside_the_disk_are_rejected() {
        let (_dir, _storage, optimizer) = setup(false);
        let mut image = image_at("../outside.png");

        assert!(optimizer.optimize(&mut image).is_err());
        assert!(!image.is_optimized);
    }

    #[test]
    fn batch_continues_past_a_broken_image() {
        let (_dir, storage, optimizer) = setup(false);
        let first = store(&storage, "p/one.png", 40, 40, ImageFormat::Png);
        storage.put("p/two.png", b"definitely not a png").unwrap();
        let second = image_at("p/two.png");
        let third = store(&storage, "p/three.png", 40, 40, ImageFormat::Png);

        let mut batch = vec![first, second, third];
        let summary = optimizer.optimize_batch(&mut batch, BatchOptions::default());

        assert_eq!(summary.optimized, 2);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.updated, vec![0, 2]);
        assert!(!batch[1].is_optimized);
        assert!(summary.total_bytes > 0);
    }

    #[test]
    fn batch_skip_rules() {
        let (_dir, storage, optimizer) = setup(false);
        let mut done = store(&storage, "p/done.png", 10, 10, ImageFormat::Png);
        optimizer.optimize(&mut done).unwrap();
        let fresh = store(&storage, "p/fresh.png", 10, 10, ImageFormat::Png);

        let mut batch = vec![done.clone(), fresh.clone()];
        let summary = optimizer.optimize_batch(&mut batch, BatchOptions::default());
        assert_eq!((summary.optimized, summary.skipped), (1, 1));

        storage.delete(&done.medium_path()).unwrap();
        let mut batch = vec![done.clone()];
        let only_missing = BatchOptions {
            only_missing: true,
            ..BatchOptions::default()
        };
        assert_eq!(optimizer.optimize_batch(&mut batch, only_missing).optimized, 1);

        let mut batch = vec![done];
        let forced = BatchOptions {
            force: true,
            ..BatchOptions::default()
        };
        assert_eq!(optimizer.optimize_batch(&mut batch, forced).optimized, 1);
    }

    #[test]
    fn missing_file_is_reported() {
        let (_dir, _storage, optimizer) = setup(false);
        let mut image = image_at("p/ghost.png");

        assert!(matches!(
            optimizer.optimize(&mut image),
            Err(OptimizationError::Missing(_))
        ));
    }
}
