use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod database;
mod description;
mod downloader;
mod error;
mod fetcher;
mod importer;
mod media;
mod models;
mod optimizer;
mod scrapers;
mod storage;
mod traits;

use config::Config;
use database::Database;
use fetcher::HttpFetcher;
use importer::ProductImporter;
use media::{MediaLibrary, Owner};
use models::ImportResult;
use optimizer::{BatchOptions, ImageOptimizer};
use scrapers::ScraperRegistry;
use storage::{LocalDisk, Storage};

#[derive(Parser)]
#[command(name = "product-importer")]
#[command(about = "Import marketplace products and optimize catalog images")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a product page and print the extracted fields
    Import {
        /// Marketplace product URL
        url: String,
        /// Storage folder for downloaded images (defaults to IMPORT_FOLDER)
        #[arg(long)]
        folder: Option<String>,
        /// Attach downloaded images to an owner, e.g. product:42
        #[arg(long)]
        owner: Option<Owner>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate thumbnail, medium and WebP variants for catalog images
    #[command(name = "images:optimize")]
    OptimizeImages {
        /// Re-process images already marked as optimized
        #[arg(long)]
        force: bool,
        /// Only process images with missing variant files
        #[arg(long)]
        only_missing: bool,
        /// Process a single image
        #[arg(long)]
        image_id: Option<i64>,
    },

    /// Delete an image and all of its variants
    #[command(name = "images:delete")]
    DeleteImage { id: i64 },

    /// Make an image its owner's featured image
    #[command(name = "images:feature")]
    FeatureImage { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let storage: Arc<dyn Storage> = Arc::new(LocalDisk::from_config(&config.storage));

    match cli.command {
        Commands::Import {
            url,
            folder,
            owner,
            json,
        } => {
            let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
            let importer = ProductImporter::new(
                ScraperRegistry::with_defaults(config.import.max_images),
                fetcher,
                storage.clone(),
                folder.unwrap_or_else(|| config.import.folder.clone()),
            );

            let mut result = importer.import(&url).await;

            if let (Some(owner), Some(data)) = (owner, result.data.as_mut()) {
                let database = Database::new(&config.database_url).await?;
                let library = MediaLibrary::new(database, storage.clone());
                let downloaded = std::mem::take(&mut data.downloaded);
                data.downloaded = library.attach(downloaded, &owner).await?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_import(&result, storage.as_ref());
            }

            if !result.success {
                anyhow::bail!(result.error.unwrap_or_else(|| "Import failed".to_string()));
            }
        }

        Commands::OptimizeImages {
            force,
            only_missing,
            image_id,
        } => {
            let database = Database::new(&config.database_url).await?;
            let mut images = match image_id {
                Some(id) => vec![
                    database
                        .get_image(id)
                        .await?
                        .with_context(|| format!("image {id} not found"))?,
                ],
                None => database.list_images().await?,
            };
            info!("Optimizing {} images", images.len());

            let optimizer = ImageOptimizer::new(storage.clone(), config.images.clone());
            let summary = optimizer.optimize_batch(
                &mut images,
                BatchOptions {
                    // A single requested image is always processed
                    force: force || image_id.is_some(),
                    only_missing,
                    show_progress: true,
                },
            );

            for &index in &summary.updated {
                database.save_optimization(&images[index]).await?;
            }

            println!("Optimized: {}", summary.optimized);
            println!("Skipped:   {}", summary.skipped);
            println!("Errors:    {}", summary.errors);
            println!("Storage:   {}", format_bytes(summary.total_bytes));
        }

        Commands::DeleteImage { id } => {
            let database = Database::new(&config.database_url).await?;
            let library = MediaLibrary::new(database, storage);
            if library.delete(id).await? {
                println!("Deleted image {id}");
            } else {
                anyhow::bail!("image {id} not found");
            }
        }

        Commands::FeatureImage { id } => {
            let database = Database::new(&config.database_url).await?;
            database.set_featured(id).await?;
            println!("Image {id} is now featured");
        }
    }

    Ok(())
}

fn print_import(result: &ImportResult, storage: &dyn Storage) {
    let Some(data) = &result.data else {
        println!(
            "Import failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
        return;
    };

    println!("Platform:    {}", data.source_platform);
    println!("Name:        {}", data.name);
    println!("Price:       {}", data.price);
    println!("SKU:         {}", data.sku.as_deref().unwrap_or("-"));
    println!("External ID: {}", data.external_id.as_deref().unwrap_or("-"));
    println!("Description: {}", data.description);
    if !data.defaulted.is_empty() {
        println!("Defaulted:   {}", data.defaulted.join(", "));
    }
    println!("Images ({}):", data.images.len());
    for image in &data.images {
        println!("  {image}");
    }
    println!("Downloaded ({}):", data.downloaded.len());
    for image in &data.downloaded {
        println!("  {} ({} bytes)", storage.url(&image.path), image.size);
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
