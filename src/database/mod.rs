use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, migrate::MigrateDatabase};
use tracing::info;

use crate::models::StoredImage;

const IMAGE_COLUMNS: &str = "id, filename, original_name, mime_type, extension, path, disk, size, \
     width, height, is_optimized, metadata, imageable_type, imageable_id, sort_order, \
     is_featured, created_at, updated_at";

/// Image catalog backed by SQLite
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(db_url: &str) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");

        // Create database file if it doesn't exist
        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            if let Some(parent) = std::path::Path::new(db_url.trim_start_matches("sqlite:")).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            info!("Creating database file");
            Sqlite::create_database(db_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 5 })
            .connect(db_url)
            .await?;

        // Run migrations
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Database initialized successfully");
        Ok(Self { pool })
    }

    /// Insert a new image row and return its id
    pub async fn insert_image(&self, image: &StoredImage) -> Result<i64> {
        let result = sqlx::query(
            r"
            INSERT INTO images (filename, original_name, mime_type, extension, path, disk, size,
                                width, height, is_optimized, metadata, imageable_type, imageable_id,
                                sort_order, is_featured, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&image.filename)
        .bind(&image.original_name)
        .bind(&image.mime_type)
        .bind(&image.extension)
        .bind(&image.path)
        .bind(&image.disk)
        .bind(image.size)
        .bind(image.width)
        .bind(image.height)
        .bind(image.is_optimized)
        .bind(serde_json::to_string(&image.metadata)?)
        .bind(&image.imageable_type)
        .bind(image.imageable_id)
        .bind(image.sort_order)
        .bind(image.is_featured)
        .bind(image.created_at)
        .bind(image.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_image(&self, id: i64) -> Result<Option<StoredImage>> {
        let row = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(image_from_row).transpose()
    }

    pub async fn list_images(&self) -> Result<Vec<StoredImage>> {
        let rows = sqlx::query(&format!("SELECT {IMAGE_COLUMNS} FROM images ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(image_from_row).collect()
    }

    pub async fn images_for_owner(&self, owner_type: &str, owner_id: i64) -> Result<Vec<StoredImage>> {
        let rows = sqlx::query(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images \
             WHERE imageable_type = ? AND imageable_id = ? ORDER BY sort_order, id"
        ))
        .bind(owner_type)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(image_from_row).collect()
    }

    /// Persist the fields the optimizer rewrites
    pub async fn save_optimization(&self, image: &StoredImage) -> Result<()> {
        sqlx::query(
            r"
            UPDATE images
            SET size = ?, width = ?, height = ?, is_optimized = ?, metadata = ?, updated_at = ?
            WHERE id = ?
            ",
        )
        .bind(image.size)
        .bind(image.width)
        .bind(image.height)
        .bind(image.is_optimized)
        .bind(serde_json::to_string(&image.metadata)?)
        .bind(image.updated_at)
        .bind(image.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Make `id` the only featured image among its owner's images
    pub async fn set_featured(&self, id: i64) -> Result<()> {
        let image = self
            .get_image(id)
            .await?
            .with_context(|| format!("image {id} not found"))?;

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();

        if let (Some(owner_type), Some(owner_id)) = (&image.imageable_type, image.imageable_id) {
            sqlx::query(
                "UPDATE images SET is_featured = 0, updated_at = ? \
                 WHERE imageable_type = ? AND imageable_id = ? AND id != ?",
            )
            .bind(now)
            .bind(owner_type)
            .bind(owner_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE images SET is_featured = 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_image(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

fn image_from_row(row: &SqliteRow) -> Result<StoredImage> {
    let metadata: String = row.try_get("metadata")?;

    Ok(StoredImage {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        original_name: row.try_get("original_name")?,
        mime_type: row.try_get("mime_type")?,
        extension: row.try_get("extension")?,
        path: row.try_get("path")?,
        disk: row.try_get("disk")?,
        size: row.try_get("size")?,
        width: row.try_get("width")?,
        height: row.try_get("height")?,
        is_optimized: row.try_get("is_optimized")?,
        metadata: serde_json::from_str(&metadata)
            .with_context(|| format!("invalid metadata JSON: {metadata}"))?,
        imageable_type: row.try_get("imageable_type")?,
        imageable_id: row.try_get("imageable_id")?,
        sort_order: row.try_get("sort_order")?,
        is_featured: row.try_get("is_featured")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
