//! Image catalog operations that touch both the database and the storage disk

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::database::Database;
use crate::models::StoredImage;
use crate::storage::Storage;

/// Owner an image is attached to, e.g. `product:42`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner {
    pub kind: String,
    pub id: i64,
}

impl std::str::FromStr for Owner {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("owner must look like TYPE:ID, got {s}"))?;
        if kind.is_empty() {
            anyhow::bail!("owner type is empty in {s}");
        }
        Ok(Self {
            kind: kind.to_string(),
            id: id.parse()?,
        })
    }
}

#[derive(Clone)]
pub struct MediaLibrary {
    database: Database,
    storage: Arc<dyn Storage>,
}

impl MediaLibrary {
    pub fn new(database: Database, storage: Arc<dyn Storage>) -> Self {
        Self { database, storage }
    }

    /// Persist freshly downloaded images for an owner, returning them with their ids
    pub async fn attach(&self, images: Vec<StoredImage>, owner: &Owner) -> Result<Vec<StoredImage>> {
        let existing = self.database.images_for_owner(&owner.kind, owner.id).await?;
        let has_featured = existing.iter().any(|img| img.is_featured);
        let offset = existing.len() as i64;

        let mut attached = Vec::with_capacity(images.len());
        for (index, mut image) in images.into_iter().enumerate() {
            image.imageable_type = Some(owner.kind.clone());
            image.imageable_id = Some(owner.id);
            image.sort_order = offset + index as i64;
            image.is_featured = !has_featured && index == 0;
            image.id = self.database.insert_image(&image).await?;
            attached.push(image);
        }

        info!(
            "Attached {} images to {}:{}",
            attached.len(),
            owner.kind,
            owner.id
        );
        Ok(attached)
    }

    /// Delete an image row, then its original and every derived file.
    ///
    /// Files are removed best-effort once the row is gone; a file that cannot
    /// be removed is logged and left behind.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let Some(image) = self.database.get_image(id).await? else {
            return Ok(false);
        };
        if !self.database.delete_image(id).await? {
            return Ok(false);
        }

        for path in std::iter::once(image.path.clone()).chain(image.derived_paths()) {
            if let Err(e) = self.storage.delete(&path) {
                warn!("Failed to delete {}: {}", path, e);
            }
        }

        info!("Deleted image {} ({})", id, image.path);
        Ok(true)
    }
}
