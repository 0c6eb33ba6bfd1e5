//! Storage disks for media files
//!
//! Paths handed to a [`Storage`] are relative to the disk root and always use
//! `/` as separator, matching what is recorded on image rows.

use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::StorageConfig;

/// Capabilities the importer and optimizer need from a disk
pub trait Storage: Send + Sync {
    /// Name of the disk, recorded on stored images
    fn name(&self) -> &str;

    fn exists(&self, path: &str) -> bool;

    fn put(&self, path: &str, contents: &[u8]) -> io::Result<()>;

    /// Remove a file. Missing files are not an error.
    fn delete(&self, path: &str) -> io::Result<()>;

    fn make_directory(&self, path: &str) -> io::Result<()>;

    /// Size in bytes of a stored file
    fn size(&self, path: &str) -> io::Result<u64>;

    /// Absolute filesystem path for a stored file
    fn path(&self, path: &str) -> io::Result<PathBuf>;

    /// Public URL of a stored file
    fn url(&self, path: &str) -> String;
}

/// Disk backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalDisk {
    name: String,
    root: PathBuf,
    base_url: String,
}

impl LocalDisk {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.disk, &config.root, &config.url)
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("path escapes the disk root: {path}"),
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl Storage for LocalDisk {
    fn name(&self) -> &str {
        &self.name
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok_and(|p| p.exists())
    }

    fn put(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, contents)
    }

    fn delete(&self, path: &str) -> io::Result<()> {
        match std::fs::remove_file(self.resolve(path)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn make_directory(&self, path: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.resolve(path)?)
    }

    fn size(&self, path: &str) -> io::Result<u64> {
        Ok(std::fs::metadata(self.resolve(path)?)?.len())
    }

    fn path(&self, path: &str) -> io::Result<PathBuf> {
        self.resolve(path)
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
