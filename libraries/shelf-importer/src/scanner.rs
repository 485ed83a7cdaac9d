//! Album directory scanning
//!
//! An album is a direct subdirectory of the albums root. Plain files and
//! symlinks at the top level are ignored, as is anything deeper.

use crate::{ImportError, Result};
use chrono::{DateTime, Utc};
use shelf_core::{time, AlbumId};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Lists album directories under one root
#[derive(Debug, Clone)]
pub struct AlbumScanner {
    root: PathBuf,
}

impl AlbumScanner {
    /// Create a scanner for `root`, which must be an existing directory
    ///
    /// A relative root is resolved against the current directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = std::path::absolute(root)?;
        let metadata = std::fs::metadata(&root).map_err(|e| match e.kind() {
            ErrorKind::NotFound => ImportError::NotFound(root.clone()),
            _ => ImportError::Scan(format!("failed to access {}: {e}", root.display())),
        })?;

        if !metadata.is_dir() {
            return Err(ImportError::NotADirectory(root));
        }

        Ok(Self { root })
    }

    /// The albums root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every album with its directory mtime, sorted by id
    pub fn list_albums(&self) -> Result<Vec<(AlbumId, DateTime<Utc>)>> {
        let walker = WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        let mut albums = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| ImportError::Scan(e.to_string()))?;
            if !entry.file_type().is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str() else {
                tracing::warn!(
                    "Ignoring album directory with non-UTF-8 name: {}",
                    entry.path().display()
                );
                continue;
            };

            let modified = entry
                .metadata()
                .map_err(|e| ImportError::Scan(e.to_string()))?
                .modified()?;

            albums.push((AlbumId::new(name), time::from_system_time(modified)));
        }

        Ok(albums)
    }

    /// Albums whose mtime is strictly after `since`
    pub fn albums_since(&self, since: DateTime<Utc>) -> Result<Vec<(AlbumId, DateTime<Utc>)>> {
        Ok(self
            .list_albums()?
            .into_iter()
            .filter(|(_, mtime)| *mtime > since)
            .collect())
    }

    /// Absolute path of an album
    pub fn album_path(&self, id: &AlbumId) -> Result<PathBuf> {
        validate_album_id(id)?;
        Ok(self.root.join(id.as_str()))
    }

    /// Current mtime of one album directory
    pub fn album_mtime(&self, id: &AlbumId) -> Result<DateTime<Utc>> {
        let path = self.album_path(id)?;
        let metadata = stat_album(&path)?;
        Ok(time::from_system_time(metadata.modified()?))
    }

    /// Check that an album exists and is a directory
    pub fn validate_album(&self, id: &AlbumId) -> Result<()> {
        let path = self.album_path(id)?;
        stat_album(&path).map(|_| ())
    }
}

fn stat_album(path: &Path) -> Result<std::fs::Metadata> {
    let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => ImportError::NotFound(path.to_path_buf()),
        _ => ImportError::Io(e),
    })?;

    if !metadata.is_dir() {
        return Err(ImportError::NotADirectory(path.to_path_buf()));
    }

    Ok(metadata)
}

/// Reject ids that are empty or could escape the albums root
pub fn validate_album_id(id: &AlbumId) -> Result<()> {
    let raw = id.as_str();
    if raw.trim().is_empty() {
        return Err(ImportError::InvalidAlbumId(raw.to_string()));
    }

    let only_normal = Path::new(raw)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));

    if !only_normal {
        return Err(ImportError::InvalidAlbumId(raw.to_string()));
    }

    Ok(())
}
