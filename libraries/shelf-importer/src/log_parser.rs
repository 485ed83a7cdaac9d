//! Parsing of the external tool's import log
//!
//! The tool writes one line per decision. Skipped albums look like
//!
//! ```text
//! skip /music/flac/Artist - Album; no match
//! ```
//!
//! The path ends at the first `"; "`, so an album name containing a bare `;`
//! survives but one containing `"; "` is cut short. Every other line is
//! ignored.

use crate::ToolError;
use shelf_core::AlbumId;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

const SKIP_PREFIX: &str = "skip ";

/// Extracts skipped album ids from an import log
#[derive(Debug, Clone)]
pub struct SkipLogParser {
    albums_root: PathBuf,
}

impl SkipLogParser {
    pub fn new(albums_root: impl AsRef<Path>) -> Self {
        Self {
            albums_root: normalize(albums_root.as_ref()),
        }
    }

    /// Read `log_path` and return the skipped albums in first-seen order
    ///
    /// A missing log means nothing was skipped.
    pub async fn parse_skipped(&self, log_path: &Path) -> Result<Vec<AlbumId>, ToolError> {
        let content = match tokio::fs::read_to_string(log_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ToolError::Io(e)),
        };

        self.parse_str(&content)
    }

    /// Parse log content already in memory
    pub fn parse_str(&self, content: &str) -> Result<Vec<AlbumId>, ToolError> {
        let mut seen = HashSet::new();
        let mut skipped = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let Some(rest) = line.strip_prefix(SKIP_PREFIX) else {
                continue;
            };

            let raw = rest.split_once("; ").map_or(rest, |(path, _)| path).trim();
            let id = self.album_id_for(raw).map_err(|detail| ToolError::ParseFailure {
                line: index + 1,
                detail,
            })?;

            if seen.insert(id.clone()) {
                skipped.push(id);
            }
        }

        Ok(skipped)
    }

    fn album_id_for(&self, raw: &str) -> Result<AlbumId, String> {
        let path = normalize(Path::new(raw));
        if !path.is_absolute() {
            return Err(format!("skipped path is not absolute: {raw:?}"));
        }

        let relative = path
            .strip_prefix(&self.albums_root)
            .map_err(|_| format!("skipped path is outside the albums directory: {raw:?}"))?;

        if relative.as_os_str().is_empty() {
            return Err(format!("skipped path is the albums directory itself: {raw:?}"));
        }

        Ok(AlbumId::new(relative.to_string_lossy()))
    }
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
