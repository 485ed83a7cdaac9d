//! Album lifecycle types

use super::AlbumId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an album stands in the import pipeline
///
/// `Pending` albums are waiting for their first automated import. The other
/// three are outcomes; re-drive operations move albums between them, and only
/// a full setup puts an album back to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlbumStatus {
    /// Discovered, not yet submitted
    Pending,
    /// Accepted by the external tool
    Imported,
    /// The external tool skipped it, usually because it needs a human decision
    Skipped,
    /// The external tool reported an error for the batch it was in
    Failed,
}

impl AlbumStatus {
    /// Every status, in display order
    pub const ALL: [AlbumStatus; 4] = [
        AlbumStatus::Pending,
        AlbumStatus::Imported,
        AlbumStatus::Skipped,
        AlbumStatus::Failed,
    ];

    /// Convert to string for database storage
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Imported => "imported",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Parse from string
    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "imported" => Some(Self::Imported),
            "skipped" => Some(Self::Skipped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlbumStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One tracked album
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlbumRecord {
    /// Directory name relative to the albums root
    pub id: AlbumId,

    /// When Shelf first saw the album
    pub discovered_at: DateTime<Utc>,

    /// Directory mtime at discovery; feeds the discovery watermark
    pub source_mtime: DateTime<Utc>,

    /// Last successful import, or last re-attempt for skipped/failed albums
    pub imported_at: Option<DateTime<Utc>>,

    /// Current status
    pub status: AlbumStatus,

    /// Number of failed retries from the failed state
    pub failure_count: u32,
}

/// Album counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl StatusCounts {
    /// Count for one status
    pub fn get(&self, status: AlbumStatus) -> u64 {
        match status {
            AlbumStatus::Pending => self.pending,
            AlbumStatus::Imported => self.imported,
            AlbumStatus::Skipped => self.skipped,
            AlbumStatus::Failed => self.failed,
        }
    }

    /// Overwrite the count for one status
    pub fn set(&mut self, status: AlbumStatus, count: u64) {
        match status {
            AlbumStatus::Pending => self.pending = count,
            AlbumStatus::Imported => self.imported = count,
            AlbumStatus::Skipped => self.skipped = count,
            AlbumStatus::Failed => self.failed = count,
        }
    }

    /// Total number of tracked albums
    pub fn total(&self) -> u64 {
        self.pending + self.imported + self.skipped + self.failed
    }

    /// `(status, count)` pairs in display order
    pub fn iter(&self) -> impl Iterator<Item = (AlbumStatus, u64)> + '_ {
        AlbumStatus::ALL.into_iter().map(|s| (s, self.get(s)))
    }
}
