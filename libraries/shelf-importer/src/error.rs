//! Error types for the importer

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of one external tool run
#[derive(Debug, Error)]
pub enum ToolError {
    /// The run exceeded its time limit and was killed
    #[error("import tool timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// The tool reported an error for the batch
    ///
    /// The tool does not say which album caused it, so `failed` is the whole
    /// batch.
    #[error("import tool reported an error for {} album(s): {detail}", .failed.len())]
    BatchFailure {
        failed: Vec<shelf_core::AlbumId>,
        detail: String,
    },

    /// Non-zero exit without a recognisable error line
    #[error("import tool exited with {status}: {detail}")]
    RunFailure { status: String, detail: String },

    /// The tool's log no longer matches the expected format
    #[error("unexpected import log content at line {line}: {detail}")]
    ParseFailure { line: usize, detail: String },

    /// The tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ToolError {
    /// Whether a re-drive may reconcile this failure and move on
    pub fn is_batch_level(&self) -> bool {
        matches!(self, Self::BatchFailure { .. } | Self::Timeout(_))
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("another instance is already running")]
    LockHeld,

    #[error("Lock error: {0}")]
    Lock(#[source] std::io::Error),

    #[error("Scan error: {0}")]
    Scan(String),

    #[error("Album not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Invalid album id: {0:?}")]
    InvalidAlbumId(String),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Storage error: {0}")]
    Storage(#[from] shelf_storage::StorageError),

    #[error(transparent)]
    Core(#[from] shelf_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Import cancelled")]
    Cancelled,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
