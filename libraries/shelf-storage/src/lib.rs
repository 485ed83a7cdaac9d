//! Shelf Storage
//!
//! `SQLite` status store for Shelf.
//!
//! One table, `albums`, maps every album directory Shelf has seen to its
//! discovery time, source mtime, import time, status and failure count.
//!
//! # Architecture
//!
//! - **Vertical Slicing**: each feature owns its own queries (`albums`)
//! - **One Writer, Many Readers**: the database runs in WAL mode so a read-only
//!   `stats` call never blocks, or is blocked by, an import in progress
//! - **Atomic Bulk Transitions**: every multi-row mutation is one transaction
//!
//! # Example
//!
//! ```rust,no_run
//! use shelf_core::{AlbumId, AlbumStatus};
//! use shelf_storage::{albums, open_database};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = open_database(Path::new("/var/lib/shelf/db.sqlite")).await?;
//!
//! let album = AlbumId::new("Artist - Album");
//! albums::add_new(&pool, &album, chrono::Utc::now()).await?;
//! albums::mark_status(&pool, &[album], AlbumStatus::Imported).await?;
//!
//! let counts = albums::stats_by_status(&pool).await?;
//! println!("{} imported", counts.imported);
//! # Ok(())
//! # }
//! ```

mod error;

// Vertical slices
pub mod albums;

pub use error::StorageError;

use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

// Embed migrations into binary
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// How long a connection waits on a locked database before failing
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_CONNECTIONS: u32 = 5;

/// Run database migrations
///
/// Safe to call on every start; applied migrations are skipped.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), StorageError> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))
}

/// Open (creating if needed) the database file and apply migrations
pub async fn open_database(path: &Path) -> Result<SqlitePool, StorageError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let options = SqliteConnectOptions::new().filename(path);
    let pool = connect(options).await?;
    run_migrations(&pool).await?;

    tracing::debug!("Opened status database at {}", path.display());
    Ok(pool)
}

async fn connect(options: SqliteConnectOptions) -> Result<SqlitePool, StorageError> {
    let options = options
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal) // One writer, concurrent readers
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    Ok(pool)
}
