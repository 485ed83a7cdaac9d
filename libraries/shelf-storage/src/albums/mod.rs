//! Album status storage
//!
//! Every album Shelf has discovered, with its lifecycle status.
//!
//! Records are created once and never deleted. `add_new` is insert-if-absent,
//! so the first discovery's timestamps win. Status changes go through
//! [`mark_status`] and [`refresh_timestamp`], each of which applies to all
//! listed ids in a single transaction or to none of them.
//!
//! # Example
//!
//! ```rust,no_run
//! use shelf_core::{AlbumId, AlbumStatus};
//! use shelf_storage::albums;
//!
//! # async fn example(pool: &sqlx::SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
//! let since = albums::latest_watermark(pool).await?;
//!
//! let pending = albums::list_by_status(pool, AlbumStatus::Pending).await?;
//! albums::mark_status(pool, &pending, AlbumStatus::Imported).await?;
//! # Ok(())
//! # }
//! ```

use crate::StorageError;
use chrono::{DateTime, Utc};
use shelf_core::time::{self, from_micros, to_micros};
use shelf_core::{AlbumId, AlbumRecord, AlbumStatus, StatusCounts};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

type Result<T> = std::result::Result<T, StorageError>;

const ALBUM_COLUMNS: &str =
    "id, discovered_at, source_mtime, imported_at, status, failure_count";

/// Record an album as pending unless it is already known
///
/// Returns `true` when a new row was inserted.
pub async fn add_new(pool: &SqlitePool, id: &AlbumId, source_mtime: DateTime<Utc>) -> Result<bool> {
    let result = sqlx::query(
        r"
        INSERT INTO albums (id, discovered_at, source_mtime, imported_at, status, failure_count)
        VALUES (?, ?, ?, NULL, 'pending', 0)
        ON CONFLICT(id) DO NOTHING
        ",
    )
    .bind(id.as_str())
    .bind(to_micros(time::now()))
    .bind(to_micros(source_mtime))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Insert-if-absent for many albums in one transaction
///
/// Returns the number of albums that were new.
pub async fn add_many(pool: &SqlitePool, albums: &[(AlbumId, DateTime<Utc>)]) -> Result<u64> {
    if albums.is_empty() {
        return Ok(0);
    }

    let discovered_at = to_micros(time::now());
    let mut inserted = 0;
    let mut tx = pool.begin().await?;

    for (id, source_mtime) in albums {
        let result = sqlx::query(
            r"
            INSERT INTO albums (id, discovered_at, source_mtime, imported_at, status, failure_count)
            VALUES (?, ?, ?, NULL, 'pending', 0)
            ON CONFLICT(id) DO NOTHING
            ",
        )
        .bind(id.as_str())
        .bind(discovered_at)
        .bind(to_micros(*source_mtime))
        .execute(&mut *tx)
        .await?;

        inserted += result.rows_affected();
    }

    tx.commit().await?;
    Ok(inserted)
}

/// Move albums to `status`
///
/// `imported` stamps `imported_at` with the current time; every other status
/// clears it, so `imported_at` on a non-imported album only ever comes from
/// [`refresh_timestamp`]. Unknown ids are ignored. Returns the number of rows
/// updated.
pub async fn mark_status(pool: &SqlitePool, ids: &[AlbumId], status: AlbumStatus) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let updated = set_status(&mut tx, ids, status, time::now()).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Stamp `imported_at` with the current time without changing status
///
/// Records that a skipped or failed album was just re-attempted.
pub async fn refresh_timestamp(pool: &SqlitePool, ids: &[AlbumId]) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    let updated = touch(&mut tx, ids, time::now()).await?;
    tx.commit().await?;
    Ok(updated)
}

/// Result of one batch as the store records it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Albums the tool accepted
    pub imported: Vec<AlbumId>,
    /// Albums the tool skipped
    pub skipped: Vec<AlbumId>,
    /// Also stamp the skipped albums as just re-attempted
    pub refresh_skipped: bool,
}

/// Apply a whole batch outcome in one transaction
pub async fn apply_outcome(pool: &SqlitePool, outcome: &BatchOutcome) -> Result<()> {
    let now = time::now();
    let mut tx = pool.begin().await?;

    set_status(&mut tx, &outcome.imported, AlbumStatus::Imported, now).await?;
    set_status(&mut tx, &outcome.skipped, AlbumStatus::Skipped, now).await?;
    if outcome.refresh_skipped {
        touch(&mut tx, &outcome.skipped, now).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn set_status(
    conn: &mut SqliteConnection,
    ids: &[AlbumId],
    status: AlbumStatus,
    now: DateTime<Utc>,
) -> Result<u64> {
    let imported_at = (status == AlbumStatus::Imported).then(|| to_micros(now));
    let mut updated = 0;

    for id in ids {
        let result = sqlx::query("UPDATE albums SET status = ?, imported_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(imported_at)
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;

        updated += result.rows_affected();
    }

    Ok(updated)
}

async fn touch(conn: &mut SqliteConnection, ids: &[AlbumId], now: DateTime<Utc>) -> Result<u64> {
    let mut updated = 0;

    for id in ids {
        let result = sqlx::query("UPDATE albums SET imported_at = ? WHERE id = ?")
            .bind(to_micros(now))
            .bind(id.as_str())
            .execute(&mut *conn)
            .await?;

        updated += result.rows_affected();
    }

    Ok(updated)
}

/// Add one to an album's failure count, returning the new count
pub async fn increment_failure_count(pool: &SqlitePool, id: &AlbumId) -> Result<u32> {
    let count: Option<i64> = sqlx::query_scalar(
        "UPDATE albums SET failure_count = failure_count + 1 WHERE id = ? RETURNING failure_count",
    )
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    count
        .map(count_from_db)
        .transpose()?
        .ok_or_else(|| StorageError::not_found("Album", id.as_str()))
}

/// Record a failed retry: bump the failure count and stamp `imported_at`
///
/// One statement, so both changes land together. Returns the new count.
pub async fn record_failed_retry(pool: &SqlitePool, id: &AlbumId) -> Result<u32> {
    let count: Option<i64> = sqlx::query_scalar(
        r"
        UPDATE albums
        SET failure_count = failure_count + 1, imported_at = ?
        WHERE id = ?
        RETURNING failure_count
        ",
    )
    .bind(to_micros(time::now()))
    .bind(id.as_str())
    .fetch_optional(pool)
    .await?;

    count
        .map(count_from_db)
        .transpose()?
        .ok_or_else(|| StorageError::not_found("Album", id.as_str()))
}

/// Get an album's failure count
pub async fn get_failure_count(pool: &SqlitePool, id: &AlbumId) -> Result<u32> {
    let count: Option<i64> = sqlx::query_scalar("SELECT failure_count FROM albums WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    count
        .map(count_from_db)
        .transpose()?
        .ok_or_else(|| StorageError::not_found("Album", id.as_str()))
}

/// Greatest `source_mtime` of any known album, or the Unix epoch if none
pub async fn latest_watermark(pool: &SqlitePool) -> Result<DateTime<Utc>> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(source_mtime) FROM albums")
        .fetch_one(pool)
        .await?;

    match max {
        Some(micros) => timestamp_from_db(micros),
        None => Ok(time::epoch()),
    }
}

/// Album ids with the given status, oldest source mtime first
pub async fn list_by_status(pool: &SqlitePool, status: AlbumStatus) -> Result<Vec<AlbumId>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM albums WHERE status = ? ORDER BY source_mtime, id")
            .bind(status.as_str())
            .fetch_all(pool)
            .await?;

    Ok(ids.into_iter().map(AlbumId::from).collect())
}

/// Number of albums in each status
pub async fn stats_by_status(pool: &SqlitePool) -> Result<StatusCounts> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*) FROM albums GROUP BY status")
            .fetch_all(pool)
            .await?;

    let mut counts = StatusCounts::default();
    for (status, count) in rows {
        let status = AlbumStatus::from_str(&status)
            .ok_or_else(|| StorageError::invalid_row(format!("unknown status {status:?}")))?;
        counts.set(status, u64::try_from(count).unwrap_or_default());
    }

    Ok(counts)
}

/// Get one album record
pub async fn get(pool: &SqlitePool, id: &AlbumId) -> Result<Option<AlbumRecord>> {
    let row = sqlx::query(&format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?"))
        .bind(id.as_str())
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(record_from_row).transpose()
}

fn record_from_row(row: &SqliteRow) -> Result<AlbumRecord> {
    let status: String = row.try_get("status")?;
    let status = AlbumStatus::from_str(&status)
        .ok_or_else(|| StorageError::invalid_row(format!("unknown status {status:?}")))?;

    Ok(AlbumRecord {
        id: AlbumId::new(row.try_get::<String, _>("id")?),
        discovered_at: timestamp_from_db(row.try_get("discovered_at")?)?,
        source_mtime: timestamp_from_db(row.try_get("source_mtime")?)?,
        imported_at: row
            .try_get::<Option<i64>, _>("imported_at")?
            .map(timestamp_from_db)
            .transpose()?,
        status,
        failure_count: count_from_db(row.try_get("failure_count")?)?,
    })
}

fn timestamp_from_db(micros: i64) -> Result<DateTime<Utc>> {
    from_micros(micros)
        .ok_or_else(|| StorageError::invalid_row(format!("timestamp out of range: {micros}")))
}

fn count_from_db(count: i64) -> Result<u32> {
    u32::try_from(count)
        .map_err(|_| StorageError::invalid_row(format!("failure count out of range: {count}")))
}
