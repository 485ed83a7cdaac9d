//! Album lifecycle coordination
//!
//! [`ImportCoordinator`] owns the data directory lock, the status database and
//! a [`BatchImporter`], and drives albums through
//!
//! ```text
//! pending  -> imported | skipped | failed
//! skipped  -> imported | skipped (re-attempt stamped) | failed
//! failed   -> imported | skipped | failed (failure count bumped)
//! ```
//!
//! Only `setup` ever moves an album back to pending. Batches run one after
//! another and each batch's status changes commit in one transaction, so a
//! cancelled or aborted operation keeps every batch finished before it.

use crate::lock::DataDirLock;
use crate::log_parser::SkipLogParser;
use crate::prompt::{RemovalPrompt, StdinPrompt};
use crate::scanner::AlbumScanner;
use crate::tool::{BatchImporter, BeetImporter};
use crate::{ImportError, Result, ToolError};
use chrono::{DateTime, Utc};
use shelf_core::{AlbumId, AlbumStatus, ShelfConfig, StatusCounts, BATCH_SIZE};
use shelf_storage::albums::{self, BatchOutcome};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// What the driving loop does after one batch
#[derive(Debug)]
pub enum BatchStep {
    /// Batch settled, carry on with the next one
    Continue,
    /// Stop the operation with this error
    Abort(ImportError),
    /// Nothing left to do
    Done,
}

impl BatchStep {
    fn from_result(result: Result<()>) -> Self {
        match result {
            Ok(()) => Self::Continue,
            Err(e) => Self::Abort(e),
        }
    }
}

/// How a re-drive submits its batches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redrive {
    /// Quiet import; the skip list decides, still-skipped albums are stamped
    Quiet,
    /// Operator-driven import; success imports the whole batch
    Interactive,
}

/// Read-write coordinator for one data directory
pub struct ImportCoordinator<I: BatchImporter = BeetImporter> {
    pool: SqlitePool,
    scanner: AlbumScanner,
    parser: SkipLogParser,
    importer: I,
    prompt: Box<dyn RemovalPrompt>,
    lock: Option<DataDirLock>,
}

impl ImportCoordinator<BeetImporter> {
    /// Lock the data directory and wire up the real tool and terminal prompt
    pub async fn open(config: &ShelfConfig) -> Result<Self> {
        let importer = BeetImporter::from_config(config)?;
        Self::with_importer(config, importer, Box::new(StdinPrompt::new())).await
    }
}

impl<I: BatchImporter> ImportCoordinator<I> {
    /// Lock the data directory and use the given importer and prompt
    pub async fn with_importer(
        config: &ShelfConfig,
        importer: I,
        prompt: Box<dyn RemovalPrompt>,
    ) -> Result<Self> {
        config.validate()?;

        let lock = DataDirLock::acquire(&config.data_dir, &config.lock_path())?;
        let scanner = AlbumScanner::new(&config.albums_dir)?;
        let pool = shelf_storage::open_database(&config.database_path()).await?;

        Ok(Self {
            pool,
            parser: SkipLogParser::new(scanner.root()),
            scanner,
            importer,
            prompt,
            lock: Some(lock),
        })
    }

    /// The status database
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialise the store from what is already on disk
    ///
    /// Every album gets a record. Albums named in `previous_log`'s skip lines
    /// become skipped; the rest are pending when modified after `cutoff` and
    /// imported otherwise. Running it again re-applies the same rules.
    pub async fn setup(
        &self,
        cutoff: DateTime<Utc>,
        previous_log: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let skipped: HashSet<AlbumId> = match previous_log {
            Some(path) => {
                match tokio::fs::metadata(path).await {
                    Ok(_) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        return Err(ImportError::NotFound(path.to_path_buf()));
                    }
                    Err(e) => return Err(e.into()),
                }
                let skipped = self.parser.parse_skipped(path).await?;
                tracing::info!("Setup: found {} skipped albums in previous log", skipped.len());
                skipped.into_iter().collect()
            }
            None => HashSet::new(),
        };

        let found = self.scanner.list_albums()?;
        tracing::info!("Setup: found {} albums", found.len());

        if cancel.is_cancelled() {
            return Err(ImportError::Cancelled);
        }

        albums::add_many(&self.pool, &found).await?;

        let mut to_skip = Vec::new();
        let mut to_pend = Vec::new();
        let mut to_import = Vec::new();
        for (id, mtime) in found {
            if skipped.contains(&id) {
                to_skip.push(id);
            } else if mtime > cutoff {
                to_pend.push(id);
            } else {
                to_import.push(id);
            }
        }

        albums::mark_status(&self.pool, &to_skip, AlbumStatus::Skipped).await?;
        albums::mark_status(&self.pool, &to_pend, AlbumStatus::Pending).await?;
        albums::mark_status(&self.pool, &to_import, AlbumStatus::Imported).await?;

        tracing::info!(
            "Setup: {} pending, {} imported, {} skipped",
            to_pend.len(),
            to_import.len(),
            to_skip.len()
        );
        Ok(())
    }

    /// Discover new albums and import everything pending
    pub async fn import(&self, cancel: &CancellationToken) -> Result<()> {
        let watermark = albums::latest_watermark(&self.pool).await?;
        let discovered = self.scanner.albums_since(watermark)?;
        tracing::info!(
            "Import: found {} new albums since {}",
            discovered.len(),
            watermark.to_rfc3339()
        );

        for (id, _) in &discovered {
            tracing::debug!("Import: discovered {}", id);
        }
        albums::add_many(&self.pool, &discovered).await?;

        loop {
            match self.import_next_batch(cancel).await {
                BatchStep::Continue => {}
                BatchStep::Done => return Ok(()),
                BatchStep::Abort(e) => return Err(e),
            }
        }
    }

    async fn import_next_batch(&self, cancel: &CancellationToken) -> BatchStep {
        if cancel.is_cancelled() {
            return BatchStep::Abort(ImportError::Cancelled);
        }

        let pending = match albums::list_by_status(&self.pool, AlbumStatus::Pending).await {
            Ok(pending) => pending,
            Err(e) => return BatchStep::Abort(e.into()),
        };
        if pending.is_empty() {
            return BatchStep::Done;
        }

        let batch = &pending[..pending.len().min(BATCH_SIZE)];
        tracing::info!(
            "Import: importing batch of {} ({} pending)",
            batch.len(),
            pending.len()
        );

        match self.importer.import_batch(batch).await {
            Ok(skipped) => BatchStep::from_result(self.record_outcome(batch, &skipped, false).await),
            Err(ToolError::BatchFailure { failed, detail }) => {
                let mut failed = within_batch(batch, &failed);
                if failed.is_empty() {
                    failed = batch.to_vec();
                }
                tracing::warn!("Import: {} albums failed to import: {}", failed.len(), detail);
                let marked = albums::mark_status(&self.pool, &failed, AlbumStatus::Failed)
                    .await
                    .map(|_| ())
                    .map_err(ImportError::from);
                BatchStep::from_result(marked)
            }
            Err(e) => BatchStep::Abort(e.into()),
        }
    }

    /// Re-run every skipped album through a quiet import
    pub async fn retry_skips(&self, cancel: &CancellationToken) -> Result<()> {
        let skipped = albums::list_by_status(&self.pool, AlbumStatus::Skipped).await?;
        if skipped.is_empty() {
            tracing::info!("RetrySkips: no skipped albums found");
            return Ok(());
        }
        tracing::info!("RetrySkips: found {} skipped albums", skipped.len());

        self.redrive("RetrySkips", &skipped, Redrive::Quiet, cancel).await
    }

    /// Walk the operator through every skipped album
    pub async fn handle_skips(&self, cancel: &CancellationToken) -> Result<()> {
        let skipped = albums::list_by_status(&self.pool, AlbumStatus::Skipped).await?;
        if skipped.is_empty() {
            tracing::info!("HandleSkips: no skipped albums found");
            return Ok(());
        }
        tracing::info!("HandleSkips: found {} skipped albums", skipped.len());

        self.redrive("HandleSkips", &skipped, Redrive::Interactive, cancel).await
    }

    /// Walk the operator through the skipped albums matching every term
    pub async fn handle_skip(&self, terms: &[String], cancel: &CancellationToken) -> Result<()> {
        if terms.iter().all(|t| t.trim().is_empty()) {
            return Err(ImportError::InvalidInput(
                "at least one search term is required".to_string(),
            ));
        }

        let skipped = albums::list_by_status(&self.pool, AlbumStatus::Skipped).await?;
        if skipped.is_empty() {
            tracing::info!("HandleSkip: no skipped albums found");
            return Ok(());
        }

        let matches: Vec<AlbumId> = skipped
            .into_iter()
            .filter(|id| id.matches_all(terms))
            .collect();
        if matches.is_empty() {
            tracing::info!(
                "HandleSkip: no skipped albums match the query: {}",
                terms.join(" ")
            );
            return Ok(());
        }
        tracing::info!("HandleSkip: found {} matching skipped albums", matches.len());

        self.redrive("HandleSkip", &matches, Redrive::Interactive, cancel).await
    }

    async fn redrive(
        &self,
        operation: &str,
        ids: &[AlbumId],
        mode: Redrive,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut batches = ids.chunks(BATCH_SIZE);
        loop {
            match self.redrive_next_batch(operation, batches.next(), mode, cancel).await {
                BatchStep::Continue => {}
                BatchStep::Done => return Ok(()),
                BatchStep::Abort(e) => return Err(e),
            }
        }
    }

    async fn redrive_next_batch(
        &self,
        operation: &str,
        batch: Option<&[AlbumId]>,
        mode: Redrive,
        cancel: &CancellationToken,
    ) -> BatchStep {
        let Some(batch) = batch else {
            return BatchStep::Done;
        };
        if cancel.is_cancelled() {
            return BatchStep::Abort(ImportError::Cancelled);
        }

        tracing::info!("{}: processing batch of {} albums", operation, batch.len());

        let result = match mode {
            Redrive::Quiet => self.importer.import_batch(batch).await,
            Redrive::Interactive => self
                .importer
                .import_batch_interactive(batch)
                .await
                .map(|()| Vec::new()),
        };

        match result {
            Ok(skipped) => BatchStep::from_result(
                self.record_outcome(batch, &skipped, mode == Redrive::Quiet)
                    .await,
            ),
            Err(e) if e.is_batch_level() => {
                tracing::warn!("{}: import error occurred but continuing: {}", operation, e);
                let refreshed = albums::refresh_timestamp(&self.pool, batch)
                    .await
                    .map(|_| ())
                    .map_err(ImportError::from);
                BatchStep::from_result(refreshed)
            }
            Err(e) => BatchStep::Abort(e.into()),
        }
    }

    /// Retry failed albums one at a time after optional manual cleanup
    ///
    /// For each album the operator may enter removal queries until they
    /// answer with an empty line. Removal failures are reported and the retry
    /// goes ahead anyway.
    pub async fn handle_errors(&self, cancel: &CancellationToken) -> Result<()> {
        let failed = albums::list_by_status(&self.pool, AlbumStatus::Failed).await?;
        if failed.is_empty() {
            tracing::info!("HandleErrors: no failed albums found");
            return Ok(());
        }
        tracing::info!("HandleErrors: found {} failed albums", failed.len());

        for album in &failed {
            if cancel.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            while let Some(query) = self.prompt.ask(album).await? {
                if cancel.is_cancelled() {
                    return Err(ImportError::Cancelled);
                }
                if let Err(e) = self.importer.remove(&query).await {
                    tracing::warn!("HandleErrors: failed to remove entries for {:?}: {}", query, e);
                }
            }

            tracing::info!("HandleErrors: retrying album {}", album);
            match self.importer.import_batch(std::slice::from_ref(album)).await {
                Ok(skipped) => {
                    let status = if skipped.is_empty() {
                        AlbumStatus::Imported
                    } else {
                        AlbumStatus::Skipped
                    };
                    albums::mark_status(&self.pool, std::slice::from_ref(album), status).await?;
                    tracing::info!("HandleErrors: {} is now {}", album, status);
                }
                Err(e) => {
                    let count = albums::record_failed_retry(&self.pool, album).await?;
                    tracing::warn!(
                        "HandleErrors: album {} failed again ({} failures): {}",
                        album,
                        count,
                        e
                    );
                }
            }
        }

        Ok(())
    }

    /// Album counts per status
    pub async fn stats(&self) -> Result<StatusCounts> {
        Ok(albums::stats_by_status(&self.pool).await?)
    }

    /// Close the database and release the lock
    pub async fn close(mut self) -> Result<()> {
        self.pool.close().await;
        match self.lock.take() {
            Some(lock) => lock.release(),
            None => Ok(()),
        }
    }

    async fn record_outcome(
        &self,
        batch: &[AlbumId],
        skipped: &[AlbumId],
        refresh_skipped: bool,
    ) -> Result<()> {
        let skip_set: HashSet<&AlbumId> = skipped.iter().collect();
        for id in skipped {
            if !batch.contains(id) {
                tracing::warn!("Ignoring skipped album {} that was not in the batch", id);
            }
        }

        let (skipped, imported): (Vec<AlbumId>, Vec<AlbumId>) =
            batch.iter().cloned().partition(|id| skip_set.contains(id));

        for id in &imported {
            tracing::debug!("imported: {}", id);
        }
        for id in &skipped {
            tracing::debug!("skipped: {}", id);
        }
        tracing::info!(
            "Imported {} albums, {} skipped",
            imported.len(),
            skipped.len()
        );

        albums::apply_outcome(
            &self.pool,
            &BatchOutcome {
                imported,
                skipped,
                refresh_skipped,
            },
        )
        .await?;
        Ok(())
    }
}

/// Lock-free, read-only view of a data directory's status database
pub struct StatusReader {
    pool: SqlitePool,
}

impl StatusReader {
    pub async fn open(config: &ShelfConfig) -> Result<Self> {
        let pool = shelf_storage::open_database(&config.database_path()).await?;
        Ok(Self { pool })
    }

    /// Album counts per status
    pub async fn stats(&self) -> Result<StatusCounts> {
        Ok(albums::stats_by_status(&self.pool).await?)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn within_batch(batch: &[AlbumId], failed: &[AlbumId]) -> Vec<AlbumId> {
    batch.iter().filter(|id| failed.contains(id)).cloned().collect()
}
