//! Single-writer lock on the data directory
//!
//! A read-write coordinator holds an exclusive advisory lock on
//! `<data_dir>/lock` for its whole lifetime. Acquisition never waits: a second
//! writer fails at once with [`ImportError::LockHeld`].

use crate::{ImportError, Result};
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

/// Exclusive lock on a data directory, released on drop
#[derive(Debug)]
pub struct DataDirLock {
    file: Option<File>,
    path: PathBuf,
}

impl DataDirLock {
    /// Create the data directory if needed and take the lock at `lock_path`
    pub fn acquire(data_dir: &Path, lock_path: &Path) -> Result<Self> {
        ensure_data_dir(data_dir)?;

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
            .map_err(ImportError::Lock)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Err(ImportError::LockHeld),
            Err(TryLockError::Error(e)) => return Err(ImportError::Lock(e)),
        }

        tracing::debug!("Acquired lock {}", lock_path.display());
        Ok(Self {
            file: Some(file),
            path: lock_path.to_path_buf(),
        })
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock now, reporting any failure
    pub fn release(mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => file.unlock().map_err(ImportError::Lock),
            None => Ok(()),
        }
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.unlock() {
                tracing::warn!("Failed to release lock {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Create the data directory, owner-only on Unix
pub fn ensure_data_dir(dir: &Path) -> Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        builder.mode(0o700);
        builder.create(dir)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))?;
    }

    #[cfg(not(unix))]
    builder.create(dir)?;

    Ok(())
}
