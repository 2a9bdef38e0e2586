//! Advisory file lock.
//!
//! An exclusive `flock`-style lock on a designated file. The lock belongs to the
//! open file handle, so it is released when the handle is closed, including
//! when the owning process dies.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use coldvault_core::{ArchiveError, ArchiveResult};
use fs2::FileExt;

/// Exclusive advisory lock on one file.
///
/// Two `SimpleFileLock`s on the same path exclude each other, even inside one
/// process. Releasing is idempotent.
#[derive(Debug)]
pub struct SimpleFileLock {
    path: PathBuf,
    file: Option<File>,
    locked: bool,
}

impl SimpleFileLock {
    /// Opens (creating if needed) the lock file at `path`. Does not lock.
    pub fn open(path: impl Into<PathBuf>) -> ArchiveResult<Self> {
        let path = path.into();
        let file = open_lock_file(&path)?;
        Ok(Self {
            path,
            file: Some(file),
            locked: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Tries to take the lock without blocking.
    ///
    /// Returns `Ok(false)` when another handle holds it.
    pub fn try_lock(&mut self) -> ArchiveResult<bool> {
        if self.locked {
            return Ok(true);
        }
        let file = self.handle()?;
        match file.try_lock_exclusive() {
            Ok(()) => {
                self.locked = true;
                Ok(true)
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(ArchiveError::from_io(e, &self.path)),
        }
    }

    /// Takes the lock, blocking the calling thread until it is available.
    pub fn lock(&mut self) -> ArchiveResult<()> {
        if self.locked {
            return Ok(());
        }
        let file = self.handle()?;
        file.lock_exclusive()
            .map_err(|e| ArchiveError::from_io(e, &self.path))?;
        self.locked = true;
        Ok(())
    }

    /// Releases the lock and closes the handle.
    ///
    /// Never fails: releasing an unlocked or already released lock is a no-op.
    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            if self.locked {
                if let Err(e) = file.unlock() {
                    // Closing the handle below drops the lock anyway.
                    tracing::warn!(path = %self.path.display(), error = %e, "Failed to unlock lock file");
                }
            }
        }
        self.locked = false;
    }

    fn handle(&mut self) -> ArchiveResult<&File> {
        if self.file.is_none() {
            self.file = Some(open_lock_file(&self.path)?);
        }
        self.file
            .as_ref()
            .ok_or_else(|| ArchiveError::internal("lock file handle missing"))
    }
}

impl Drop for SimpleFileLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn open_lock_file(path: &Path) -> ArchiveResult<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Never truncate: the file may be locked by someone else.
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| ArchiveError::from_io(e, path))
}
