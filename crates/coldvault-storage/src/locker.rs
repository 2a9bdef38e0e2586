//! Per-bucket locks for the recovery sweep.

use std::path::{Path, PathBuf};

use coldvault_core::{ArchiveError, ArchiveResult, Bucket};

use crate::lock::SimpleFileLock;

/// Hands out one [`SimpleFileLock`] per bucket identity.
///
/// Lock files live at `{lock_root}/{index}/{bucket}.lock`, outside the failed
/// area, so moving a bucket never moves its lock. Lock files are left in place
/// after release.
#[derive(Debug, Clone)]
pub struct BucketLocker {
    lock_root: PathBuf,
}

/// A held bucket lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct BucketLock {
    bucket: Bucket,
    lock: SimpleFileLock,
}

impl BucketLock {
    pub fn bucket(&self) -> &Bucket {
        &self.bucket
    }

    pub fn is_held(&self) -> bool {
        self.lock.is_locked()
    }

    /// Releases the lock. Idempotent.
    pub fn release(&mut self) {
        self.lock.release();
    }
}

impl BucketLocker {
    pub fn new(lock_root: impl Into<PathBuf>) -> Self {
        Self {
            lock_root: lock_root.into(),
        }
    }

    pub fn lock_root(&self) -> &Path {
        &self.lock_root
    }

    pub fn lock_path(&self, bucket: &Bucket) -> PathBuf {
        self.lock_root
            .join(&bucket.index)
            .join(format!("{}.lock", bucket.name))
    }

    /// Locks a bucket without waiting for other holders.
    ///
    /// Returns `Ok(None)` when another holder has it. Opening the lock file
    /// runs on the blocking pool.
    pub async fn try_lock_bucket(&self, bucket: &Bucket) -> ArchiveResult<Option<BucketLock>> {
        let path = self.lock_path(bucket);
        let lock = blocking(move || {
            let mut lock = SimpleFileLock::open(path)?;
            Ok(lock.try_lock()?.then_some(lock))
        })
        .await?;

        match lock {
            Some(lock) => Ok(Some(BucketLock {
                bucket: bucket.clone(),
                lock,
            })),
            None => {
                tracing::debug!(bucket = %bucket.identity(), "Bucket lock is held elsewhere");
                Ok(None)
            }
        }
    }

    /// Locks a bucket, waiting on the blocking pool until the lock is free.
    pub async fn lock_bucket(&self, bucket: &Bucket) -> ArchiveResult<BucketLock> {
        let path = self.lock_path(bucket);
        let lock = blocking(move || {
            let mut lock = SimpleFileLock::open(path)?;
            lock.lock()?;
            Ok(lock)
        })
        .await?;

        Ok(BucketLock {
            bucket: bucket.clone(),
            lock,
        })
    }

    /// Releases a held lock. Unlocking never waits.
    pub fn unlock_bucket(&self, mut lock: BucketLock) {
        lock.release();
    }
}

async fn blocking<T, F>(f: F) -> ArchiveResult<T>
where
    F: FnOnce() -> ArchiveResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ArchiveError::internal(format!("lock task failed: {e}")))?
}
