//! Recovery sweep over the failed-bucket holding area.
//!
//! Every bucket in the failed area gets one more archive attempt per sweep,
//! under its bucket lock. Sweeps may run concurrently in any number of
//! processes; the lock guarantees that only one of them works on a given
//! bucket at a time.
//!
//! An archived bucket leaves the failed area through
//! [`BucketMover::retire`]. A bucket found fully archived with the same size
//! (a previous sweep archived it but died before retiring it) is retired
//! without another upload.

use coldvault_core::{ArchiveError, ArchiveResult, Bucket};
use serde::Serialize;
use std::path::Path;

use crate::archiver::BucketArchiver;
use crate::bucket_size::local_size;
use crate::locker::BucketLocker;
use crate::mover::BucketMover;

/// Result of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecoveryReport {
    /// Archived and removed from the failed area.
    pub archived: Vec<Bucket>,
    /// Still failing; left in place for the next sweep.
    pub failed: Vec<Bucket>,
    /// Locked by another sweep.
    pub skipped_locked: Vec<Bucket>,
    /// Gone from the failed area once the lock was taken.
    pub vanished: Vec<Bucket>,
    /// A different bucket is already archived under the same archive path;
    /// left in place.
    pub conflicts: Vec<Bucket>,
}

impl RecoveryReport {
    /// Number of buckets the sweep looked at.
    pub fn examined(&self) -> usize {
        self.archived.len()
            + self.failed.len()
            + self.skipped_locked.len()
            + self.vanished.len()
            + self.conflicts.len()
    }
}

/// Retries archiving of the buckets in the failed area.
#[derive(Clone)]
pub struct FailedBucketsArchiver {
    mover: BucketMover,
    locker: BucketLocker,
    archiver: BucketArchiver,
}

enum Attempt {
    Archived,
    Failed,
    Vanished,
    Conflict,
}

impl FailedBucketsArchiver {
    pub fn new(mover: BucketMover, locker: BucketLocker, archiver: BucketArchiver) -> Self {
        Self {
            mover,
            locker,
            archiver,
        }
    }

    /// Runs one sweep.
    ///
    /// Per-bucket failures are reported, never returned; only failing to list
    /// the failed area is an error.
    pub async fn archive_failed_buckets(&self) -> ArchiveResult<RecoveryReport> {
        self.purge_retired().await;

        let candidates = self.mover.failed_buckets().await?;
        let mut report = RecoveryReport::default();

        for bucket in candidates {
            let lock = match self.locker.try_lock_bucket(&bucket).await {
                Ok(Some(lock)) => lock,
                Ok(None) => {
                    tracing::info!(bucket = %bucket.identity(), "Bucket is being recovered elsewhere, skipping");
                    report.skipped_locked.push(bucket);
                    continue;
                }
                Err(e) => {
                    tracing::warn!(bucket = %bucket.identity(), error = %e, "Failed to lock bucket");
                    report.failed.push(bucket);
                    continue;
                }
            };

            let attempt = self.retry(&bucket).await;
            self.locker.unlock_bucket(lock);

            match attempt {
                Attempt::Archived => report.archived.push(bucket),
                Attempt::Failed => report.failed.push(bucket),
                Attempt::Vanished => report.vanished.push(bucket),
                Attempt::Conflict => report.conflicts.push(bucket),
            }
        }

        tracing::info!(
            archived = report.archived.len(),
            failed = report.failed.len(),
            skipped_locked = report.skipped_locked.len(),
            vanished = report.vanished.len(),
            conflicts = report.conflicts.len(),
            "Recovery sweep finished"
        );
        Ok(report)
    }

    /// Finishes deletions of retired buckets that an earlier sweep left behind.
    async fn purge_retired(&self) {
        let leftovers = match self.mover.retired_buckets().await {
            Ok(leftovers) => leftovers,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list retired buckets");
                return;
            }
        };

        for bucket in leftovers {
            let Ok(Some(lock)) = self.locker.try_lock_bucket(&bucket).await else {
                continue;
            };
            match self.mover.purge_retired(&bucket).await {
                Ok(()) => tracing::info!(bucket = %bucket.identity(), "Deleted retired bucket"),
                Err(e) => {
                    tracing::warn!(bucket = %bucket.identity(), error = %e, "Failed to delete retired bucket")
                }
            }
            self.locker.unlock_bucket(lock);
        }
    }

    /// One archive attempt for a locked bucket.
    async fn retry(&self, bucket: &Bucket) -> Attempt {
        let Some(path) = bucket.local_path.as_deref() else {
            return Attempt::Vanished;
        };
        // Another sweep may have archived and removed it before we got the lock.
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            tracing::debug!(bucket = %bucket.identity(), "Bucket left the failed area");
            return Attempt::Vanished;
        }

        match self.archiver.archive(bucket).await {
            Ok(_) => self.retire(bucket).await,
            Err(ArchiveError::FileOverwrite { path: archive_path }) => {
                if self.is_archived_copy(bucket, path).await {
                    tracing::info!(
                        bucket = %bucket.identity(),
                        archive_path = %archive_path,
                        "Failed bucket was already archived"
                    );
                    return self.retire(bucket).await;
                }
                tracing::error!(
                    bucket = %bucket.identity(),
                    archive_path = %archive_path,
                    "A different bucket is archived at this path, leaving it in place"
                );
                Attempt::Conflict
            }
            Err(e) => {
                tracing::warn!(bucket = %bucket.identity(), error = %e, "Bucket still fails to archive");
                Attempt::Failed
            }
        }
    }

    /// Whether the archived copy's size record matches the local bucket.
    async fn is_archived_copy(&self, bucket: &Bucket, path: &Path) -> bool {
        let recorded = match self.archiver.size_recorder().get_size(bucket).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(bucket = %bucket.identity(), error = %e, "Failed to read size record");
                return false;
            }
        };
        matches!(local_size(path).await, Ok(local) if local == recorded)
    }

    async fn retire(&self, bucket: &Bucket) -> Attempt {
        match self.mover.retire(bucket).await {
            Ok(()) => {
                tracing::info!(bucket = %bucket.identity(), "Recovered failed bucket");
                Attempt::Archived
            }
            Err(e) => {
                // Still intact; the next sweep finds it archived and retires it.
                tracing::error!(
                    bucket = %bucket.identity(),
                    error = %e,
                    "Bucket archived but could not be removed from the failed area"
                );
                Attempt::Failed
            }
        }
    }
}
