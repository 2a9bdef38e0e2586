//! Bucket freezer: the per-invocation archiving pipeline.
//!
//! ```text
//! Start ──▶ MovedToSafe ──▶ Archived ──▶ RecoverySwept ──▶ Done
//!   │            │
//!   └────────────┴──▶ Failed
//! ```
//!
//! A frozen bucket is first moved out of the indexer's reach into the safe
//! area. The archive attempt then either publishes it (and the safe copy is
//! dropped) or moves it to the failed area. A recovery sweep follows every
//! archive attempt, whatever its result.

use std::fmt;
use std::path::{Path, PathBuf};

use coldvault_core::{ArchiveError, Bucket, BucketFormat};
use serde::Serialize;

use crate::archiver::BucketArchiver;
use crate::mover::BucketMover;
use crate::recovery::{FailedBucketsArchiver, RecoveryReport};

/// Why a freeze could not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FreezeFailure {
    /// The index or bucket path is unusable.
    InvalidInput { reason: String },
    /// The bucket could not be moved to the safe area; it may still be at its
    /// original location.
    SafeMove { reason: String },
    /// The bucket is already archived. It is left in the safe area.
    Conflict { archive_path: String },
    /// Archiving failed and the bucket could not be moved to the failed area.
    /// It is left in the safe area.
    Stranded { reason: String },
}

impl fmt::Display for FreezeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput { reason } => write!(f, "invalid input: {reason}"),
            Self::SafeMove { reason } => write!(f, "could not move bucket to the safe area: {reason}"),
            Self::Conflict { archive_path } => write!(f, "bucket already archived at `{archive_path}`"),
            Self::Stranded { reason } => write!(f, "could not move bucket to the failed area: {reason}"),
        }
    }
}

/// Externally visible result of one freeze.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FreezeOutcome {
    /// Archived; the archived record carries the recorded size.
    Archived { bucket: Bucket },
    /// Archiving failed; the bucket waits in the failed area for a sweep.
    ArchiveDeferred { bucket: Bucket },
    SourceNotFound,
    SourceNotADirectory,
    Failed { failure: FreezeFailure },
}

impl FreezeOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Archived { .. } | Self::ArchiveDeferred { .. } => 0,
            Self::SourceNotADirectory => -2,
            Self::SourceNotFound => -3,
            Self::Failed { .. } => 1,
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Result of the archive step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveAttempt {
    Stored(Bucket),
    Deferred(Bucket),
    Conflict { bucket: Bucket, archive_path: String },
    Stranded { bucket: Bucket, reason: String },
}

impl ArchiveAttempt {
    fn into_outcome(self) -> FreezeOutcome {
        match self {
            Self::Stored(bucket) => FreezeOutcome::Archived { bucket },
            Self::Deferred(bucket) => FreezeOutcome::ArchiveDeferred { bucket },
            Self::Conflict { archive_path, .. } => FreezeOutcome::Failed {
                failure: FreezeFailure::Conflict { archive_path },
            },
            Self::Stranded { reason, .. } => FreezeOutcome::Failed {
                failure: FreezeFailure::Stranded { reason },
            },
        }
    }
}

/// Freeze pipeline state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreezeState {
    Start,
    MovedToSafe(Bucket),
    Archived(ArchiveAttempt),
    RecoverySwept(ArchiveAttempt),
    Done(FreezeOutcome),
}

/// Orchestrates one freeze per call.
#[derive(Clone)]
pub struct BucketFreezer {
    safe_root: PathBuf,
    mover: BucketMover,
    archiver: BucketArchiver,
    recovery: FailedBucketsArchiver,
}

impl BucketFreezer {
    pub fn new(
        safe_root: impl Into<PathBuf>,
        mover: BucketMover,
        archiver: BucketArchiver,
        recovery: FailedBucketsArchiver,
    ) -> Self {
        Self {
            safe_root: safe_root.into(),
            mover,
            archiver,
            recovery,
        }
    }

    pub fn safe_root(&self) -> &Path {
        &self.safe_root
    }

    /// Freezes the bucket directory at `path`, belonging to `index`.
    pub async fn freeze_bucket(&self, index: &str, path: impl AsRef<Path>) -> FreezeOutcome {
        let path = path.as_ref();
        let mut state = FreezeState::Start;
        loop {
            state = match state {
                FreezeState::Start => self.move_to_safe(index, path).await,
                FreezeState::MovedToSafe(bucket) => {
                    FreezeState::Archived(self.archive(bucket).await)
                }
                FreezeState::Archived(attempt) => {
                    self.sweep().await;
                    FreezeState::RecoverySwept(attempt)
                }
                FreezeState::RecoverySwept(attempt) => FreezeState::Done(attempt.into_outcome()),
                FreezeState::Done(outcome) => {
                    tracing::info!(
                        index = %index,
                        path = %path.display(),
                        exit_code = outcome.exit_code(),
                        "Freeze finished"
                    );
                    return outcome;
                }
            };
        }
    }

    async fn move_to_safe(&self, index: &str, path: &Path) -> FreezeState {
        let bucket = match Bucket::local(index, path, BucketFormat::Native) {
            Ok(bucket) => bucket,
            Err(e) => {
                tracing::error!(index = %index, path = %path.display(), error = %e, "Rejected freeze request");
                return FreezeState::Done(FreezeOutcome::Failed {
                    failure: FreezeFailure::InvalidInput {
                        reason: e.to_string(),
                    },
                });
            }
        };

        match self.mover.move_to_directory(&bucket, &self.safe_root).await {
            Ok(moved) => {
                tracing::info!(bucket = %moved.identity(), "Moved bucket to safe area");
                FreezeState::MovedToSafe(moved)
            }
            Err(ArchiveError::NotFound { .. }) => {
                tracing::warn!(bucket = %bucket.identity(), path = %path.display(), "Bucket to freeze not found");
                FreezeState::Done(FreezeOutcome::SourceNotFound)
            }
            Err(ArchiveError::NotADirectory { .. }) => {
                tracing::warn!(bucket = %bucket.identity(), path = %path.display(), "Bucket to freeze is not a directory");
                FreezeState::Done(FreezeOutcome::SourceNotADirectory)
            }
            Err(e) => {
                tracing::error!(bucket = %bucket.identity(), error = %e, "Failed to move bucket to safe area");
                FreezeState::Done(FreezeOutcome::Failed {
                    failure: FreezeFailure::SafeMove {
                        reason: e.to_string(),
                    },
                })
            }
        }
    }

    async fn archive(&self, bucket: Bucket) -> ArchiveAttempt {
        match self.archiver.archive(&bucket).await {
            Ok(archived) => {
                if let Some(safe_copy) = bucket.local_path.as_deref() {
                    if let Err(e) = tokio::fs::remove_dir_all(safe_copy).await {
                        tracing::warn!(
                            bucket = %bucket.identity(),
                            error = %e,
                            "Archived bucket could not be removed from the safe area"
                        );
                    }
                }
                ArchiveAttempt::Stored(archived)
            }
            Err(ArchiveError::FileOverwrite { path }) => {
                tracing::error!(
                    bucket = %bucket.identity(),
                    archive_path = %path,
                    "Bucket is already archived"
                );
                ArchiveAttempt::Conflict {
                    bucket,
                    archive_path: path,
                }
            }
            Err(e) => {
                tracing::warn!(bucket = %bucket.identity(), error = %e, "Archiving failed, moving bucket to failed area");
                match self.mover.move_to_failed_area(&bucket).await {
                    Ok(failed) => ArchiveAttempt::Deferred(failed),
                    Err(move_error) => {
                        tracing::error!(
                            bucket = %bucket.identity(),
                            error = %move_error,
                            "Failed to move bucket to failed area, leaving it in the safe area"
                        );
                        ArchiveAttempt::Stranded {
                            bucket,
                            reason: move_error.to_string(),
                        }
                    }
                }
            }
        }
    }

    async fn sweep(&self) -> Option<RecoveryReport> {
        match self.recovery.archive_failed_buckets().await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(error = %e, "Recovery sweep failed");
                None
            }
        }
    }
}
