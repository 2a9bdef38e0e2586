//! Archiving pipeline for frozen buckets.
//!
//! A frozen bucket is moved to a safe area, published to the archive file
//! system, and its size recorded next to it. Buckets whose archive attempt
//! fails wait in a failed area until a recovery sweep archives them. Archived
//! buckets can be thawed back to local disk by time range.

pub mod archive_fs;
pub mod archiver;
pub mod bucket_size;
pub mod freezer;
pub mod lister;
pub mod lock;
pub mod locker;
pub mod mover;
pub mod pipeline;
pub mod recovery;
pub mod thaw;

mod fs_util;

pub use archive_fs::{
    ArchiveBackend, ArchiveFileSystem, LocalArchiveBackend, MockArchiveBackend, MockArchiveConfig,
    MockFailure, MockOperation,
};
pub use archiver::BucketArchiver;
pub use bucket_size::{BucketSizeRecord, BucketSizeRecorder};
pub use freezer::{ArchiveAttempt, BucketFreezer, FreezeFailure, FreezeOutcome, FreezeState};
pub use lister::ArchiveBucketLister;
pub use lock::SimpleFileLock;
pub use locker::{BucketLock, BucketLocker};
pub use mover::BucketMover;
pub use pipeline::Pipeline;
pub use recovery::{FailedBucketsArchiver, RecoveryReport};
pub use thaw::{BucketThawer, FailedThaw, ThawReport, THAW_TRANSFERS_DIR_NAME};
