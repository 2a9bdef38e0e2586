//! Archives one local bucket: data first, then its size record.

use std::sync::Arc;

use coldvault_core::{ArchiveError, ArchiveResult, Bucket, PathResolver};

use crate::archive_fs::ArchiveFileSystem;
use crate::bucket_size::BucketSizeRecorder;

/// The archive step shared by the freezer and the recovery sweep.
#[derive(Clone)]
pub struct BucketArchiver {
    fs: Arc<ArchiveFileSystem>,
    resolver: PathResolver,
    sizes: BucketSizeRecorder,
}

impl BucketArchiver {
    pub fn new(fs: Arc<ArchiveFileSystem>, resolver: PathResolver) -> Self {
        let sizes = BucketSizeRecorder::new(fs.clone(), resolver.clone());
        Self { fs, resolver, sizes }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn size_recorder(&self) -> &BucketSizeRecorder {
        &self.sizes
    }

    /// Publishes a local bucket and its size record.
    ///
    /// If an earlier attempt published the data but died before writing the
    /// size record, only the size record is written.
    ///
    /// Returns the archived bucket record, carrying the recorded size.
    ///
    /// # Errors
    ///
    /// - `FileOverwrite` if the bucket and its size record are both archived
    /// - any transfer error from the archive file system; nothing is published
    ///   at the archive path in that case
    pub async fn archive(&self, bucket: &Bucket) -> ArchiveResult<Bucket> {
        let local = bucket.require_local_path()?;
        let archive_path = self.resolver.resolve_archive_path(bucket);

        if self.fs.exists(&archive_path).await? {
            if self.sizes.has_size(bucket).await? {
                return Err(ArchiveError::file_overwrite(archive_path));
            }
            tracing::info!(
                bucket = %bucket.identity(),
                archive_path = %archive_path,
                "Bucket data already archived, writing missing size record"
            );
        } else {
            self.fs.put_directory_atomically(local, &archive_path).await?;
        }

        let size_bytes = self.sizes.put_size(bucket).await?;

        tracing::info!(
            bucket = %bucket.identity(),
            archive_path = %archive_path,
            size_bytes,
            "Archived bucket"
        );
        Ok(Bucket::archived(
            bucket.index.clone(),
            bucket.archive_name(),
            bucket.format,
            archive_path,
        )
        .with_size(size_bytes))
    }
}
