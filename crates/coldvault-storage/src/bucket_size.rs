//! Bucket size records.
//!
//! The local byte size of a bucket is captured at archive time and stored next
//! to the archived data, at `{archive path}/archive_meta/bucket.size`. Thawing
//! trusts this record, not whatever size the remote store reports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coldvault_core::{ArchiveError, ArchiveResult, Bucket, PathResolver, BUCKET_SIZE_FILE_NAME};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::archive_fs::ArchiveFileSystem;
use crate::fs_util;

/// Contents of the size record file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSizeRecord {
    pub index: String,
    pub bucket: String,
    pub size_bytes: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Writes and reads bucket size records on the archive file system.
#[derive(Clone)]
pub struct BucketSizeRecorder {
    fs: Arc<ArchiveFileSystem>,
    resolver: PathResolver,
}

impl BucketSizeRecorder {
    pub fn new(fs: Arc<ArchiveFileSystem>, resolver: PathResolver) -> Self {
        Self { fs, resolver }
    }

    /// Archive path of a bucket's size record.
    pub fn size_record_path(&self, bucket: &Bucket) -> String {
        self.resolver
            .resolve_path_for_bucket_metadata(bucket, BUCKET_SIZE_FILE_NAME)
    }

    /// Measures the local bucket and publishes its size record.
    ///
    /// Returns the recorded size.
    pub async fn put_size(&self, bucket: &Bucket) -> ArchiveResult<u64> {
        let size_bytes = local_size(bucket.require_local_path()?).await?;

        let record = BucketSizeRecord {
            index: bucket.index.clone(),
            bucket: bucket.archive_name(),
            size_bytes,
            recorded_at: Utc::now(),
        };
        let staging = TempDir::new()?;
        let file = staging.path().join(BUCKET_SIZE_FILE_NAME);
        tokio::fs::write(&file, serde_json::to_vec(&record)?).await?;

        let remote = self.size_record_path(bucket);
        self.fs.put_file_atomically(&file, &remote).await?;

        tracing::debug!(bucket = %bucket.identity(), size_bytes, "Recorded bucket size");
        Ok(size_bytes)
    }

    /// Size recorded for an archived bucket.
    ///
    /// # Errors
    ///
    /// `MissingSizeRecord` if the bucket has no size record.
    pub async fn get_size(&self, bucket: &Bucket) -> ArchiveResult<u64> {
        Ok(self.get_record(bucket).await?.size_bytes)
    }

    pub async fn get_record(&self, bucket: &Bucket) -> ArchiveResult<BucketSizeRecord> {
        let remote = self.size_record_path(bucket);
        let staging = TempDir::new()?;
        let file = staging.path().join(BUCKET_SIZE_FILE_NAME);

        match self.fs.get_file(&remote, &file).await {
            Ok(()) => {}
            Err(ArchiveError::NotFound { .. }) => {
                return Err(ArchiveError::MissingSizeRecord {
                    bucket: bucket.identity(),
                })
            }
            Err(e) => return Err(e),
        }

        let data = tokio::fs::read(&file).await?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub async fn has_size(&self, bucket: &Bucket) -> ArchiveResult<bool> {
        self.fs.exists(&self.size_record_path(bucket)).await
    }
}

/// Total size of the regular files of a local bucket directory.
pub async fn local_size(path: &Path) -> ArchiveResult<u64> {
    let path: PathBuf = path.to_path_buf();
    tokio::task::spawn_blocking(move || fs_util::directory_size(&path))
        .await
        .map_err(|e| ArchiveError::internal(format!("size task failed: {e}")))?
}
