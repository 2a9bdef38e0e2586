//! Thawing: bringing archived buckets back to local disk for a time range.
//!
//! A bucket is transferred into a staging directory of its own under the thaw
//! location, stripped of its archive metadata, and renamed into
//! `{thaw_location}/{index}/{bucket}` in one step. A half transferred bucket
//! is never visible at its final location, and concurrent thaws of the same
//! bucket never share a staging directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use coldvault_core::{validate_index_name, ArchiveError, ArchiveResult, Bucket, METADATA_DIR_NAME};
use parking_lot::Mutex;
use serde::Serialize;
use tempfile::TempDir;

use crate::archive_fs::ArchiveFileSystem;
use crate::bucket_size::BucketSizeRecorder;
use crate::lister::ArchiveBucketLister;

/// Staging directory for transfers in progress, below the thaw location.
pub const THAW_TRANSFERS_DIR_NAME: &str = ".coldvault-thaw-transfers";

/// A bucket that matched the range but could not be thawed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedThaw {
    pub bucket: Bucket,
    pub error: String,
}

/// Result of one thaw call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThawReport {
    /// Thawed buckets, with their local path and recorded size.
    pub thawed: Vec<Bucket>,
    pub failed: Vec<FailedThaw>,
}

/// Restores archived buckets whose time range intersects a requested range.
pub struct BucketThawer {
    fs: Arc<ArchiveFileSystem>,
    lister: ArchiveBucketLister,
    sizes: BucketSizeRecorder,
    thaw_root: PathBuf,
    last: Mutex<ThawReport>,
}

impl BucketThawer {
    pub fn new(
        fs: Arc<ArchiveFileSystem>,
        lister: ArchiveBucketLister,
        sizes: BucketSizeRecorder,
        thaw_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fs,
            lister,
            sizes,
            thaw_root: thaw_root.into(),
            last: Mutex::new(ThawReport::default()),
        }
    }

    pub fn thaw_root(&self) -> &Path {
        &self.thaw_root
    }

    /// Thaws every archived bucket of `index` intersecting `[earliest, latest]`.
    ///
    /// One bucket failing does not stop the others; failures are collected in
    /// the report. Buckets whose names carry no time range are skipped.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if `earliest` is after `latest` or `index` is not a
    ///   valid index name
    /// - listing errors from the archive file system
    pub async fn thaw_buckets(
        &self,
        index: &str,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> ArchiveResult<ThawReport> {
        validate_index_name(index)?;
        if earliest > latest {
            return Err(ArchiveError::ValidationError(format!(
                "thaw range start {earliest} is after its end {latest}"
            )));
        }

        let mut report = ThawReport::default();
        for bucket in self.lister.list_buckets_in_index(index).await? {
            match bucket.intersects(earliest, latest) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    tracing::warn!(bucket = %bucket.identity(), "Bucket name has no time range, not thawing");
                    continue;
                }
            }

            match self.thaw_bucket(&bucket).await {
                Ok(thawed) => {
                    tracing::info!(
                        bucket = %thawed.identity(),
                        size_bytes = thawed.size_bytes.unwrap_or_default(),
                        "Thawed bucket"
                    );
                    report.thawed.push(thawed);
                }
                Err(e) => {
                    tracing::warn!(bucket = %bucket.identity(), error = %e, "Failed to thaw bucket");
                    report.failed.push(FailedThaw {
                        bucket,
                        error: e.to_string(),
                    });
                }
            }
        }

        *self.last.lock() = report.clone();
        Ok(report)
    }

    /// Buckets thawed by the most recent call.
    pub fn thawed_buckets(&self) -> Vec<Bucket> {
        self.last.lock().thawed.clone()
    }

    /// Buckets that failed in the most recent call.
    pub fn failed_thaws(&self) -> Vec<FailedThaw> {
        self.last.lock().failed.clone()
    }

    /// Local directory a bucket is thawed into.
    pub fn thaw_path(&self, bucket: &Bucket) -> PathBuf {
        self.thaw_root.join(&bucket.index).join(&bucket.name)
    }

    /// Fresh staging directory for one transfer of `bucket`.
    fn staging_dir(&self, bucket: &Bucket) -> ArchiveResult<TempDir> {
        let parent = self.thaw_root.join(THAW_TRANSFERS_DIR_NAME).join(&bucket.index);
        std::fs::create_dir_all(&parent).map_err(|e| ArchiveError::from_io(e, &parent))?;
        tempfile::Builder::new()
            .prefix(&format!("{}.", bucket.name))
            .tempdir_in(&parent)
            .map_err(|e| ArchiveError::from_io(e, &parent))
    }

    async fn thaw_bucket(&self, bucket: &Bucket) -> ArchiveResult<Bucket> {
        let destination = self.thaw_path(bucket);
        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(ArchiveError::file_overwrite(destination.display().to_string()));
        }

        let size_bytes = self.sizes.get_size(bucket).await?;
        let archive_path = bucket
            .archive_path
            .clone()
            .ok_or_else(|| ArchiveError::internal(format!("`{}` has no archive path", bucket.identity())))?;

        let staging = self.staging_dir(bucket)?;
        let staged = staging.path().join(&bucket.name);
        let result = self.stage_and_publish(&archive_path, &staged, &destination).await;
        discard_staging(staging).await;
        result?;

        Ok(bucket
            .clone()
            .with_local_path(destination)
            .with_size(size_bytes))
    }

    async fn stage_and_publish(
        &self,
        archive_path: &str,
        staging: &Path,
        destination: &Path,
    ) -> ArchiveResult<()> {
        self.fs.get_directory(archive_path, staging).await?;
        remove_dir_if_present(&staging.join(METADATA_DIR_NAME)).await?;

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        match tokio::fs::rename(staging, destination).await {
            Ok(()) => Ok(()),
            // Another thaw of the same bucket published first.
            Err(_) if tokio::fs::try_exists(destination).await.unwrap_or(false) => Err(
                ArchiveError::file_overwrite(destination.display().to_string()),
            ),
            Err(e) => Err(ArchiveError::from_io(e, staging)),
        }
    }
}

async fn discard_staging(staging: TempDir) {
    let path = staging.path().to_path_buf();
    let removed = tokio::task::spawn_blocking(move || staging.close())
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|closed| closed);
    if let Err(e) = removed {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove thaw staging directory");
    }
}

async fn remove_dir_if_present(path: &Path) -> ArchiveResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive_fs::{ArchiveBackend, MockArchiveBackend};
    use crate::archiver::BucketArchiver;
    use coldvault_core::{ArchiveConfiguration, BucketFormat, PathResolver};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        backend: Arc<MockArchiveBackend>,
        archiver: BucketArchiver,
        thawer: BucketThawer,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(ArchiveConfiguration::new(
            "cluster",
            "server",
            "/archive",
            "/archive_tmp",
        ));
        let backend = Arc::new(MockArchiveBackend::new());
        let fs = Arc::new(ArchiveFileSystem::new(backend.clone(), resolver.clone()));
        let archiver = BucketArchiver::new(fs.clone(), resolver.clone());
        let lister = ArchiveBucketLister::new(
            fs.clone(),
            resolver.clone(),
            vec![BucketFormat::Native, BucketFormat::Csv],
        );
        let thawer = BucketThawer::new(
            fs.clone(),
            lister,
            BucketSizeRecorder::new(fs, resolver),
            dir.path().join("thawed"),
        );
        Fixture {
            dir,
            backend,
            archiver,
            thawer,
        }
    }

    fn staging_entries(f: &Fixture) -> usize {
        let staging = f.dir.path().join("thawed").join(THAW_TRANSFERS_DIR_NAME).join("main");
        std::fs::read_dir(staging).map(|d| d.count()).unwrap_or(0)
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    async fn archive(f: &Fixture, name: &str, bytes: usize) {
        let path = f.dir.path().join("local").join(name);
        std::fs::create_dir_all(path.join("rawdata")).unwrap();
        std::fs::write(path.join("rawdata/journal.gz"), vec![9u8; bytes]).unwrap();
        let bucket = Bucket::local("main", path, BucketFormat::Native).unwrap();
        f.archiver.archive(&bucket).await.unwrap();
    }

    #[tokio::test]
    async fn test_thaw_matching_range() {
        let f = fixture();
        archive(&f, "db_200_100_1", 50).await;
        archive(&f, "db_400_300_2", 70).await;

        let report = f.thawer.thaw_buckets("main", ts(150), ts(250)).await.unwrap();

        assert_eq!(report.thawed.len(), 1);
        assert!(report.failed.is_empty());
        let thawed = &report.thawed[0];
        assert_eq!(thawed.name, "db_200_100_1");
        assert_eq!(thawed.size_bytes, Some(50));

        let local = f.dir.path().join("thawed/main/db_200_100_1");
        assert_eq!(thawed.local_path.as_deref(), Some(local.as_path()));
        assert_eq!(std::fs::read(local.join("rawdata/journal.gz")).unwrap(), vec![9u8; 50]);
        assert!(!local.join(METADATA_DIR_NAME).exists());
        assert_eq!(staging_entries(&f), 0);

        assert_eq!(f.thawer.thawed_buckets(), report.thawed);
    }

    #[tokio::test]
    async fn test_missing_size_record_fails_only_that_bucket() {
        let f = fixture();
        archive(&f, "db_200_100_1", 50).await;
        archive(&f, "db_300_250_2", 10).await;
        f.backend
            .delete_path("/archive/cluster/server/main/db_300_250_2/NATIVE_BUCKET/archive_meta")
            .await
            .unwrap();

        let report = f.thawer.thaw_buckets("main", ts(0), ts(1000)).await.unwrap();

        assert_eq!(report.thawed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].bucket.name, "db_300_250_2");
        assert!(report.failed[0].error.contains("size record"));
        assert!(!f.dir.path().join("thawed/main/db_300_250_2").exists());
        assert_eq!(f.thawer.failed_thaws(), report.failed);
    }

    #[tokio::test]
    async fn test_existing_thawed_bucket_is_not_overwritten() {
        let f = fixture();
        archive(&f, "db_200_100_1", 50).await;
        let existing = f.dir.path().join("thawed/main/db_200_100_1");
        std::fs::create_dir_all(&existing).unwrap();
        std::fs::write(existing.join("marker"), b"keep").unwrap();

        let report = f.thawer.thaw_buckets("main", ts(100), ts(200)).await.unwrap();

        assert!(report.thawed.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(std::fs::read(existing.join("marker")).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_unparseable_names_and_bad_range() {
        let f = fixture();
        archive(&f, "hot_v1_bucket", 5).await;

        let report = f.thawer.thaw_buckets("main", ts(0), ts(i32::MAX as i64)).await.unwrap();
        assert!(report.thawed.is_empty());
        assert!(report.failed.is_empty());

        let result = f.thawer.thaw_buckets("main", ts(10), ts(5)).await;
        assert!(matches!(result, Err(ArchiveError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_latest_call_replaces_results() {
        let f = fixture();
        archive(&f, "db_200_100_1", 50).await;

        f.thawer.thaw_buckets("main", ts(100), ts(200)).await.unwrap();
        assert_eq!(f.thawer.thawed_buckets().len(), 1);

        f.thawer.thaw_buckets("main", ts(500), ts(600)).await.unwrap();
        assert!(f.thawer.thawed_buckets().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_thaws_of_one_bucket_do_not_mix() {
        let f = fixture();
        archive(&f, "db_200_100_1", 500).await;

        let (a, b) = tokio::join!(
            f.thawer.thaw_buckets("main", ts(100), ts(200)),
            f.thawer.thaw_buckets("main", ts(100), ts(200)),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.thawed.len() + b.thawed.len(), 1, "{a:?} {b:?}");
        assert_eq!(a.failed.len() + b.failed.len(), 1);
        let local = f.dir.path().join("thawed/main/db_200_100_1");
        assert_eq!(std::fs::read(local.join("rawdata/journal.gz")).unwrap(), vec![9u8; 500]);
        assert_eq!(staging_entries(&f), 0);
    }

    #[tokio::test]
    async fn test_invalid_index_is_rejected() {
        let f = fixture();
        let result = f.thawer.thaw_buckets("../main", ts(0), ts(10)).await;
        assert!(matches!(result, Err(ArchiveError::ValidationError(_))));
        assert!(!f.dir.path().join("thawed").exists());
    }
}
