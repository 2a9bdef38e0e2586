//! Local bucket moves between holding areas.

use std::path::{Path, PathBuf};

use coldvault_core::{ArchiveError, ArchiveResult, Bucket, BucketFormat};

/// Moves bucket directories with a single `rename`.
///
/// Never copies: a move that cannot be done as a rename (for example across
/// volumes) fails and leaves the source in place.
#[derive(Debug, Clone)]
pub struct BucketMover {
    fail_root: PathBuf,
}

impl BucketMover {
    /// `fail_root` is the failed-bucket holding area.
    pub fn new(fail_root: impl Into<PathBuf>) -> Self {
        Self {
            fail_root: fail_root.into(),
        }
    }

    pub fn fail_root(&self) -> &Path {
        &self.fail_root
    }

    /// Moves a bucket to `{target_root}/{index}/{name}`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the bucket directory does not exist
    /// - `NotADirectory` if the bucket path is not a directory
    /// - `FileOverwrite` if the destination already exists
    ///
    /// Nothing is created under `target_root` when the source check fails.
    pub async fn move_to_directory(&self, bucket: &Bucket, target_root: &Path) -> ArchiveResult<Bucket> {
        let source = bucket.require_local_path()?;

        let metadata = tokio::fs::metadata(source)
            .await
            .map_err(|e| ArchiveError::from_io(e, source))?;
        if !metadata.is_dir() {
            return Err(ArchiveError::not_a_directory(source.display().to_string()));
        }

        let index_dir = target_root.join(&bucket.index);
        let destination = index_dir.join(&bucket.name);
        if tokio::fs::try_exists(&destination).await.unwrap_or(false) {
            return Err(ArchiveError::file_overwrite(destination.display().to_string()));
        }

        tokio::fs::create_dir_all(&index_dir).await?;
        tokio::fs::rename(source, &destination)
            .await
            .map_err(|e| ArchiveError::from_io(e, source))?;

        tracing::debug!(
            bucket = %bucket.identity(),
            from = %source.display(),
            to = %destination.display(),
            "Moved bucket"
        );
        Ok(bucket.clone().with_local_path(destination))
    }

    /// Moves a bucket into the failed-bucket holding area.
    pub async fn move_to_failed_area(&self, bucket: &Bucket) -> ArchiveResult<Bucket> {
        self.move_to_directory(bucket, &self.fail_root).await
    }

    /// Buckets currently in the failed area, sorted by index then name.
    ///
    /// A missing failed area holds no buckets. Stray files and entries that
    /// cannot be a bucket are skipped with a warning, so one bad entry never
    /// blocks recovery of the others.
    pub async fn failed_buckets(&self) -> ArchiveResult<Vec<Bucket>> {
        list_buckets(&self.fail_root).await
    }

    /// Directory that holds buckets on their way out of the failed area.
    pub fn retired_root(&self) -> PathBuf {
        self.fail_root.join(RETIRED_DIR_NAME)
    }

    /// Takes an archived bucket out of the failed area and deletes it.
    ///
    /// The bucket is first renamed into the retired directory, so a deletion
    /// that dies halfway never leaves a partial bucket among the failed ones.
    /// A leftover from an earlier retirement of the same bucket is removed
    /// first. Deletion failures are logged and left for [`Self::purge_retired`].
    ///
    /// # Errors
    ///
    /// Fails only if the bucket could not be renamed; it is then untouched.
    pub async fn retire(&self, bucket: &Bucket) -> ArchiveResult<()> {
        let source = bucket.require_local_path()?;
        let retired = self.retired_root().join(&bucket.index).join(&bucket.name);

        remove_dir_if_present(&retired).await?;
        if let Some(parent) = retired.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(source, &retired)
            .await
            .map_err(|e| ArchiveError::from_io(e, source))?;

        if let Err(e) = remove_dir_if_present(&retired).await {
            tracing::warn!(
                bucket = %bucket.identity(),
                path = %retired.display(),
                error = %e,
                "Failed to delete retired bucket, next sweep retries"
            );
        }
        Ok(())
    }

    /// Retired buckets whose deletion did not finish.
    pub async fn retired_buckets(&self) -> ArchiveResult<Vec<Bucket>> {
        list_buckets(&self.retired_root()).await
    }

    /// Deletes one leftover from the retired directory.
    pub async fn purge_retired(&self, bucket: &Bucket) -> ArchiveResult<()> {
        let retired = self.retired_root().join(&bucket.index).join(&bucket.name);
        remove_dir_if_present(&retired).await
    }
}

/// Name of the retired directory inside the failed area.
pub const RETIRED_DIR_NAME: &str = ".coldvault-retired";

/// `{root}/{index}/{bucket}` directories, sorted by index then name.
async fn list_buckets(root: &Path) -> ArchiveResult<Vec<Bucket>> {
    let mut buckets = Vec::new();
    for index_dir in subdirectories(root).await? {
        let index = match index_dir.file_name().and_then(|n| n.to_str()) {
            Some(RETIRED_DIR_NAME) => continue,
            Some(index) => index.to_string(),
            None => {
                tracing::warn!(path = %index_dir.display(), "Skipping index directory with a non UTF-8 name");
                continue;
            }
        };
        for bucket_dir in subdirectories(&index_dir).await? {
            match Bucket::local(index.as_str(), &bucket_dir, BucketFormat::Native) {
                Ok(bucket) => buckets.push(bucket),
                Err(e) => {
                    tracing::warn!(path = %bucket_dir.display(), error = %e, "Skipping entry that is not a bucket");
                }
            }
        }
    }
    buckets.sort_by(|a, b| (&a.index, &a.name).cmp(&(&b.index, &b.name)));
    Ok(buckets)
}

async fn remove_dir_if_present(path: &Path) -> ArchiveResult<()> {
    match tokio::fs::remove_dir_all(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(ArchiveError::from_io(e, path)),
        _ => Ok(()),
    }
}

async fn subdirectories(dir: &Path) -> ArchiveResult<Vec<PathBuf>> {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_bucket(root: &Path, name: &str) -> Bucket {
        let path = root.join(name);
        std::fs::create_dir_all(path.join("rawdata")).unwrap();
        std::fs::write(path.join("rawdata/journal.gz"), b"journal").unwrap();
        Bucket::local("main", path, BucketFormat::Native).unwrap()
    }

    #[tokio::test]
    async fn test_move_to_directory() {
        let dir = TempDir::new().unwrap();
        let bucket = make_bucket(&dir.path().join("db"), "db_200_100_1");
        let mover = BucketMover::new(dir.path().join("failed"));

        let moved = mover
            .move_to_directory(&bucket, &dir.path().join("safe"))
            .await
            .unwrap();

        let expected = dir.path().join("safe/main/db_200_100_1");
        assert_eq!(moved.local_path.as_deref(), Some(expected.as_path()));
        assert_eq!(moved.name, bucket.name);
        assert!(expected.join("rawdata/journal.gz").is_file());
        assert!(!dir.path().join("db/db_200_100_1").exists());
    }

    #[tokio::test]
    async fn test_move_missing_source_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let bucket =
            Bucket::local("main", dir.path().join("nope/db_1_0_1"), BucketFormat::Native).unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));

        let result = mover.move_to_directory(&bucket, &dir.path().join("safe")).await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
        assert!(!dir.path().join("safe").exists());
    }

    #[tokio::test]
    async fn test_move_file_is_not_a_directory() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("db_1_0_1");
        std::fs::write(&file, b"x").unwrap();
        let bucket = Bucket::local("main", &file, BucketFormat::Native).unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));

        let result = mover.move_to_directory(&bucket, &dir.path().join("safe")).await;
        assert!(matches!(result, Err(ArchiveError::NotADirectory { .. })));
        assert!(file.is_file());
    }

    #[tokio::test]
    async fn test_move_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let bucket = make_bucket(&dir.path().join("db"), "db_200_100_1");
        std::fs::create_dir_all(dir.path().join("safe/main/db_200_100_1")).unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));

        let result = mover.move_to_directory(&bucket, &dir.path().join("safe")).await;
        assert!(matches!(result, Err(ArchiveError::FileOverwrite { .. })));
        assert!(dir.path().join("db/db_200_100_1").is_dir());
    }

    #[tokio::test]
    async fn test_failed_buckets_listing() {
        let dir = TempDir::new().unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));
        assert!(mover.failed_buckets().await.unwrap().is_empty());

        for name in ["db_4_3_2", "db_2_1_1"] {
            let bucket = make_bucket(&dir.path().join("db"), name);
            mover.move_to_failed_area(&bucket).await.unwrap();
        }
        std::fs::write(dir.path().join("failed/main/stray.txt"), b"x").unwrap();

        let failed = mover.failed_buckets().await.unwrap();
        let names: Vec<&str> = failed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["db_2_1_1", "db_4_3_2"]);
        assert!(failed.iter().all(|b| b.index == "main"));
        assert_eq!(
            failed[0].local_path.as_deref(),
            Some(dir.path().join("failed/main/db_2_1_1").as_path())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unrepresentable_entry_does_not_hide_other_buckets() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));
        let bucket = make_bucket(&dir.path().join("db"), "db_2_1_1");
        mover.move_to_failed_area(&bucket).await.unwrap();
        std::fs::create_dir_all(
            dir.path()
                .join("failed/main")
                .join(OsStr::from_bytes(b"db_\xff_1_1")),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("failed").join(OsStr::from_bytes(b"ma\xffin/db_4_3_2")))
            .unwrap();

        let failed = mover.failed_buckets().await.unwrap();
        let names: Vec<&str> = failed.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["db_2_1_1"]);
    }

    #[tokio::test]
    async fn test_retire_removes_bucket_from_failed_area() {
        let dir = TempDir::new().unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));
        let bucket = make_bucket(&dir.path().join("db"), "db_2_1_1");
        let failed = mover.move_to_failed_area(&bucket).await.unwrap();

        mover.retire(&failed).await.unwrap();

        assert!(!dir.path().join("failed/main/db_2_1_1").exists());
        assert!(!mover.retired_root().join("main/db_2_1_1").exists());
        assert!(mover.failed_buckets().await.unwrap().is_empty());
        assert!(mover.retired_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retired_leftovers_are_not_failed_buckets() {
        let dir = TempDir::new().unwrap();
        let mover = BucketMover::new(dir.path().join("failed"));
        // A deletion that died halfway.
        let leftover = mover.retired_root().join("main/db_2_1_1/rawdata");
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join("partial"), b"x").unwrap();

        assert!(mover.failed_buckets().await.unwrap().is_empty());
        let retired = mover.retired_buckets().await.unwrap();
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].identity(), "main/db_2_1_1");

        mover.purge_retired(&retired[0]).await.unwrap();
        assert!(mover.retired_buckets().await.unwrap().is_empty());
        // Purging twice is harmless.
        mover.purge_retired(&retired[0]).await.unwrap();
    }
}
