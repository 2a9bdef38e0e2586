//! Local filesystem implementation of ArchiveBackend
//!
//! Archive paths are mapped below a base directory, so `/archive/cluster/...`
//! lives at `{base_dir}/archive/cluster/...`. Used for single-host deployments,
//! NFS-mounted archives and tests.

use super::ArchiveBackend;
use crate::fs_util;
use async_trait::async_trait;
use coldvault_core::{ArchiveError, ArchiveResult};
use std::path::{Component, Path, PathBuf};

/// Local filesystem archive backend
///
/// `rename` publishes with a single filesystem call, so atomic publication
/// holds as long as the temp root and the archive root live under the same
/// base directory. It never replaces an existing target: files are published
/// with `link(2)`, which fails if the target exists, and a directory rename
/// fails on a non-empty target. Only an empty target directory can still be
/// replaced; callers hold the bucket lock around publication.
///
/// # Example
///
/// ```rust,no_run
/// use coldvault_storage::archive_fs::{ArchiveBackend, LocalArchiveBackend};
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() -> coldvault_core::ArchiveResult<()> {
///     let backend = LocalArchiveBackend::new("./archive-data").await?;
///
///     backend.put_directory(Path::new("/var/buckets/db_2_1_1"), "/tmp/main/db_2_1_1").await?;
///     backend.rename("/tmp/main/db_2_1_1", "/archive/main/db_2_1_1").await?;
///
///     let buckets = backend.list_paths("/archive/main").await?;
///     println!("Found {} buckets", buckets.len());
///
///     Ok(())
/// }
/// ```
pub struct LocalArchiveBackend {
    base_dir: PathBuf,
}

impl LocalArchiveBackend {
    /// Create a new local archive backend
    ///
    /// Creates the base directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns `ArchiveError::IoError` if directory creation fails
    pub async fn new(base_dir: impl AsRef<Path>) -> ArchiveResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Convert an archive path to a filesystem path below the base directory
    fn full_path(&self, path: &str) -> ArchiveResult<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ArchiveError::ValidationError(format!(
                "archive path `{path}` escapes the archive root"
            )));
        }
        Ok(self.base_dir.join(relative))
    }

    /// Archive path for a filesystem path below the base directory
    fn to_archive_path(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_dir).ok()?;
        let segments: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(format!("/{}", segments.join("/")))
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn copy_tree(src: PathBuf, dst: PathBuf) -> ArchiveResult<()> {
    tokio::task::spawn_blocking(move || fs_util::copy_directory(&src, &dst))
        .await
        .map_err(|e| ArchiveError::internal(format!("copy task failed: {e}")))?
}

#[async_trait]
impl ArchiveBackend for LocalArchiveBackend {
    async fn exists(&self, path: &str) -> ArchiveResult<bool> {
        Ok(path_exists(&self.full_path(path)?).await)
    }

    async fn list_paths(&self, path: &str) -> ArchiveResult<Vec<String>> {
        let dir = self.full_path(path)?;

        if !path_exists(&dir).await {
            return Ok(Vec::new());
        }

        let metadata = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| ArchiveError::from_io(e, &dir))?;
        if metadata.is_file() {
            return Ok(self.to_archive_path(&dir).into_iter().collect());
        }

        let mut results = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            if let Some(child) = self.to_archive_path(&entry.path()) {
                results.push(child);
            }
        }
        results.sort();
        Ok(results)
    }

    async fn put_file(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        let target = self.full_path(remote)?;

        // Create parent directories
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::copy(local, &target)
            .await
            .map_err(|e| ArchiveError::from_io(e, local))?;
        Ok(())
    }

    async fn put_directory(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        let target = self.full_path(remote)?;
        copy_tree(local.to_path_buf(), target).await
    }

    async fn rename(&self, from: &str, to: &str) -> ArchiveResult<()> {
        let source = self.full_path(from)?;
        let target = self.full_path(to)?;

        if path_exists(&target).await {
            return Err(ArchiveError::file_overwrite(to));
        }
        if !path_exists(&source).await {
            return Err(ArchiveError::not_found(from));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        publish_no_replace(&source, &target, to).await
    }

    async fn get_file(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        let source = self.full_path(remote)?;

        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::copy(&source, local).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ArchiveError::not_found(remote)
            } else {
                ArchiveError::from(e)
            }
        })?;
        Ok(())
    }

    async fn get_directory(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        let source = self.full_path(remote)?;

        match tokio::fs::metadata(&source).await {
            Ok(metadata) if metadata.is_dir() => {}
            Ok(_) => return Err(ArchiveError::not_a_directory(remote)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArchiveError::not_found(remote))
            }
            Err(e) => return Err(e.into()),
        }

        copy_tree(source, local.to_path_buf()).await
    }

    async fn delete_path(&self, path: &str) -> ArchiveResult<()> {
        let target = self.full_path(path)?;

        // Idempotent - no error if nothing is there
        let metadata = match tokio::fs::symlink_metadata(&target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let removed = if metadata.is_dir() {
            tokio::fs::remove_dir_all(&target).await
        } else {
            tokio::fs::remove_file(&target).await
        };
        match removed {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

/// Moves `source` to `target` unless something already exists at `target`.
async fn publish_no_replace(source: &Path, target: &Path, to: &str) -> ArchiveResult<()> {
    let metadata = tokio::fs::symlink_metadata(source)
        .await
        .map_err(|e| ArchiveError::from_io(e, source))?;

    if metadata.is_dir() {
        return match tokio::fs::rename(source, target).await {
            Ok(()) => Ok(()),
            Err(_) if path_exists(target).await => Err(ArchiveError::file_overwrite(to)),
            Err(e) => Err(ArchiveError::from_io(e, source)),
        };
    }

    match tokio::fs::hard_link(source, target).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ArchiveError::file_overwrite(to))
        }
        Err(e) => return Err(ArchiveError::from_io(e, source)),
    }
    tokio::fs::remove_file(source)
        .await
        .map_err(|e| ArchiveError::from_io(e, source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn local_tree(dir: &TempDir) -> PathBuf {
        let bucket = dir.path().join("db_2_1_1");
        std::fs::create_dir_all(bucket.join("rawdata")).unwrap();
        std::fs::write(bucket.join("rawdata/journal.gz"), b"journal").unwrap();
        std::fs::write(bucket.join("Hosts.data"), b"hosts").unwrap();
        bucket
    }

    #[tokio::test]
    async fn test_local_put_list_get() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let backend = LocalArchiveBackend::new(base.path()).await.unwrap();
        let bucket = local_tree(&src);

        backend
            .put_directory(&bucket, "/archive/main/db_2_1_1")
            .await
            .unwrap();
        assert!(base.path().join("archive/main/db_2_1_1/rawdata/journal.gz").is_file());
        assert!(backend.exists("/archive/main/db_2_1_1").await.unwrap());

        assert_eq!(
            backend.list_paths("/archive/main/").await.unwrap(),
            vec!["/archive/main/db_2_1_1".to_string()]
        );
        assert!(backend.list_paths("/archive/other").await.unwrap().is_empty());
        assert_eq!(
            backend
                .list_paths("/archive/main/db_2_1_1/Hosts.data")
                .await
                .unwrap(),
            vec!["/archive/main/db_2_1_1/Hosts.data".to_string()]
        );

        let out = src.path().join("restored");
        backend
            .get_directory("/archive/main/db_2_1_1", &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(out.join("rawdata/journal.gz")).unwrap(), b"journal");

        let file = src.path().join("hosts-copy");
        backend
            .get_file("/archive/main/db_2_1_1/Hosts.data", &file)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&file).unwrap(), b"hosts");
    }

    #[tokio::test]
    async fn test_local_missing_paths() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let backend = LocalArchiveBackend::new(base.path()).await.unwrap();

        let result = backend.get_file("/nope", &src.path().join("x")).await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));

        let result = backend.get_directory("/nope", &src.path().join("y")).await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));

        let result = backend.rename("/nope", "/elsewhere").await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_local_rename_refuses_overwrite() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let backend = LocalArchiveBackend::new(base.path()).await.unwrap();
        let bucket = local_tree(&src);

        backend.put_directory(&bucket, "/tmp/a").await.unwrap();
        backend.put_directory(&bucket, "/tmp/b").await.unwrap();
        backend.rename("/tmp/a", "/final/a").await.unwrap();
        assert!(!backend.exists("/tmp/a").await.unwrap());

        let result = backend.rename("/tmp/b", "/final/a").await;
        assert!(matches!(result, Err(ArchiveError::FileOverwrite { .. })));
        assert!(backend.exists("/tmp/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_keeps_target_created_after_check() {
        let dir = TempDir::new().unwrap();
        let staged = dir.path().join("staged.size");
        let target = dir.path().join("bucket.size");
        std::fs::write(&staged, b"mine").unwrap();
        // Written by another publisher between the existence check and the move.
        std::fs::write(&target, b"theirs").unwrap();

        let result = publish_no_replace(&staged, &target, "/final/bucket.size").await;
        assert!(matches!(result, Err(ArchiveError::FileOverwrite { .. })));
        assert_eq!(std::fs::read(&target).unwrap(), b"theirs");
        assert!(staged.exists());

        let staged_dir = local_tree(&dir);
        let target_dir = dir.path().join("published");
        std::fs::create_dir_all(target_dir.join("rawdata")).unwrap();
        std::fs::write(target_dir.join("rawdata/journal.gz"), b"theirs").unwrap();

        let result = publish_no_replace(&staged_dir, &target_dir, "/final/db_2_1_1").await;
        assert!(matches!(result, Err(ArchiveError::FileOverwrite { .. })));
        assert_eq!(std::fs::read(target_dir.join("rawdata/journal.gz")).unwrap(), b"theirs");
        assert!(staged_dir.is_dir());
    }

    #[tokio::test]
    async fn test_local_delete_is_idempotent() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let backend = LocalArchiveBackend::new(base.path()).await.unwrap();
        let bucket = local_tree(&src);

        backend.put_directory(&bucket, "/archive/x").await.unwrap();
        backend.delete_path("/archive/x").await.unwrap();
        assert!(!backend.exists("/archive/x").await.unwrap());
        backend.delete_path("/archive/x").await.unwrap();

        backend
            .put_file(&bucket.join("Hosts.data"), "/archive/file")
            .await
            .unwrap();
        backend.delete_path("/archive/file").await.unwrap();
        assert!(!backend.exists("/archive/file").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_rejects_parent_components() {
        let base = TempDir::new().unwrap();
        let backend = LocalArchiveBackend::new(base.path()).await.unwrap();

        let result = backend.exists("/archive/../../etc").await;
        assert!(matches!(result, Err(ArchiveError::ValidationError(_))));
    }

    #[tokio::test]
    async fn test_local_publish_is_all_or_nothing_for_readers() {
        let src = TempDir::new().unwrap();
        let base = TempDir::new().unwrap();
        let backend = std::sync::Arc::new(LocalArchiveBackend::new(base.path()).await.unwrap());
        let bucket = src.path().join("big");
        std::fs::create_dir_all(&bucket).unwrap();
        for i in 0..50 {
            std::fs::write(bucket.join(format!("file_{i:02}")), vec![0u8; 256]).unwrap();
        }

        let reader = {
            let backend = backend.clone();
            tokio::spawn(async move {
                loop {
                    let listed = backend.list_paths("/archive/big").await.unwrap();
                    if !listed.is_empty() {
                        return listed.len();
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        backend.put_directory(&bucket, "/tmp/archive/big").await.unwrap();
        backend.rename("/tmp/archive/big", "/archive/big").await.unwrap();

        assert_eq!(reader.await.unwrap(), 50);
    }
}
