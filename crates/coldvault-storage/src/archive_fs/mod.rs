//! Archive file system abstraction
//!
//! Two layers:
//! - [`ArchiveBackend`]: transport to a concrete store (local directory tree,
//!   in-memory mock). Knows nothing about atomicity beyond a single `rename`.
//! - [`ArchiveFileSystem`]: the backend-agnostic front end the pipeline talks to.
//!   Puts are published in two phases: stage under the temp path resolved by the
//!   [`PathResolver`], then one `rename` onto the final path. A reader of the final
//!   path sees either nothing or the complete transfer.

mod local;
mod mock;

pub use local::LocalArchiveBackend;
pub use mock::{CallHistoryEntry, MockArchiveBackend, MockArchiveConfig, MockFailure, MockOperation};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use coldvault_core::{ArchiveError, ArchiveResult, PathResolver};

/// Transport-level operations on an archive store.
///
/// Paths are `/`-separated and absolute within the store. All implementations
/// must be thread-safe.
///
/// # Error Handling
///
/// - `ArchiveError::NotFound` - source path does not exist
/// - `ArchiveError::FileOverwrite` - `rename` destination already exists
/// - `ArchiveError::Transport` - backend unavailable or rejected the request
/// - `ArchiveError::IoError` - local I/O error
#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> ArchiveResult<bool>;

    /// Immediate children of a directory, as full paths, sorted.
    ///
    /// A missing path lists as empty; a file lists as itself.
    async fn list_paths(&self, path: &str) -> ArchiveResult<Vec<String>>;

    /// Copies a local file to `remote`, creating parents. Overwrites.
    async fn put_file(&self, local: &Path, remote: &str) -> ArchiveResult<()>;

    /// Copies a local directory tree to `remote`, creating parents. Not atomic.
    async fn put_directory(&self, local: &Path, remote: &str) -> ArchiveResult<()>;

    /// Atomically moves `from` to `to`, creating the parents of `to`.
    ///
    /// Fails with `FileOverwrite` if `to` exists and `NotFound` if `from` does not.
    async fn rename(&self, from: &str, to: &str) -> ArchiveResult<()>;

    /// Copies a remote file to the local path `local`, creating parents.
    async fn get_file(&self, remote: &str, local: &Path) -> ArchiveResult<()>;

    /// Copies a remote directory tree into the local directory `local`.
    async fn get_directory(&self, remote: &str, local: &Path) -> ArchiveResult<()>;

    /// Deletes a file or directory tree. Idempotent.
    async fn delete_path(&self, path: &str) -> ArchiveResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferKind {
    File,
    Directory,
}

/// Archive file system used by the pipeline.
pub struct ArchiveFileSystem {
    backend: Arc<dyn ArchiveBackend>,
    resolver: PathResolver,
}

impl ArchiveFileSystem {
    /// Wraps a backend. Temp paths are resolved with `resolver`.
    pub fn new(backend: Arc<dyn ArchiveBackend>, resolver: PathResolver) -> Self {
        Self { backend, resolver }
    }

    pub fn backend(&self) -> &Arc<dyn ArchiveBackend> {
        &self.backend
    }

    pub async fn exists(&self, path: &str) -> ArchiveResult<bool> {
        self.backend.exists(path).await
    }

    pub async fn list_paths(&self, path: &str) -> ArchiveResult<Vec<String>> {
        self.backend.list_paths(path).await
    }

    /// Puts a single file so that `remote` is never observed half written.
    ///
    /// # Errors
    ///
    /// - `FileOverwrite` if `remote` already exists
    /// - `NotFound` if `local` is missing
    /// - `Transport` / `IoError` if staging or publishing fails; the temp
    ///   artifact is removed and `remote` stays absent
    pub async fn put_file_atomically(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        self.put_atomically(local, remote, TransferKind::File).await
    }

    /// Puts a directory tree so that `remote` is either absent or complete.
    ///
    /// Same error contract as [`ArchiveFileSystem::put_file_atomically`], plus
    /// `NotADirectory` when `local` is not a directory.
    pub async fn put_directory_atomically(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        self.put_atomically(local, remote, TransferKind::Directory)
            .await
    }

    pub async fn get_file(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        self.backend.get_file(remote, local).await
    }

    pub async fn get_directory(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        self.backend.get_directory(remote, local).await
    }

    pub async fn delete_path(&self, path: &str) -> ArchiveResult<()> {
        self.backend.delete_path(path).await
    }

    async fn put_atomically(
        &self,
        local: &Path,
        remote: &str,
        kind: TransferKind,
    ) -> ArchiveResult<()> {
        if self.backend.exists(remote).await? {
            return Err(ArchiveError::file_overwrite(remote));
        }

        let metadata = tokio::fs::metadata(local)
            .await
            .map_err(|e| ArchiveError::from_io(e, local))?;
        match kind {
            TransferKind::Directory if !metadata.is_dir() => {
                return Err(ArchiveError::not_a_directory(local.display().to_string()));
            }
            TransferKind::File if !metadata.is_file() => {
                return Err(ArchiveError::ValidationError(format!(
                    "`{}` is not a regular file",
                    local.display()
                )));
            }
            _ => {}
        }

        let temp = self.resolver.temp_path_for(remote);

        // Leftovers from an attempt that died mid-transfer.
        self.backend.delete_path(&temp).await?;

        let staged = match kind {
            TransferKind::File => self.backend.put_file(local, &temp).await,
            TransferKind::Directory => self.backend.put_directory(local, &temp).await,
        };
        if let Err(e) = staged {
            self.discard_temp(&temp).await;
            return Err(e);
        }

        if let Err(e) = self.backend.rename(&temp, remote).await {
            self.discard_temp(&temp).await;
            return Err(e);
        }

        tracing::debug!(remote = %remote, temp = %temp, "Published archive transfer");
        Ok(())
    }

    async fn discard_temp(&self, temp: &str) {
        if let Err(e) = self.backend.delete_path(temp).await {
            tracing::warn!(temp = %temp, error = %e, "Failed to remove staged transfer");
        }
    }
}
