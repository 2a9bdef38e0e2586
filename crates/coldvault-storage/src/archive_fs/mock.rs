//! Mock archive backend for testing
//!
//! In-memory store with configurable failure patterns for exercising the
//! failed-bucket and recovery paths without a real remote store.
//!
//! # Features
//!
//! - **Deterministic Failures**: a failure queue consumed by every operation
//! - **Targeted Failures**: failures for one operation only (e.g. the publish `rename`)
//! - **Outage / Recovery**: `new_always_fail` plus `heal()` models a transport that comes back
//! - **Call History**: every operation is recorded for assertions
//!
//! Directories are implicit: a directory exists while a file exists under it,
//! so empty local directories are not preserved.
//!
//! # Examples
//!
//! ```rust
//! use coldvault_storage::archive_fs::{ArchiveBackend, MockArchiveBackend, MockFailure};
//!
//! # async fn example() -> coldvault_core::ArchiveResult<()> {
//! let mock = MockArchiveBackend::new_with_failures(vec![
//!     MockFailure::Transient("503 Service Unavailable"),
//!     MockFailure::Ok,
//! ]);
//!
//! assert!(mock.exists("/archive").await.is_err());
//! assert!(!mock.exists("/archive").await?);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ArchiveBackend;
use crate::fs_util;
use coldvault_core::{ArchiveError, ArchiveResult};

/// Mock failure pattern.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Transient error. Examples: 500, 503, timeout.
    Transient(&'static str),

    /// Permanent error. Examples: 403, 400.
    Permanent(&'static str),

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self) -> Option<ArchiveError> {
        match self {
            MockFailure::Transient(msg) => Some(ArchiveError::Transport(format!("Transient: {}", msg))),
            MockFailure::Permanent(msg) => Some(ArchiveError::Transport(format!("Permanent: {}", msg))),
            MockFailure::Ok => None,
        }
    }
}

/// Backend operation, for targeted failures and call history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    Exists,
    List,
    PutFile,
    PutDirectory,
    Rename,
    GetFile,
    GetDirectory,
    Delete,
}

impl fmt::Display for MockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exists => "exists",
            Self::List => "list",
            Self::PutFile => "put_file",
            Self::PutDirectory => "put_directory",
            Self::Rename => "rename",
            Self::GetFile => "get_file",
            Self::GetDirectory => "get_directory",
            Self::Delete => "delete",
        };
        write!(f, "{name}")
    }
}

/// Mock backend configuration.
#[derive(Debug, Clone)]
pub struct MockArchiveConfig {
    /// Simulated network latency per operation.
    pub latency: Duration,

    /// Enable call history tracking.
    pub track_history: bool,
}

impl Default for MockArchiveConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            track_history: true,
        }
    }
}

/// Mock call history entry.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    pub operation: MockOperation,

    /// Path the operation targeted (source path for `rename`).
    pub path: String,

    pub success: bool,

    pub timestamp: Instant,
}

/// In-memory archive backend.
pub struct MockArchiveBackend {
    /// Files keyed by full archive path.
    files: Arc<RwLock<BTreeMap<String, Bytes>>>,

    /// Failures consumed by any operation, in order.
    failure_queue: Arc<RwLock<VecDeque<MockFailure>>>,

    /// Failures consumed only by one operation; checked before `failure_queue`.
    targeted: Arc<RwLock<HashMap<MockOperation, VecDeque<MockFailure>>>>,

    config: MockArchiveConfig,

    call_history: Arc<RwLock<Vec<CallHistoryEntry>>>,
}

impl MockArchiveBackend {
    /// Create a mock with default config (no failures).
    pub fn new() -> Self {
        Self::new_with_config(MockArchiveConfig::default())
    }

    pub fn new_with_config(config: MockArchiveConfig) -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
            failure_queue: Arc::new(RwLock::new(VecDeque::new())),
            targeted: Arc::new(RwLock::new(HashMap::new())),
            config,
            call_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a mock with a deterministic failure pattern.
    ///
    /// Failures are consumed in order by whichever operation runs next. Once
    /// the queue is empty, all operations succeed.
    pub fn new_with_failures(pattern: Vec<MockFailure>) -> Self {
        let mock = Self::new();
        *mock.failure_queue.write() = pattern.into();
        mock
    }

    /// Create a mock whose transport is down until [`MockArchiveBackend::heal`].
    ///
    /// Pre-fills the failure queue with 1000 identical transient errors.
    pub fn new_always_fail(error: &'static str) -> Self {
        Self::new_with_failures(vec![MockFailure::Transient(error); 1000])
    }

    /// Queue a failure for the next call of one operation.
    pub fn fail_next(&self, operation: MockOperation, failure: MockFailure) {
        self.targeted
            .write()
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Take the transport down: every following operation fails.
    pub fn break_transport(&self, error: &'static str) {
        *self.failure_queue.write() = vec![MockFailure::Transient(error); 1000].into();
    }

    /// Bring the transport back by dropping all pending failures.
    pub fn heal(&self) {
        self.failure_queue.write().clear();
        self.targeted.write().clear();
    }

    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    /// Number of successful calls of an operation.
    pub fn successful(&self, operation: MockOperation) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation && entry.success)
            .count()
    }

    /// Number of failed calls of an operation.
    pub fn failed(&self, operation: MockOperation) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == operation && !entry.success)
            .count()
    }

    /// Number of stored files.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    pub fn contains_file(&self, path: &str) -> bool {
        self.files.read().contains_key(path)
    }

    /// All stored file paths, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        self.files.read().keys().cloned().collect()
    }

    /// Reset storage and history.
    pub fn reset(&self) {
        self.files.write().clear();
        self.call_history.write().clear();
    }

    fn check_failure(&self, operation: MockOperation) -> Option<ArchiveError> {
        if let Some(failure) = self
            .targeted
            .write()
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front())
        {
            return failure.to_error();
        }
        self.failure_queue
            .write()
            .pop_front()
            .and_then(|failure| failure.to_error())
    }

    fn record_call(&self, operation: MockOperation, path: &str, success: bool) {
        if self.config.track_history {
            self.call_history.write().push(CallHistoryEntry {
                operation,
                path: path.to_string(),
                success,
                timestamp: Instant::now(),
            });
        }
    }

    /// Simulate latency and a possible failure for one call.
    async fn begin(&self, operation: MockOperation, path: &str) -> ArchiveResult<()> {
        tokio::time::sleep(self.config.latency).await;
        match self.check_failure(operation) {
            Some(error) => {
                self.record_call(operation, path, false);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn finish<T>(&self, operation: MockOperation, path: &str, result: ArchiveResult<T>) -> ArchiveResult<T> {
        self.record_call(operation, path, result.is_ok());
        result
    }
}

impl Default for MockArchiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_end_matches('/')
}

fn child_prefix(path: &str) -> String {
    format!("{}/", normalize(path))
}

fn is_under(key: &str, path: &str) -> bool {
    let path = normalize(path);
    key == path || key.starts_with(&child_prefix(path))
}

fn tree_exists(files: &BTreeMap<String, Bytes>, path: &str) -> bool {
    files.keys().any(|key| is_under(key, path))
}

#[async_trait]
impl ArchiveBackend for MockArchiveBackend {
    async fn exists(&self, path: &str) -> ArchiveResult<bool> {
        self.begin(MockOperation::Exists, path).await?;
        let found = tree_exists(&self.files.read(), path);
        self.finish(MockOperation::Exists, path, Ok(found))
    }

    async fn list_paths(&self, path: &str) -> ArchiveResult<Vec<String>> {
        self.begin(MockOperation::List, path).await?;
        let files = self.files.read();
        let path = normalize(path);

        if files.contains_key(path) {
            return self.finish(MockOperation::List, path, Ok(vec![path.to_string()]));
        }

        let prefix = child_prefix(path);
        let children: BTreeSet<String> = files
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('/').next())
            .map(|child| format!("{prefix}{child}"))
            .collect();

        self.finish(MockOperation::List, path, Ok(children.into_iter().collect()))
    }

    async fn put_file(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        self.begin(MockOperation::PutFile, remote).await?;
        let result = match tokio::fs::read(local).await {
            Ok(data) => {
                self.files
                    .write()
                    .insert(normalize(remote).to_string(), Bytes::from(data));
                Ok(())
            }
            Err(e) => Err(ArchiveError::from_io(e, local)),
        };
        self.finish(MockOperation::PutFile, remote, result)
    }

    async fn put_directory(&self, local: &Path, remote: &str) -> ArchiveResult<()> {
        self.begin(MockOperation::PutDirectory, remote).await?;

        let root = local.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || -> ArchiveResult<Vec<(String, Bytes)>> {
            fs_util::list_files(&root)?
                .into_iter()
                .map(|(relative, absolute)| {
                    let data = std::fs::read(&absolute)
                        .map_err(|e| ArchiveError::from_io(e, &absolute))?;
                    Ok((relative, Bytes::from(data)))
                })
                .collect()
        })
        .await
        .map_err(|e| ArchiveError::internal(format!("transfer task failed: {e}")));

        let result = loaded.and_then(|inner| inner).map(|entries| {
            let prefix = child_prefix(remote);
            let mut files = self.files.write();
            for (relative, data) in entries {
                files.insert(format!("{prefix}{relative}"), data);
            }
        });
        self.finish(MockOperation::PutDirectory, remote, result)
    }

    async fn rename(&self, from: &str, to: &str) -> ArchiveResult<()> {
        self.begin(MockOperation::Rename, from).await?;

        let result = {
            let mut files = self.files.write();
            if tree_exists(&files, to) {
                Err(ArchiveError::file_overwrite(to))
            } else {
                let moved: Vec<String> = files
                    .keys()
                    .filter(|key| is_under(key, from))
                    .cloned()
                    .collect();
                if moved.is_empty() {
                    Err(ArchiveError::not_found(from))
                } else {
                    let from = normalize(from);
                    let to = normalize(to);
                    for key in moved {
                        if let Some(data) = files.remove(&key) {
                            files.insert(format!("{to}{}", &key[from.len()..]), data);
                        }
                    }
                    Ok(())
                }
            }
        };
        self.finish(MockOperation::Rename, from, result)
    }

    async fn get_file(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        self.begin(MockOperation::GetFile, remote).await?;
        let data = self.files.read().get(normalize(remote)).cloned();
        let result = match data {
            Some(data) => write_local(local, &data).await,
            None => Err(ArchiveError::not_found(remote)),
        };
        self.finish(MockOperation::GetFile, remote, result)
    }

    async fn get_directory(&self, remote: &str, local: &Path) -> ArchiveResult<()> {
        self.begin(MockOperation::GetDirectory, remote).await?;

        let prefix = child_prefix(remote);
        let entries: Vec<(String, Bytes)> = self
            .files
            .read()
            .iter()
            .filter_map(|(key, data)| {
                key.strip_prefix(&prefix)
                    .map(|relative| (relative.to_string(), data.clone()))
            })
            .collect();

        let result = if entries.is_empty() {
            Err(ArchiveError::not_found(remote))
        } else {
            let mut result = tokio::fs::create_dir_all(local)
                .await
                .map_err(ArchiveError::from);
            for (relative, data) in &entries {
                if result.is_err() {
                    break;
                }
                result = write_local(&local.join(relative), data).await;
            }
            result
        };
        self.finish(MockOperation::GetDirectory, remote, result)
    }

    async fn delete_path(&self, path: &str) -> ArchiveResult<()> {
        self.begin(MockOperation::Delete, path).await?;
        self.files.write().retain(|key, _| !is_under(key, path));
        self.finish(MockOperation::Delete, path, Ok(()))
    }
}

async fn write_local(path: &Path, data: &Bytes) -> ArchiveResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, data).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn seed(mock: &MockArchiveBackend, dir: &TempDir, remote: &str, data: &[u8]) {
        let local = dir.path().join("seed");
        std::fs::write(&local, data).unwrap();
        mock.put_file(&local, remote).await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let mock = MockArchiveBackend::new();
        seed(&mock, &dir, "/a/b/file", b"data").await;

        assert!(mock.exists("/a/b/file").await.unwrap());
        assert!(mock.exists("/a/b").await.unwrap());
        assert!(mock.exists("/a/").await.unwrap());
        assert!(!mock.exists("/a/bb").await.unwrap());

        let out = dir.path().join("out/file");
        mock.get_file("/a/b/file", &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"data");

        mock.delete_path("/a").await.unwrap();
        assert_eq!(mock.file_count(), 0);
        // Idempotent delete
        mock.delete_path("/a").await.unwrap();
    }

    #[tokio::test]
    async fn test_mock_list_immediate_children() {
        let dir = TempDir::new().unwrap();
        let mock = MockArchiveBackend::new();
        seed(&mock, &dir, "/root/main/db_2_1_1/NATIVE_BUCKET/f", b"1").await;
        seed(&mock, &dir, "/root/main/db_4_3_2/NATIVE_BUCKET/f", b"2").await;
        seed(&mock, &dir, "/root/other/db_6_5_3/CSV/f", b"3").await;

        assert_eq!(
            mock.list_paths("/root").await.unwrap(),
            vec!["/root/main".to_string(), "/root/other".to_string()]
        );
        assert_eq!(
            mock.list_paths("/root/main/").await.unwrap(),
            vec![
                "/root/main/db_2_1_1".to_string(),
                "/root/main/db_4_3_2".to_string()
            ]
        );
        assert!(mock.list_paths("/nothing").await.unwrap().is_empty());
        assert_eq!(
            mock.list_paths("/root/other/db_6_5_3/CSV/f").await.unwrap(),
            vec!["/root/other/db_6_5_3/CSV/f".to_string()]
        );
    }

    #[tokio::test]
    async fn test_mock_rename_moves_tree_and_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let mock = MockArchiveBackend::new();
        seed(&mock, &dir, "/tmp/x/one", b"1").await;
        seed(&mock, &dir, "/tmp/x/sub/two", b"2").await;
        seed(&mock, &dir, "/tmp/xy/keep", b"3").await;

        mock.rename("/tmp/x", "/final/x").await.unwrap();
        assert!(mock.contains_file("/final/x/one"));
        assert!(mock.contains_file("/final/x/sub/two"));
        assert!(mock.contains_file("/tmp/xy/keep"));
        assert!(!mock.exists("/tmp/x").await.unwrap());

        let result = mock.rename("/tmp/xy", "/final/x").await;
        assert!(matches!(result, Err(ArchiveError::FileOverwrite { .. })));

        let result = mock.rename("/tmp/missing", "/final/y").await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_mock_directory_round_trip() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::create_dir_all(src.path().join("rawdata")).unwrap();
        std::fs::write(src.path().join("rawdata/journal.gz"), b"journal").unwrap();
        std::fs::write(src.path().join("Hosts.data"), b"hosts").unwrap();

        let mock = MockArchiveBackend::new();
        mock.put_directory(src.path(), "/archive/b").await.unwrap();
        mock.get_directory("/archive/b", &dst.path().join("b")).await.unwrap();

        assert_eq!(
            std::fs::read(dst.path().join("b/rawdata/journal.gz")).unwrap(),
            b"journal"
        );
        assert_eq!(std::fs::read(dst.path().join("b/Hosts.data")).unwrap(), b"hosts");

        let result = mock.get_directory("/archive/none", &dst.path().join("none")).await;
        assert!(matches!(result, Err(ArchiveError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_mock_deterministic_failures() {
        let mock = MockArchiveBackend::new_with_failures(vec![
            MockFailure::Transient("500 Internal Server Error"),
            MockFailure::Permanent("403 Forbidden"),
            MockFailure::Ok,
        ]);

        let first = mock.exists("/a").await;
        assert!(first.unwrap_err().to_string().contains("500"));
        let second = mock.list_paths("/a").await;
        assert!(second.unwrap_err().to_string().contains("403"));
        assert!(mock.exists("/a").await.is_ok());
        assert_eq!(mock.failed(MockOperation::Exists), 1);
        assert_eq!(mock.failed(MockOperation::List), 1);
        assert_eq!(mock.successful(MockOperation::Exists), 1);
    }

    #[tokio::test]
    async fn test_mock_targeted_failure_and_heal() {
        let mock = MockArchiveBackend::new_always_fail("connection refused");
        assert!(mock.exists("/a").await.is_err());
        assert!(mock.exists("/a").await.is_err());

        mock.heal();
        assert!(mock.exists("/a").await.is_ok());

        mock.fail_next(MockOperation::Rename, MockFailure::Transient("503"));
        assert!(mock.exists("/a").await.is_ok());
        assert!(mock.rename("/a", "/b").await.unwrap_err().to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_mock_outage_history_and_reset() {
        let dir = TempDir::new().unwrap();
        let mock = MockArchiveBackend::new();
        seed(&mock, &dir, "/a/file", b"1").await;

        mock.break_transport("connection refused");
        assert!(mock.exists("/a/file").await.is_err());
        assert!(mock.delete_path("/a").await.is_err());
        assert_eq!(mock.file_paths(), vec!["/a/file".to_string()]);

        let history = mock.get_call_history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].operation, MockOperation::PutFile);
        assert!(history[0].success);
        assert_eq!(history[2].path, "/a");
        assert!(!history[2].success);

        mock.heal();
        mock.clear_history();
        assert!(mock.exists("/a/file").await.unwrap());
        assert_eq!(mock.successful(MockOperation::Exists), 1);

        mock.reset();
        assert_eq!(mock.file_count(), 0);
        assert!(mock.get_call_history().is_empty());
    }
}
