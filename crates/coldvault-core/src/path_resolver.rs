//! Deterministic archive paths for buckets.
//!
//! ```text
//! {archiveRoot}/{cluster}/{server}/{index}/{bucket}/{format}                       archive path
//! {archiveRoot}/{cluster}/{server}/{index}/{bucket}/{format}/archive_meta/{file}   metadata
//! {tempRoot}{archive path}                                                         staging
//! ```
//!
//! `{server}` is the server that owns the bucket: this server for origin
//! buckets, and for replicas the peer named by the GUID in the bucket name,
//! when that peer is configured. A replica of an unknown peer falls back to
//! this server's name.
//!
//! Everything here is a pure string computation.

use crate::bucket::{Bucket, BucketFormat};
use crate::config::ArchiveConfiguration;

/// Path separator on the archive file system.
pub const SEPARATOR: char = '/';

/// Directory holding per-bucket metadata, nested under the archive path.
pub const METADATA_DIR_NAME: &str = "archive_meta";

/// File name of the bucket size record.
pub const BUCKET_SIZE_FILE_NAME: &str = "bucket.size";

/// Resolves paths on the archive file system for buckets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    configuration: ArchiveConfiguration,
}

impl PathResolver {
    pub fn new(configuration: ArchiveConfiguration) -> Self {
        Self { configuration }
    }

    pub fn configuration(&self) -> &ArchiveConfiguration {
        &self.configuration
    }

    /// Unique archive path of a bucket.
    pub fn resolve_archive_path(&self, bucket: &Bucket) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}{SEPARATOR}{}",
            self.server_names_home(),
            self.archiving_server_name(bucket),
            bucket.index,
            bucket.archive_name(),
            bucket.format
        )
    }

    /// Server whose archive tree holds the bucket.
    pub fn archiving_server_name(&self, bucket: &Bucket) -> &str {
        if !bucket.is_replica() {
            return &self.configuration.server_name;
        }
        bucket
            .parsed_name()
            .and_then(|name| name.guid)
            .and_then(|guid| self.configuration.peer_server_name(&guid))
            .unwrap_or(&self.configuration.server_name)
    }

    /// Path where all server names of the configured cluster can be listed.
    pub fn server_names_home(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            self.configuration.archive_root_path.trim_end_matches(SEPARATOR),
            self.configuration.cluster_name
        )
    }

    /// Path where the indexes archived by this server can be listed.
    pub fn indexes_home(&self) -> String {
        format!(
            "{}{SEPARATOR}{}",
            self.server_names_home(),
            self.configuration.server_name
        )
    }

    /// Path where the archived buckets of an index can be listed.
    pub fn buckets_home(&self, index: &str) -> String {
        format!("{}{SEPARATOR}{index}", self.indexes_home())
    }

    /// Path where the archived formats of a bucket can be listed.
    pub fn formats_home(&self, index: &str, bucket_name: &str) -> String {
        format!("{}{SEPARATOR}{bucket_name}", self.buckets_home(index))
    }

    pub fn resolve_archived_bucket_path(
        &self,
        index: &str,
        bucket_name: &str,
        format: BucketFormat,
    ) -> String {
        format!("{}{SEPARATOR}{format}", self.formats_home(index, bucket_name))
    }

    /// Index name of an archived bucket path `.../{index}/{bucket}`.
    ///
    /// A trailing separator is ignored.
    pub fn resolve_index_from_path_to_bucket(&self, bucket_path: &str) -> String {
        let trimmed = bucket_path.trim_end_matches(SEPARATOR);
        let parent = match trimmed.rfind(SEPARATOR) {
            Some(pos) => &trimmed[..pos],
            None => "",
        };
        base_name(parent).to_string()
    }

    /// Staging location for a bucket transfer, invisible to archive readers.
    pub fn resolve_temp_path_for_bucket(&self, bucket: &Bucket) -> String {
        self.temp_path_for(&self.resolve_archive_path(bucket))
    }

    /// Staging location for any archive path.
    pub fn temp_path_for(&self, archive_path: &str) -> String {
        format!(
            "{}{archive_path}",
            self.configuration
                .archive_temp_root_path
                .trim_end_matches(SEPARATOR)
        )
    }

    /// Directory holding a bucket's metadata files.
    pub fn metadata_folder_for_bucket(&self, bucket: &Bucket) -> String {
        format!(
            "{}{SEPARATOR}{METADATA_DIR_NAME}",
            self.resolve_archive_path(bucket)
        )
    }

    /// Path of a named metadata file for a bucket.
    pub fn resolve_path_for_bucket_metadata(&self, bucket: &Bucket, file_name: &str) -> String {
        format!("{}{SEPARATOR}{file_name}", self.metadata_folder_for_bucket(bucket))
    }

    pub fn resolve_temp_path_for_bucket_metadata(&self, bucket: &Bucket, file_name: &str) -> String {
        self.temp_path_for(&self.resolve_path_for_bucket_metadata(bucket, file_name))
    }
}

/// Last segment of an archive path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(SEPARATOR);
    match trimmed.rfind(SEPARATOR) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}
