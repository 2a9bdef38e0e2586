//! Listing of archived indexes and buckets.

use std::sync::Arc;

use coldvault_core::path_resolver::base_name;
use coldvault_core::{ArchiveResult, Bucket, BucketFormat, PathResolver};

use crate::archive_fs::ArchiveFileSystem;

/// Lists what this server has archived.
#[derive(Clone)]
pub struct ArchiveBucketLister {
    fs: Arc<ArchiveFileSystem>,
    resolver: PathResolver,
    format_priority: Vec<BucketFormat>,
}

impl ArchiveBucketLister {
    /// `format_priority` decides which copy represents a bucket archived in
    /// several formats. Formats missing from it are never chosen.
    pub fn new(
        fs: Arc<ArchiveFileSystem>,
        resolver: PathResolver,
        format_priority: Vec<BucketFormat>,
    ) -> Self {
        Self {
            fs,
            resolver,
            format_priority,
        }
    }

    /// Names of the archived indexes, sorted.
    pub async fn list_indexes(&self) -> ArchiveResult<Vec<String>> {
        let paths = self.fs.list_paths(&self.resolver.indexes_home()).await?;
        Ok(paths.iter().map(|p| base_name(p).to_string()).collect())
    }

    /// Archived buckets of an index, one record per bucket, in listing order.
    pub async fn list_buckets_in_index(&self, index: &str) -> ArchiveResult<Vec<Bucket>> {
        let mut buckets = Vec::new();
        for bucket_path in self.fs.list_paths(&self.resolver.buckets_home(index)).await? {
            let name = base_name(&bucket_path).to_string();
            let bucket_index = self.resolver.resolve_index_from_path_to_bucket(&bucket_path);

            let formats = self.archived_formats(&bucket_index, &name).await?;
            match self.choose_format(&formats) {
                Some(format) => {
                    let archive_path =
                        self.resolver
                            .resolve_archived_bucket_path(&bucket_index, &name, format);
                    buckets.push(Bucket::archived(bucket_index, name, format, archive_path));
                }
                None => {
                    tracing::warn!(
                        index = %bucket_index,
                        bucket = %name,
                        "Archived bucket has no format in the configured priority, skipping"
                    );
                }
            }
        }
        Ok(buckets)
    }

    /// Formats a bucket is archived in. Unknown directory names are ignored.
    pub async fn archived_formats(&self, index: &str, bucket_name: &str) -> ArchiveResult<Vec<BucketFormat>> {
        let paths = self
            .fs
            .list_paths(&self.resolver.formats_home(index, bucket_name))
            .await?;
        Ok(paths
            .iter()
            .filter_map(|p| base_name(p).parse::<BucketFormat>().ok())
            .collect())
    }

    fn choose_format(&self, available: &[BucketFormat]) -> Option<BucketFormat> {
        self.format_priority
            .iter()
            .copied()
            .find(|format| available.contains(format))
    }
}
