//! Wiring of the pipeline components from configuration.

use std::sync::Arc;

use coldvault_core::{ArchiveResult, ColdvaultConfig, PathResolver};

use crate::archive_fs::{ArchiveBackend, ArchiveFileSystem, LocalArchiveBackend};
use crate::archiver::BucketArchiver;
use crate::freezer::BucketFreezer;
use crate::lister::ArchiveBucketLister;
use crate::locker::BucketLocker;
use crate::mover::BucketMover;
use crate::recovery::FailedBucketsArchiver;
use crate::thaw::BucketThawer;

/// All pipeline components, sharing one archive file system.
#[derive(Clone)]
pub struct Pipeline {
    pub resolver: PathResolver,
    pub fs: Arc<ArchiveFileSystem>,
    pub archiver: BucketArchiver,
    pub recovery: FailedBucketsArchiver,
    pub freezer: BucketFreezer,
    pub lister: ArchiveBucketLister,
    pub thawer: Arc<BucketThawer>,
}

impl Pipeline {
    /// Builds the pipeline over the local-filesystem archive backend rooted
    /// at `storage.local_root`.
    pub async fn from_config(config: &ColdvaultConfig) -> ArchiveResult<Self> {
        let backend = LocalArchiveBackend::new(&config.storage.local_root).await?;
        tracing::info!(
            local_root = %config.storage.local_root.display(),
            cluster = %config.archive.cluster_name,
            server = %config.archive.server_name,
            "Using local archive backend"
        );
        Ok(Self::with_backend(config, Arc::new(backend)))
    }

    /// Builds the pipeline over any backend.
    pub fn with_backend(config: &ColdvaultConfig, backend: Arc<dyn ArchiveBackend>) -> Self {
        let resolver = PathResolver::new(config.archive.clone());
        let fs = Arc::new(ArchiveFileSystem::new(backend, resolver.clone()));

        let mover = BucketMover::new(&config.locations.fail_location);
        let locker = BucketLocker::new(&config.locations.lock_location);
        let archiver = BucketArchiver::new(fs.clone(), resolver.clone());
        let recovery = FailedBucketsArchiver::new(mover.clone(), locker, archiver.clone());
        let freezer = BucketFreezer::new(
            &config.locations.safe_location,
            mover,
            archiver.clone(),
            recovery.clone(),
        );
        let lister = ArchiveBucketLister::new(
            fs.clone(),
            resolver.clone(),
            config.thaw.format_priority.clone(),
        );
        let thawer = Arc::new(BucketThawer::new(
            fs.clone(),
            lister.clone(),
            archiver.size_recorder().clone(),
            &config.thaw.thaw_location,
        ));

        Self {
            resolver,
            fs,
            archiver,
            recovery,
            freezer,
            lister,
            thawer,
        }
    }
}
