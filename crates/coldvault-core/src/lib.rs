//! Core domain types for the Coldvault bucket archiving pipeline.

pub mod bucket;
pub mod config;
pub mod error;
pub mod path_resolver;

pub use bucket::{validate_index_name, Bucket, BucketFormat, BucketKind, BucketName};
pub use config::{
    ArchiveConfiguration, ColdvaultConfig, LocationsConfig, LoggingConfig, ServerConfig,
    StorageConfig, ThawConfig,
};
pub use error::{ArchiveError, ArchiveResult};
pub use path_resolver::{PathResolver, BUCKET_SIZE_FILE_NAME, METADATA_DIR_NAME};
