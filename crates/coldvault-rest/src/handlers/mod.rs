pub mod archive;
pub mod health;
pub mod recovery;
pub mod thaw;

pub use archive::archive_bucket;
pub use health::health_handler;
pub use recovery::sweep_failed_buckets;
pub use thaw::{thaw_buckets, thawed_buckets};
