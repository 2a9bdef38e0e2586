//! HTTP trigger surface for the Coldvault archiving pipeline.
//!
//! # Endpoints
//!
//! - `POST /archiver/bucket/archive` - freeze and archive a bucket (form: `index`, `path`)
//! - `POST /archiver/bucket/thaw` - thaw an index for a time range (form: `index`, `from`, `to`)
//! - `GET /archiver/bucket/thawed` - buckets thawed by the most recent thaw
//! - `POST /archiver/recovery/sweep` - run one recovery sweep
//! - `GET /health` - liveness check

pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use coldvault_storage::Pipeline;
use tower_http::trace::TraceLayer;

/// Shared handler state.
pub struct AppState {
    pub pipeline: Pipeline,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }
}

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/archiver/bucket/archive", post(handlers::archive_bucket))
        .route("/archiver/bucket/thaw", post(handlers::thaw_buckets))
        .route("/archiver/bucket/thawed", get(handlers::thawed_buckets))
        .route("/archiver/recovery/sweep", post(handlers::sweep_failed_buckets))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
