//! Liveness check.
//!
//! - `GET /health` - is the service alive?

use axum::response::{IntoResponse, Json};
use serde_json::json;

/// Returns 200 OK while the process is serving requests.
pub async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
