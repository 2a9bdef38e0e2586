//! Thaw trigger and results.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Form, Json};
use chrono::{DateTime, Utc};
use coldvault_core::{ArchiveError, Bucket};
use coldvault_storage::ThawReport;
use serde::Deserialize;

use crate::AppState;

/// Form body of the thaw request. `from` and `to` are epoch seconds.
#[derive(Debug, Deserialize)]
pub struct ThawForm {
    pub index: String,
    pub from: i64,
    pub to: i64,
}

fn timestamp(field: &str, secs: i64) -> Result<DateTime<Utc>, (StatusCode, String)> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("`{field}` is not a valid timestamp: {secs}"),
        )
    })
}

/// Thaws every archived bucket of an index whose range intersects `[from, to]`.
#[tracing::instrument(skip(state, form), fields(index = %form.index, from = form.from, to = form.to))]
pub async fn thaw_buckets(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ThawForm>,
) -> Result<Json<ThawReport>, (StatusCode, String)> {
    let earliest = timestamp("from", form.from)?;
    let latest = timestamp("to", form.to)?;

    match state
        .pipeline
        .thawer
        .thaw_buckets(&form.index, earliest, latest)
        .await
    {
        Ok(report) => Ok(Json(report)),
        Err(ArchiveError::ValidationError(msg)) => Err((StatusCode::BAD_REQUEST, msg)),
        Err(e) => {
            tracing::error!(error = %e, "Thaw failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Thaw failed".to_string()))
        }
    }
}

/// Buckets thawed by the most recent thaw request.
pub async fn thawed_buckets(State(state): State<Arc<AppState>>) -> Json<Vec<Bucket>> {
    Json(state.pipeline.thawer.thawed_buckets())
}
