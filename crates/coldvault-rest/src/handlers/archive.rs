//! Bucket archive trigger.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Form};
use coldvault_storage::{FreezeFailure, FreezeOutcome};
use serde::Deserialize;

use crate::AppState;

/// Form body of the archive request.
#[derive(Debug, Deserialize)]
pub struct ArchiveBucketForm {
    pub index: String,
    pub path: String,
}

/// Freeze and archive one bucket.
///
/// Returns 204 once the bucket is archived or parked in the failed area for
/// a later sweep. The detailed cause of a failure is logged, not returned.
#[tracing::instrument(skip(state, form), fields(index = %form.index, path = %form.path))]
pub async fn archive_bucket(
    State(state): State<Arc<AppState>>,
    Form(form): Form<ArchiveBucketForm>,
) -> Result<StatusCode, (StatusCode, String)> {
    let outcome = state
        .pipeline
        .freezer
        .freeze_bucket(&form.index, &form.path)
        .await;

    match outcome {
        FreezeOutcome::Archived { .. } | FreezeOutcome::ArchiveDeferred { .. } => {
            Ok(StatusCode::NO_CONTENT)
        }
        FreezeOutcome::SourceNotFound => {
            Err((StatusCode::NOT_FOUND, "Bucket not found".to_string()))
        }
        FreezeOutcome::SourceNotADirectory => Err((
            StatusCode::BAD_REQUEST,
            "Bucket path is not a directory".to_string(),
        )),
        FreezeOutcome::Failed {
            failure: FreezeFailure::InvalidInput { reason },
        } => {
            tracing::warn!(reason = %reason, "Rejected archive request");
            Err((StatusCode::BAD_REQUEST, "Invalid index or path".to_string()))
        }
        FreezeOutcome::Failed { failure } => {
            tracing::error!(failure = %failure, "Archive request failed");
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Archiving failed".to_string(),
            ))
        }
    }
}
