//! Manual recovery sweep.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use coldvault_storage::RecoveryReport;

use crate::AppState;

/// Runs one recovery sweep over the failed area and returns its report.
///
/// The cause of a failed sweep is logged, not returned.
#[tracing::instrument(skip(state))]
pub async fn sweep_failed_buckets(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RecoveryReport>, (StatusCode, String)> {
    state
        .pipeline
        .recovery
        .archive_failed_buckets()
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!(error = %e, "Recovery sweep failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Recovery sweep failed".to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;
    use axum::http::StatusCode;
    use coldvault_storage::MockArchiveBackend;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_sweep_after_outage() {
        let app = test_app(MockArchiveBackend::new_always_fail("connection refused"));
        let path = indexed_bucket(&app.dir, "db_200_100_1");
        let response = app
            .router
            .clone()
            .oneshot(form_post(
                "/archiver/bucket/archive",
                format!("index=main&path={}", path.display()),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        app.backend.heal();
        let response = app
            .router
            .clone()
            .oneshot(form_post("/archiver/recovery/sweep", String::new()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["archived"].as_array().unwrap().len(), 1);
        assert_eq!(report["archived"][0]["name"], "db_200_100_1");
        assert!(!app.dir.path().join("failed/main/db_200_100_1").exists());
    }

    #[tokio::test]
    async fn test_unreadable_failed_area_hides_details() {
        let app = test_app(MockArchiveBackend::new());
        // A file where the failed area directory should be.
        let failed_area = app.dir.path().join("failed");
        std::fs::write(&failed_area, b"not a directory").unwrap();

        let response = app
            .router
            .clone()
            .oneshot(form_post("/archiver/recovery/sweep", String::new()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_text(response).await;
        assert_eq!(body, "Recovery sweep failed");
        assert!(!body.contains(&failed_area.display().to_string()));
    }
}
