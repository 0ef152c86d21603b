use std::future::Future;

use axum::extract::{Query, State};
use axum::Json;
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::document::Document;
use crate::state::AppState;
use crate::sync::service::SyncReport;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub status: String,
    pub message: String,
    pub report: SyncReport,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub message: String,
    pub last_scheduled_sync: Option<SyncReport>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryParams {
    pub category: Option<String>,
}

/// Run a sweep on its own task so a dropped connection cannot cancel it.
async fn detached<F>(sweep: F) -> Result<SyncReport, AppError>
where
    F: Future<Output = Result<SyncReport, AppError>> + Send + 'static,
{
    tokio::spawn(sweep)
        .await
        .map_err(|e| AppError::Internal(format!("Sync task failed: {e}")))?
}

fn sync_response(message: String, report: SyncReport) -> Json<SyncResponse> {
    Json(SyncResponse {
        status: "success".to_string(),
        message,
        report,
    })
}

/// POST /api/indexing/index-new
pub async fn index_new_handler(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    tracing::info!("Manual full sync requested");
    let sync = state.synchronizer.clone();
    let report = detached(async move { sync.sync_all().await }).await?;
    Ok(sync_response(
        format!("Indexed {} of {} documents", report.succeeded, report.total),
        report,
    ))
}

/// POST /api/indexing/index-by-category?category=
pub async fn index_by_category_handler(
    State(state): State<AppState>,
    WithRejection(Query(params), _): WithRejection<Query<CategoryParams>, AppError>,
) -> Result<Json<SyncResponse>, AppError> {
    let category = params
        .category
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Category is required".into()))?;
    tracing::info!(%category, "Category sync requested");

    let sync = state.synchronizer.clone();
    let scope = category.clone();
    let report = detached(async move { sync.sync_category(&scope).await }).await?;
    Ok(sync_response(
        format!(
            "Indexed {} of {} documents for category '{category}'",
            report.succeeded, report.total
        ),
        report,
    ))
}

/// POST /api/indexing/index-document
pub async fn index_document_handler(
    State(state): State<AppState>,
    WithRejection(Json(document), _): WithRejection<Json<Document>, AppError>,
) -> Result<Json<serde_json::Value>, AppError> {
    tracing::info!(id = %document.id, "Single document indexing requested");
    state.synchronizer.sync_one(&document).await?;
    Ok(Json(serde_json::json!({
        "status": "success",
        "message": format!("Document '{}' indexed successfully", document.id),
    })))
}

/// POST /api/indexing/reindex-all
pub async fn reindex_all_handler(
    State(state): State<AppState>,
) -> Result<Json<SyncResponse>, AppError> {
    tracing::info!("Full reindex requested");
    let sync = state.synchronizer.clone();
    let report = detached(async move { sync.rebuild_all().await }).await?;
    Ok(sync_response(
        format!(
            "Reindexed {} of {} documents",
            report.succeeded, report.total
        ),
        report,
    ))
}

/// GET /api/indexing/health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "indexing".to_string(),
        message: "Indexing service is running".to_string(),
        last_scheduled_sync: state.last_scheduled_sync.read().clone(),
    })
}
