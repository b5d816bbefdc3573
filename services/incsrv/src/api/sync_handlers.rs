//! Sync API Handlers

#![allow(clippy::disallowed_methods)] // json! macro used in multiple functions

use axum::{extract::State, response::Json};
use common::SuccessResponse;
use serde_json::json;
use std::sync::Arc;
use tracing::info;

use crate::app_state::AppState;
use crate::error::IncsrvError;

pub const FETCH_SUCCESS_MESSAGE: &str = "Data fetched and stored successfully";

/// Run a synchronization pass
///
/// Returns once all four pipelines have finished. Always answers 200;
/// partial failure is visible only in the attached report.
///
/// @route POST /api/fetch_data
/// @output {"message": "...", "report": SyncReport}
/// @side-effects Upserts services, incidents, teams and escalation policies
#[utoipa::path(
    post,
    path = "/api/fetch_data",
    responses(
        (status = 200, description = "Sync pass finished", body = serde_json::Value,
            example = json!({"success": true, "data": {
                "message": "Data fetched and stored successfully",
                "report": {
                    "id": "6f1c2d1e-9c8a-4c59-8d0b-1c1f0b3a9e77",
                    "started_at": "2024-01-15T10:00:00Z",
                    "finished_at": "2024-01-15T10:00:02Z",
                    "entities": [
                        {"kind": "service", "status": "synced", "records": 12, "skipped": 0, "identity_conflicts": 0},
                        {"kind": "incident", "status": "fetch_failed", "records": 0, "skipped": 0, "identity_conflicts": 0,
                         "reason": "incidents returned HTTP 503"}
                    ]
                }
            }}))
    ),
    tag = "sync"
)]
pub async fn fetch_data(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    info!("Sync pass requested via API");
    let report = state.run_sync().await;

    Ok(Json(SuccessResponse::new(json!({
        "message": FETCH_SUCCESS_MESSAGE,
        "report": report
    }))))
}

/// Report of the last pass run by this process
///
/// @route GET /api/sync/status
/// @output SyncReport, or null before the first pass
#[utoipa::path(
    get,
    path = "/api/sync/status",
    responses(
        (status = 200, description = "Last sync report, null if none yet", body = serde_json::Value)
    ),
    tag = "sync"
)]
pub async fn sync_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let last = state.last_sync().await;
    let complete = last.as_ref().map(|r| r.is_complete());

    Ok(Json(
        SuccessResponse::new(json!(last)).with_metadata("complete", json!(complete)),
    ))
}
