//! Health Check API Handlers

use axum::{extract::State, response::Json};
use common::{ComponentHealth, HealthStatus, ServiceStatus, SuccessResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::app_state::AppState;

/// Health check endpoint
///
/// Reports database reachability and whether the last sync pass was
/// complete. Always answers 200; the status field carries the verdict.
///
/// @route GET /health
/// @output Json<SuccessResponse<HealthStatus>>
/// @side-effects None (read-only operation)
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service health", body = serde_json::Value)
    ),
    tag = "incsrv"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<SuccessResponse<HealthStatus>> {
    let mut checks = HashMap::new();

    let started = Instant::now();
    let database = match state.sqlite_client.ping().await {
        Ok(()) => ComponentHealth::healthy(started.elapsed().as_millis() as u64),
        Err(e) => ComponentHealth::with_status(ServiceStatus::Unhealthy, e.to_string()),
    };
    checks.insert("database".to_string(), database);

    let sync = match state.last_sync().await {
        None => ComponentHealth::with_status(ServiceStatus::Healthy, "no pass yet"),
        Some(report) if report.is_complete() => ComponentHealth::with_status(
            ServiceStatus::Healthy,
            format!("last pass {}", report.finished_at.to_rfc3339()),
        ),
        Some(report) => ComponentHealth::with_status(
            ServiceStatus::Degraded,
            format!("last pass {} was incomplete", report.finished_at.to_rfc3339()),
        ),
    };
    checks.insert("sync".to_string(), sync);

    Json(SuccessResponse::new(HealthStatus {
        status: HealthStatus::aggregate(&checks),
        service: state.config.service.name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        timestamp: chrono::Utc::now(),
        checks,
    }))
}
