//! Report API Handlers
//!
//! Read-only aggregate endpoints over the synchronized tables, plus the CSV
//! and PNG report downloads.

#![allow(clippy::disallowed_methods)] // json! macro used in multiple functions

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
};
use common::SuccessResponse;
use serde_json::json;
use std::sync::Arc;

use crate::app_state::AppState;
use crate::error::IncsrvError;
use crate::reports::{self, chart, csv_report};

/// Total number of services
///
/// @route GET /api/number_of_services
/// @output {"number_of_services": n}
#[utoipa::path(
    get,
    path = "/api/number_of_services",
    responses(
        (status = 200, description = "Number of synchronized services", body = serde_json::Value,
            example = json!({"success": true, "data": {"number_of_services": 12}}))
    ),
    tag = "reports"
)]
pub async fn number_of_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let count = reports::count_services(state.pool()).await?;
    Ok(Json(SuccessResponse::new(json!({
        "number_of_services": count
    }))))
}

/// Incident count per service name
///
/// @route GET /api/incidents_per_service
/// @output {"incidents_per_service": {service_name: count}}
#[utoipa::path(
    get,
    path = "/api/incidents_per_service",
    responses(
        (status = 200, description = "Incident count keyed by service name", body = serde_json::Value,
            example = json!({"success": true, "data": {"incidents_per_service": {"API": 3, "Billing": 1}}}))
    ),
    tag = "reports"
)]
pub async fn incidents_per_service(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let rows = reports::incidents_per_service(state.pool()).await?;
    let by_name: serde_json::Map<String, serde_json::Value> = rows
        .into_iter()
        .map(|r| (r.service, json!(r.count)))
        .collect();

    Ok(Json(SuccessResponse::new(json!({
        "incidents_per_service": by_name
    }))))
}

/// Incident count per service and status
///
/// @route GET /api/incidents_by_service_and_status
#[utoipa::path(
    get,
    path = "/api/incidents_by_service_and_status",
    responses(
        (status = 200, description = "Incident count grouped by service and status", body = serde_json::Value,
            example = json!({"success": true, "data": {"incidents_by_service_and_status": [
                {"service": "API", "status": "resolved", "count": 2}
            ]}}))
    ),
    tag = "reports"
)]
pub async fn incidents_by_service_and_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let rows = reports::incidents_by_service_and_status(state.pool()).await?;
    Ok(Json(SuccessResponse::new(json!({
        "incidents_by_service_and_status": rows
    }))))
}

/// Linked service count per team
///
/// @route GET /api/teams_and_services
#[utoipa::path(
    get,
    path = "/api/teams_and_services",
    responses(
        (status = 200, description = "Service count per team", body = serde_json::Value,
            example = json!({"success": true, "data": {"teams_and_services": [
                {"team": "Ops", "services_count": 2}
            ]}}))
    ),
    tag = "reports"
)]
pub async fn teams_and_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let rows = reports::teams_and_services(state.pool()).await?;
    Ok(Json(SuccessResponse::new(json!({
        "teams_and_services": rows
    }))))
}

/// Service with the highest incident count
///
/// @route GET /api/service_with_most_incidents
/// @output `service_with_most_incidents` is null and `incident_count` 0 when
/// no incident is linked to a service
#[utoipa::path(
    get,
    path = "/api/service_with_most_incidents",
    responses(
        (status = 200, description = "Top service by incident count", body = serde_json::Value,
            example = json!({"success": true, "data": {"service_with_most_incidents": "API", "incident_count": 3}}))
    ),
    tag = "reports"
)]
pub async fn service_with_most_incidents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let top = reports::service_with_most_incidents(state.pool()).await?;
    let (service, count) = match top {
        Some(t) => (Some(t.service), t.count),
        None => (None, 0),
    };

    Ok(Json(SuccessResponse::new(json!({
        "service_with_most_incidents": service,
        "incident_count": count
    }))))
}

/// @route GET /api/escalation_policies
#[utoipa::path(
    get,
    path = "/api/escalation_policies",
    responses(
        (status = 200, description = "All escalation policies", body = serde_json::Value,
            example = json!({"success": true, "data": {"escalation_policies": [
                {"id": "PEP1", "name": "Default", "description": null}
            ]}}))
    ),
    tag = "reports"
)]
pub async fn escalation_policies(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>, IncsrvError> {
    let rows = reports::list_escalation_policies(state.pool()).await?;
    Ok(Json(SuccessResponse::new(json!({
        "escalation_policies": rows
    }))))
}

/// @route GET /api/services
#[utoipa::path(
    get,
    path = "/api/services",
    responses(
        (status = 200, description = "All services", body = Vec<reports::ServiceSummary>)
    ),
    tag = "reports"
)]
pub async fn list_services(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<Vec<reports::ServiceSummary>>>, IncsrvError> {
    let rows = reports::list_services(state.pool()).await?;
    Ok(Json(SuccessResponse::new(rows)))
}

/// @route GET /api/incidents
#[utoipa::path(
    get,
    path = "/api/incidents",
    responses(
        (status = 200, description = "All incidents", body = Vec<reports::IncidentSummary>)
    ),
    tag = "reports"
)]
pub async fn list_incidents(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<Vec<reports::IncidentSummary>>>, IncsrvError> {
    let rows = reports::list_incidents(state.pool()).await?;
    Ok(Json(SuccessResponse::new(rows)))
}

/// @route GET /api/teams
#[utoipa::path(
    get,
    path = "/api/teams",
    responses(
        (status = 200, description = "All teams", body = Vec<reports::TeamSummary>)
    ),
    tag = "reports"
)]
pub async fn list_teams(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<Vec<reports::TeamSummary>>>, IncsrvError> {
    let rows = reports::list_teams(state.pool()).await?;
    Ok(Json(SuccessResponse::new(rows)))
}

/// Incidents per service as a CSV attachment
///
/// @route GET /api/generate_report
/// @output text/csv, `attachment; filename=report.csv`
#[utoipa::path(
    get,
    path = "/api/generate_report",
    responses(
        (status = 200, description = "CSV report of incidents per service", body = String,
            content_type = "text/csv")
    ),
    tag = "reports"
)]
pub async fn generate_report(
    State(state): State<Arc<AppState>>,
) -> Result<Response, IncsrvError> {
    let rows = reports::incidents_per_service(state.pool()).await?;
    let body = csv_report::render(&rows)?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", csv_report::REPORT_FILENAME),
            ),
        ],
        body,
    )
        .into_response())
}

/// Incidents per service as a PNG bar chart
///
/// @route GET /api/incidents_graph
/// @output image/png, 1000x500
#[utoipa::path(
    get,
    path = "/api/incidents_graph",
    responses(
        (status = 200, description = "Bar chart of incidents per service", body = Vec<u8>,
            content_type = "image/png")
    ),
    tag = "reports"
)]
pub async fn incidents_graph(State(state): State<Arc<AppState>>) -> Result<Response, IncsrvError> {
    let rows = reports::incidents_per_service(state.pool()).await?;

    // Encoding is CPU-bound
    let png = tokio::task::spawn_blocking(move || chart::render_png(&rows))
        .await
        .map_err(|e| IncsrvError::InternalError(format!("chart task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}
