//! API Route Configuration
//!
//! Central route definition for all incsrv endpoints

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

#[cfg(feature = "swagger-ui")]
use utoipa::OpenApi;

use crate::api::admin_handlers::{get_log_level, set_log_level};
use crate::api::health_handlers::health_check;
use crate::api::report_handlers::{
    escalation_policies, generate_report, incidents_by_service_and_status, incidents_graph,
    incidents_per_service, list_incidents, list_services, list_teams, number_of_services,
    service_with_most_incidents, teams_and_services,
};
use crate::api::sync_handlers::{fetch_data, sync_status};
use crate::app_state::AppState;

// OpenAPI documentation - only compiled when swagger-ui feature is enabled
#[cfg(feature = "swagger-ui")]
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::health_handlers::health_check,
        crate::api::sync_handlers::fetch_data,
        crate::api::sync_handlers::sync_status,
        crate::api::report_handlers::number_of_services,
        crate::api::report_handlers::incidents_per_service,
        crate::api::report_handlers::incidents_by_service_and_status,
        crate::api::report_handlers::teams_and_services,
        crate::api::report_handlers::service_with_most_incidents,
        crate::api::report_handlers::escalation_policies,
        crate::api::report_handlers::list_services,
        crate::api::report_handlers::list_incidents,
        crate::api::report_handlers::list_teams,
        crate::api::report_handlers::generate_report,
        crate::api::report_handlers::incidents_graph
    ),
    components(
        schemas(
            crate::reports::ServiceIncidentCount,
            crate::reports::ServiceStatusCount,
            crate::reports::TeamServiceCount,
            crate::reports::EscalationPolicySummary,
            crate::reports::ServiceSummary,
            crate::reports::IncidentSummary,
            crate::reports::TeamSummary,
            common::admin_api::LogLevelResponse,
            common::admin_api::SetLogLevelRequest
        )
    ),
    tags(
        (name = "incsrv", description = "Incident Sync Service API"),
        (name = "sync", description = "Remote data synchronization"),
        (name = "reports", description = "Aggregate reports over synchronized data")
    )
)]
pub struct IncsrvApiDoc;

/// Create all API routes for the incident sync service
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Synchronization
        .route("/api/fetch_data", post(fetch_data))
        .route("/api/sync/status", get(sync_status))
        // Aggregate reports
        .route("/api/number_of_services", get(number_of_services))
        .route("/api/incidents_per_service", get(incidents_per_service))
        .route(
            "/api/incidents_by_service_and_status",
            get(incidents_by_service_and_status),
        )
        .route("/api/teams_and_services", get(teams_and_services))
        .route(
            "/api/service_with_most_incidents",
            get(service_with_most_incidents),
        )
        .route("/api/escalation_policies", get(escalation_policies))
        // Listings
        .route("/api/services", get(list_services))
        .route("/api/incidents", get(list_incidents))
        .route("/api/teams", get(list_teams))
        // Downloads
        .route("/api/generate_report", get(generate_report))
        .route("/api/incidents_graph", get(incidents_graph))
        // Admin
        .route(
            "/api/admin/logs/level",
            get(get_log_level).post(set_log_level),
        )
        // Apply HTTP request logging middleware
        .layer(axum::middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}
