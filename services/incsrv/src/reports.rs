//! Aggregate read queries over the synchronized tables
//!
//! Incident counts group by service *name*, so two services sharing a name
//! are reported as one. Services without incidents are left out of the
//! per-service counts.

pub mod chart;
pub mod csv_report;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceIncidentCount {
    pub service: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceStatusCount {
    pub service: String,
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TeamServiceCount {
    pub team: String,
    pub services_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct EscalationPolicySummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct ServiceSummary {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct IncidentSummary {
    pub id: String,
    pub status: String,
    pub service_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
}

pub async fn count_services(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM services")
        .fetch_one(pool)
        .await
}

pub async fn incidents_per_service(
    pool: &SqlitePool,
) -> Result<Vec<ServiceIncidentCount>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT s.name AS service, COUNT(i.id) AS count
        FROM services s
        JOIN incidents i ON i.service_id = s.id
        GROUP BY s.name
        ORDER BY s.name
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn incidents_by_service_and_status(
    pool: &SqlitePool,
) -> Result<Vec<ServiceStatusCount>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT s.name AS service, i.status AS status, COUNT(i.id) AS count
        FROM services s
        JOIN incidents i ON i.service_id = s.id
        GROUP BY s.name, i.status
        ORDER BY s.name, i.status
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Number of linked services per team; teams without services are omitted
pub async fn teams_and_services(pool: &SqlitePool) -> Result<Vec<TeamServiceCount>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT t.name AS team, COUNT(st.service_id) AS services_count
        FROM teams t
        JOIN service_team st ON st.team_id = t.id
        GROUP BY t.name
        ORDER BY t.name
        "#,
    )
    .fetch_all(pool)
    .await
}

/// Ties go to the alphabetically first service name
pub async fn service_with_most_incidents(
    pool: &SqlitePool,
) -> Result<Option<ServiceIncidentCount>, sqlx::Error> {
    sqlx::query_as(
        r#"
        SELECT s.name AS service, COUNT(i.id) AS count
        FROM services s
        JOIN incidents i ON i.service_id = s.id
        GROUP BY s.name
        ORDER BY count DESC, s.name
        LIMIT 1
        "#,
    )
    .fetch_optional(pool)
    .await
}

pub async fn list_escalation_policies(
    pool: &SqlitePool,
) -> Result<Vec<EscalationPolicySummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, name, description FROM escalation_policies ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn list_services(pool: &SqlitePool) -> Result<Vec<ServiceSummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, name FROM services ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn list_incidents(pool: &SqlitePool) -> Result<Vec<IncidentSummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, status, service_id FROM incidents ORDER BY incident_number, id")
        .fetch_all(pool)
        .await
}

pub async fn list_teams(pool: &SqlitePool) -> Result<Vec<TeamSummary>, sqlx::Error> {
    sqlx::query_as("SELECT id, name FROM teams ORDER BY id")
        .fetch_all(pool)
        .await
}
