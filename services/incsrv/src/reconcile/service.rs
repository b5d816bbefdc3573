use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::debug;

use super::team::upsert_team_reference;
use super::{require_id, timestamp_text, EntityKind, Reconciler, UpsertOutcome};
use crate::models::RemoteService;

pub struct ServiceReconciler;

#[async_trait]
impl Reconciler for ServiceReconciler {
    type Record = RemoteService;
    type Row = RemoteService;

    fn kind(&self) -> EntityKind {
        EntityKind::Service
    }

    fn prepare(&self, record: RemoteService) -> Result<RemoteService, String> {
        require_id(&record.id)?;
        if let Some(team) = record.teams.iter().find(|t| t.id.trim().is_empty()) {
            return Err(format!("team reference without id ({:?})", team.summary));
        }
        Ok(record)
    }

    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        service: &RemoteService,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO services (id, name, description, status, html_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                description = excluded.description,
                status = excluded.status,
                html_url = excluded.html_url,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&service.id)
        .bind(&service.name)
        .bind(&service.description)
        .bind(&service.status)
        .bind(&service.html_url)
        .bind(timestamp_text(service.created_at.as_deref()))
        .bind(timestamp_text(service.updated_at.as_deref()))
        .execute(&mut *conn)
        .await?;

        // Team edges are replaced wholesale
        sqlx::query("DELETE FROM service_team WHERE service_id = ?")
            .bind(&service.id)
            .execute(&mut *conn)
            .await?;

        for team in &service.teams {
            upsert_team_reference(conn, team).await?;
            sqlx::query("INSERT OR IGNORE INTO service_team (service_id, team_id) VALUES (?, ?)")
                .bind(&service.id)
                .bind(&team.id)
                .execute(&mut *conn)
                .await?;
        }

        // Incidents stored before this service existed
        let relinked = sqlx::query(
            "UPDATE incidents SET service_id = ? WHERE service_ref = ? AND service_id IS NULL",
        )
        .bind(&service.id)
        .bind(&service.id)
        .execute(&mut *conn)
        .await?
        .rows_affected();
        if relinked > 0 {
            debug!("Linked {} incidents to service {}", relinked, service.id);
        }

        Ok(UpsertOutcome::Applied)
    }
}
