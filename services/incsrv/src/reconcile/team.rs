use async_trait::async_trait;
use sqlx::SqliteConnection;

use super::{require_id, EntityKind, Reconciler, UpsertOutcome};
use crate::models::{RemoteReference, RemoteTeam};

pub struct TeamReconciler;

#[async_trait]
impl Reconciler for TeamReconciler {
    type Record = RemoteTeam;
    type Row = RemoteTeam;

    fn kind(&self) -> EntityKind {
        EntityKind::Team
    }

    fn prepare(&self, record: RemoteTeam) -> Result<RemoteTeam, String> {
        require_id(&record.id)?;
        Ok(record)
    }

    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        team: &RemoteTeam,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO teams (id, name, summary, html_url)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                summary = excluded.summary,
                html_url = excluded.html_url
            "#,
        )
        .bind(&team.id)
        .bind(&team.name)
        .bind(&team.summary)
        .bind(&team.html_url)
        .execute(&mut *conn)
        .await?;

        Ok(UpsertOutcome::Applied)
    }
}

/// Create or refresh a team from a nested reference
///
/// Used when services and escalation policies link teams that may not have
/// been synced yet. Only name and link are written; `summary` is left to the
/// team collection itself.
pub(crate) async fn upsert_team_reference(
    conn: &mut SqliteConnection,
    team: &RemoteReference,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO teams (id, name, html_url)
        VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            html_url = excluded.html_url
        "#,
    )
    .bind(&team.id)
    .bind(team.display_name())
    .bind(&team.html_url)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
