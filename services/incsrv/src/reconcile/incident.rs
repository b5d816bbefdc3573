use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::warn;

use super::{timestamp_text, EntityKind, Reconciler, UpsertOutcome};
use crate::models::RemoteIncident;

pub struct IncidentReconciler;

/// Incident ready for storage
#[derive(Debug, Clone)]
pub struct IncidentRow {
    /// Local identity: incident key, or the vendor id when no key is set
    pub id: String,
    /// Vendor id, used when the local id is held by another incident
    pub vendor_id: Option<String>,
    pub incident_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub incident_key: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Vendor id of the owning service, linked or not
    pub service_ref: Option<String>,
}

#[async_trait]
impl Reconciler for IncidentReconciler {
    type Record = RemoteIncident;
    type Row = IncidentRow;

    fn kind(&self) -> EntityKind {
        EntityKind::Incident
    }

    fn prepare(&self, record: RemoteIncident) -> Result<IncidentRow, String> {
        let incident_number = record
            .incident_number
            .ok_or_else(|| "missing incident_number".to_string())?;
        let id = record
            .local_id()
            .ok_or_else(|| format!("incident #{} has neither incident_key nor id", incident_number))?
            .to_string();

        Ok(IncidentRow {
            id,
            vendor_id: record.id.clone().filter(|v| !v.trim().is_empty()),
            incident_number,
            created_at: timestamp_text(record.created_at.as_deref()),
            updated_at: timestamp_text(record.updated_at.as_deref()),
            service_ref: record
                .service
                .map(|s| s.id)
                .filter(|id| !id.trim().is_empty()),
            title: record.title,
            description: record.description,
            status: record.status,
            incident_key: record.incident_key,
        })
    }

    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        incident: &IncidentRow,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        // The sequence number is the lookup key; the local id comes from a
        // different field and may disagree with an existing row
        let existing: Option<String> = sqlx::query_scalar(
            "SELECT id FROM incidents WHERE incident_number = ? ORDER BY id LIMIT 1",
        )
        .bind(incident.incident_number)
        .fetch_optional(&mut *conn)
        .await?;

        // Dangling references stay NULL and are refreshed on every pass
        let service_id: Option<String> = match &incident.service_ref {
            Some(service_ref) => {
                sqlx::query_scalar("SELECT id FROM services WHERE id = ?")
                    .bind(service_ref)
                    .fetch_optional(&mut *conn)
                    .await?
            },
            None => None,
        };

        match existing {
            Some(stored_id) if stored_id != incident.id => {
                warn!(
                    "Incident #{} is stored as '{}' but arrived as '{}'; keeping the stored id",
                    incident.incident_number, stored_id, incident.id
                );
                write_row(conn, &stored_id, incident, service_id.as_deref()).await?;
                Ok(UpsertOutcome::IdentityConflict)
            },
            Some(_) => {
                write_row(conn, &incident.id, incident, service_id.as_deref()).await?;
                Ok(UpsertOutcome::Applied)
            },
            None => match stored_number(conn, &incident.id).await? {
                None => {
                    write_row(conn, &incident.id, incident, service_id.as_deref()).await?;
                    Ok(UpsertOutcome::Applied)
                },
                // The id belongs to another incident (incident keys are
                // reused across resolved incidents)
                Some(holder) => {
                    let fallback = fallback_id(conn, incident).await?;
                    warn!(
                        "Incident #{} arrived as '{}', already held by incident #{}; storing it as '{}'",
                        incident.incident_number, incident.id, holder, fallback
                    );
                    write_row(conn, &fallback, incident, service_id.as_deref()).await?;
                    Ok(UpsertOutcome::IdentityConflict)
                },
            },
        }
    }
}

/// Sequence number of the row stored under `id`, if any
async fn stored_number(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<i64>, sqlx::Error> {
    sqlx::query_scalar("SELECT incident_number FROM incidents WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
}

/// Id for an incident whose local id is taken: the vendor id when free,
/// otherwise the local id suffixed with the sequence number
async fn fallback_id(
    conn: &mut SqliteConnection,
    incident: &IncidentRow,
) -> Result<String, sqlx::Error> {
    if let Some(vendor_id) = incident
        .vendor_id
        .as_deref()
        .filter(|v| *v != incident.id)
    {
        if stored_number(conn, vendor_id).await?.is_none() {
            return Ok(vendor_id.to_string());
        }
    }
    Ok(format!("{}#{}", incident.id, incident.incident_number))
}

/// Insert or refresh the row stored under `id`
///
/// The sequence number is only written on insert; an existing row keeps
/// the number it was stored with.
async fn write_row(
    conn: &mut SqliteConnection,
    id: &str,
    incident: &IncidentRow,
    service_id: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO incidents (
            id, incident_number, title, description, status, incident_key,
            created_at, updated_at, service_ref, service_id
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            title = excluded.title,
            description = excluded.description,
            status = excluded.status,
            incident_key = excluded.incident_key,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at,
            service_ref = excluded.service_ref,
            service_id = excluded.service_id
        "#,
    )
    .bind(id)
    .bind(incident.incident_number)
    .bind(&incident.title)
    .bind(&incident.description)
    .bind(&incident.status)
    .bind(&incident.incident_key)
    .bind(&incident.created_at)
    .bind(&incident.updated_at)
    .bind(&incident.service_ref)
    .bind(service_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
