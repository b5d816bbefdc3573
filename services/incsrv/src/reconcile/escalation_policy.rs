use async_trait::async_trait;
use sqlx::SqliteConnection;

use super::team::upsert_team_reference;
use super::{require_id, EntityKind, Reconciler, UpsertOutcome};
use crate::models::{RemoteEscalationPolicy, RemoteReference};

pub struct EscalationPolicyReconciler;

#[async_trait]
impl Reconciler for EscalationPolicyReconciler {
    type Record = RemoteEscalationPolicy;
    type Row = RemoteEscalationPolicy;

    fn kind(&self) -> EntityKind {
        EntityKind::EscalationPolicy
    }

    fn prepare(&self, record: RemoteEscalationPolicy) -> Result<RemoteEscalationPolicy, String> {
        require_id(&record.id)?;
        for rule in &record.escalation_rules {
            require_id(&rule.id).map_err(|e| format!("escalation rule: {}", e))?;
        }
        Ok(record)
    }

    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        policy: &RemoteEscalationPolicy,
    ) -> Result<UpsertOutcome, sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO escalation_policies
                (id, name, summary, description, num_loops, on_call_handoff_notifications)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                summary = excluded.summary,
                description = excluded.description,
                num_loops = excluded.num_loops,
                on_call_handoff_notifications = excluded.on_call_handoff_notifications
            "#,
        )
        .bind(&policy.id)
        .bind(&policy.name)
        .bind(&policy.summary)
        .bind(&policy.description)
        .bind(policy.num_loops)
        .bind(&policy.on_call_handoff_notifications)
        .execute(&mut *conn)
        .await?;

        replace_team_edges(conn, policy).await?;
        replace_service_edges(conn, policy).await?;
        replace_rules(conn, policy).await?;

        Ok(UpsertOutcome::Applied)
    }
}

async fn replace_team_edges(
    conn: &mut SqliteConnection,
    policy: &RemoteEscalationPolicy,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM escalation_policy_team WHERE escalation_policy_id = ?")
        .bind(&policy.id)
        .execute(&mut *conn)
        .await?;

    for team in policy.teams.iter().filter(|t| !t.id.trim().is_empty()) {
        upsert_team_reference(conn, team).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO escalation_policy_team (escalation_policy_id, team_id) VALUES (?, ?)",
        )
        .bind(&policy.id)
        .bind(&team.id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Only services already known locally are linked
async fn replace_service_edges(
    conn: &mut SqliteConnection,
    policy: &RemoteEscalationPolicy,
) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM escalation_policy_service WHERE escalation_policy_id = ?")
        .bind(&policy.id)
        .execute(&mut *conn)
        .await?;

    for service in &policy.services {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO escalation_policy_service (escalation_policy_id, service_id)
            SELECT ?, id FROM services WHERE id = ?
            "#,
        )
        .bind(&policy.id)
        .bind(&service.id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn replace_rules(
    conn: &mut SqliteConnection,
    policy: &RemoteEscalationPolicy,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        DELETE FROM targets WHERE escalation_rule_id IN
            (SELECT id FROM escalation_rules WHERE escalation_policy_id = ?)
        "#,
    )
    .bind(&policy.id)
    .execute(&mut *conn)
    .await?;
    sqlx::query("DELETE FROM escalation_rules WHERE escalation_policy_id = ?")
        .bind(&policy.id)
        .execute(&mut *conn)
        .await?;

    for rule in &policy.escalation_rules {
        sqlx::query(
            r#"
            INSERT INTO escalation_rules (id, escalation_delay_in_minutes, escalation_policy_id)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                escalation_delay_in_minutes = excluded.escalation_delay_in_minutes,
                escalation_policy_id = excluded.escalation_policy_id
            "#,
        )
        .bind(&rule.id)
        .bind(rule.escalation_delay_in_minutes)
        .bind(&policy.id)
        .execute(&mut *conn)
        .await?;

        // A rule moved here from another policy may still own old targets
        sqlx::query("DELETE FROM targets WHERE escalation_rule_id = ?")
            .bind(&rule.id)
            .execute(&mut *conn)
            .await?;

        for target in rule.targets.iter().filter(|t| !t.id.trim().is_empty()) {
            insert_target(conn, &rule.id, target).await?;
        }
    }
    Ok(())
}

async fn insert_target(
    conn: &mut SqliteConnection,
    rule_id: &str,
    target: &RemoteReference,
) -> Result<(), sqlx::Error> {
    let kind = target.kind.as_deref().unwrap_or("unknown");

    let lookup = match kind {
        "user" | "user_reference" => Some("SELECT id FROM users WHERE id = ?"),
        "schedule" | "schedule_reference" => Some("SELECT id FROM schedules WHERE id = ?"),
        _ => None,
    };

    // Recipients are linked only when already stored
    let recipient: Option<String> = match lookup {
        Some(sql) => {
            sqlx::query_scalar(sql)
                .bind(&target.id)
                .fetch_optional(&mut *conn)
                .await?
        },
        None => None,
    };
    let (user_id, schedule_id) = if kind.starts_with("user") {
        (recipient, None)
    } else {
        (None, recipient)
    };

    sqlx::query(
        r#"
        INSERT INTO targets (escalation_rule_id, id, type, summary, html_url, user_id, schedule_id)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(escalation_rule_id, id) DO UPDATE SET
            type = excluded.type,
            summary = excluded.summary,
            html_url = excluded.html_url,
            user_id = excluded.user_id,
            schedule_id = excluded.schedule_id
        "#,
    )
    .bind(rule_id)
    .bind(&target.id)
    .bind(kind)
    .bind(&target.summary)
    .bind(&target.html_url)
    .bind(user_id)
    .bind(schedule_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
