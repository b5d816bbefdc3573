//! End-to-end sync passes against a mock remote API and a real SQLite file
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod fixtures;

use fixtures::{TestEnv, TEST_API_KEY};
use incsrv::reconcile::{EntityKind, EntityStatus};
use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn services_payload() -> Value {
    json!({
        "services": [
            {
                "id": "PSVC1",
                "name": "API",
                "description": "Public API",
                "status": "active",
                "html_url": "https://example.pagerduty.com/services/PSVC1",
                "created_at": "2024-01-10T08:00:00Z",
                "updated_at": "2024-01-12T09:30:00+0000",
                "teams": [
                    {"id": "PT1", "type": "team_reference", "summary": "Ops"}
                ]
            },
            {
                "id": "PSVC2",
                "name": "Billing",
                "teams": []
            }
        ]
    })
}

fn incidents_payload() -> Value {
    json!({
        "incidents": [
            {
                "id": "Q1",
                "incident_number": 1,
                "incident_key": "key-1",
                "title": "API latency",
                "status": "triggered",
                "created_at": "2024-01-15T10:00:00Z",
                "service": {"id": "PSVC1", "type": "service_reference", "summary": "API"}
            }
        ]
    })
}

async fn mount_all(env: &TestEnv) {
    env.mount("services", services_payload()).await;
    env.mount("incidents", incidents_payload()).await;
    env.mount("teams", json!({"teams": []})).await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;
}

#[tokio::test]
async fn test_full_pass_stores_all_entities() {
    let env = TestEnv::new().await;
    mount_all(&env).await;

    let report = env.synchronizer().run_sync().await;

    assert!(report.is_complete(), "report: {:?}", report);
    assert_eq!(report.entities.len(), 4);
    assert_eq!(report.entity(EntityKind::Service).unwrap().records, 2);
    assert_eq!(report.entity(EntityKind::Incident).unwrap().records, 1);
    assert_eq!(report.entity(EntityKind::Team).unwrap().records, 0);

    assert_eq!(env.count("SELECT COUNT(*) FROM services").await, 2);
    assert_eq!(env.count("SELECT COUNT(*) FROM incidents").await, 1);

    let service_id: Option<String> =
        sqlx::query_scalar("SELECT service_id FROM incidents WHERE id = 'key-1'")
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(service_id.as_deref(), Some("PSVC1"));

    // Team referenced by a service gets a placeholder row
    let team_name: String = sqlx::query_scalar("SELECT name FROM teams WHERE id = 'PT1'")
        .fetch_one(env.pool())
        .await
        .unwrap();
    assert_eq!(team_name, "Ops");

    let updated_at: String =
        sqlx::query_scalar("SELECT updated_at FROM services WHERE id = 'PSVC1'")
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(updated_at, "2024-01-12T09:30:00Z");
}

#[tokio::test]
async fn test_services_without_teams_store_no_teams() {
    let env = TestEnv::new().await;
    env.mount(
        "services",
        json!({"services": [
            {"id": "PSVC1", "name": "API", "teams": []},
            {"id": "PSVC2", "name": "Billing", "teams": []}
        ]}),
    )
    .await;
    env.mount("incidents", incidents_payload()).await;
    env.mount("teams", json!({"teams": []})).await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;

    let report = env.synchronizer().run_sync().await;

    assert!(report.is_complete(), "report: {:?}", report);
    assert_eq!(env.count("SELECT COUNT(*) FROM services").await, 2);
    assert_eq!(env.count("SELECT COUNT(*) FROM incidents").await, 1);
    assert_eq!(env.count("SELECT COUNT(*) FROM teams").await, 0);
    assert_eq!(env.count("SELECT COUNT(*) FROM service_team").await, 0);
}

#[tokio::test]
async fn test_repeated_pass_is_idempotent() {
    let env = TestEnv::new().await;
    mount_all(&env).await;
    let synchronizer = env.synchronizer();

    let first = synchronizer.run_sync().await;
    let second = synchronizer.run_sync().await;

    assert!(first.is_complete());
    assert!(second.is_complete());
    assert_ne!(first.id, second.id);
    assert_eq!(
        second.entity(EntityKind::Incident).unwrap().identity_conflicts,
        0
    );

    assert_eq!(env.count("SELECT COUNT(*) FROM services").await, 2);
    assert_eq!(env.count("SELECT COUNT(*) FROM incidents").await, 1);
    assert_eq!(env.count("SELECT COUNT(*) FROM service_team").await, 1);
    assert_eq!(env.count("SELECT COUNT(*) FROM teams").await, 1);
}

#[tokio::test]
async fn test_requests_carry_auth_and_version_headers() {
    let env = TestEnv::new().await;
    for resource in ["services", "incidents", "teams", "escalation_policies"] {
        let mut body = serde_json::Map::new();
        body.insert(resource.to_string(), json!([]));
        Mock::given(method("GET"))
            .and(path(format!("/{}", resource)))
            .and(header(
                "Authorization",
                format!("Token token={}", TEST_API_KEY).as_str(),
            ))
            .and(header("Accept", "application/vnd.pagerduty+json;version=2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Value::Object(body)))
            .expect(1)
            .mount(&env.server)
            .await;
    }

    let report = env.synchronizer().run_sync().await;

    assert!(report.is_complete(), "report: {:?}", report);
}

#[tokio::test]
async fn test_fetch_failure_is_isolated() {
    let env = TestEnv::new().await;
    env.mount("services", services_payload()).await;
    env.mount_status("incidents", 500).await;
    env.mount("teams", json!({"teams": [{"id": "PT9", "name": "Platform"}]}))
        .await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;

    let report = env.synchronizer().run_sync().await;

    assert!(!report.is_complete());
    let incidents = report.entity(EntityKind::Incident).unwrap();
    assert_eq!(incidents.status, EntityStatus::FetchFailed);
    assert!(incidents.reason.as_deref().unwrap().contains("500"));

    assert_eq!(
        report.entity(EntityKind::Service).unwrap().status,
        EntityStatus::Synced
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM services").await, 2);
    assert_eq!(env.count("SELECT COUNT(*) FROM incidents").await, 0);
    assert_eq!(
        env.count("SELECT COUNT(*) FROM teams WHERE id = 'PT9'").await,
        1
    );
}

#[tokio::test]
async fn test_empty_and_keyless_payloads_are_skipped() {
    let env = TestEnv::new().await;
    env.mount("services", json!({"services": []})).await;
    env.mount("incidents", Value::Null).await;
    env.mount("teams", json!({"more": false})).await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;

    let report = env.synchronizer().run_sync().await;

    let incidents = report.entity(EntityKind::Incident).unwrap();
    assert_eq!(incidents.status, EntityStatus::Skipped);
    assert_eq!(incidents.reason.as_deref(), Some("empty payload"));

    let teams = report.entity(EntityKind::Team).unwrap();
    assert_eq!(teams.status, EntityStatus::Skipped);
    assert_eq!(teams.reason.as_deref(), Some("missing collection key"));

    let services = report.entity(EntityKind::Service).unwrap();
    assert_eq!(services.status, EntityStatus::Synced);
    assert_eq!(services.records, 0);
}

#[tokio::test]
async fn test_invalid_records_are_counted_not_fatal() {
    let env = TestEnv::new().await;
    env.mount(
        "services",
        json!({"services": [
            {"id": "PSVC1", "name": "API"},
            {"id": "PSVC2"},
            {"id": "", "name": "Blank"}
        ]}),
    )
    .await;
    env.mount(
        "incidents",
        json!({"incidents": [
            {"id": "Q1", "incident_number": 1, "title": "ok", "status": "resolved"},
            {"id": "Q2", "title": "no number", "status": "resolved"}
        ]}),
    )
    .await;
    env.mount("teams", json!({"teams": []})).await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;

    let report = env.synchronizer().run_sync().await;

    let services = report.entity(EntityKind::Service).unwrap();
    assert_eq!(services.status, EntityStatus::Synced);
    assert_eq!(services.records, 1);
    assert_eq!(services.skipped, 2);

    let incidents = report.entity(EntityKind::Incident).unwrap();
    assert_eq!(incidents.records, 1);
    assert_eq!(incidents.skipped, 1);

    // Without an incident key the vendor id is the identity
    assert_eq!(
        env.count("SELECT COUNT(*) FROM incidents WHERE id = 'Q1'").await,
        1
    );
}

#[tokio::test]
async fn test_commit_failure_rolls_back_only_that_kind() {
    let env = TestEnv::new().await;
    sqlx::query(
        "CREATE TRIGGER reject_teams BEFORE INSERT ON teams BEGIN SELECT RAISE(ABORT, 'boom'); END",
    )
    .execute(env.pool())
    .await
    .unwrap();

    env.mount(
        "services",
        json!({"services": [{"id": "PSVC1", "name": "API", "teams": []}]}),
    )
    .await;
    env.mount("incidents", json!({"incidents": []})).await;
    env.mount(
        "teams",
        json!({"teams": [
            {"id": "PT1", "name": "Ops"},
            {"id": "PT2", "name": "Platform"}
        ]}),
    )
    .await;
    env.mount("escalation_policies", json!({"escalation_policies": []}))
        .await;

    let report = env.synchronizer().run_sync().await;

    let teams = report.entity(EntityKind::Team).unwrap();
    assert_eq!(teams.status, EntityStatus::CommitFailed);
    assert_eq!(teams.records, 0);
    assert!(teams.reason.as_deref().unwrap().contains("boom"));

    assert_eq!(
        report.entity(EntityKind::Service).unwrap().status,
        EntityStatus::Synced
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM teams").await, 0);
    assert_eq!(env.count("SELECT COUNT(*) FROM services").await, 1);
}

#[tokio::test]
async fn test_team_edges_are_replaced() {
    let env = TestEnv::new().await;
    let synchronizer = env.synchronizer();
    env.mount(
        "services",
        json!({"services": [{"id": "PSVC1", "name": "API", "teams": [
            {"id": "PT1", "summary": "Ops"},
            {"id": "PT2", "summary": "Platform"}
        ]}]}),
    )
    .await;
    synchronizer.run_sync().await;
    assert_eq!(
        env.count("SELECT COUNT(*) FROM service_team WHERE service_id = 'PSVC1'")
            .await,
        2
    );

    env.server.reset().await;
    env.mount(
        "services",
        json!({"services": [{"id": "PSVC1", "name": "API", "teams": [
            {"id": "PT2", "summary": "Platform"}
        ]}]}),
    )
    .await;
    synchronizer.run_sync().await;

    let teams: Vec<String> =
        sqlx::query_scalar("SELECT team_id FROM service_team WHERE service_id = 'PSVC1'")
            .fetch_all(env.pool())
            .await
            .unwrap();
    assert_eq!(teams, vec!["PT2".to_string()]);
    // The team row itself is kept
    assert_eq!(env.count("SELECT COUNT(*) FROM teams").await, 2);
}

#[tokio::test]
async fn test_dangling_service_reference_is_linked_later() {
    let env = TestEnv::new().await;
    let synchronizer = env.synchronizer();
    env.mount("services", json!({"services": []})).await;
    env.mount("incidents", incidents_payload()).await;

    synchronizer.run_sync().await;

    let (service_id, service_ref): (Option<String>, Option<String>) =
        sqlx::query_as("SELECT service_id, service_ref FROM incidents WHERE id = 'key-1'")
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(service_id, None);
    assert_eq!(service_ref.as_deref(), Some("PSVC1"));

    env.server.reset().await;
    env.mount("services", services_payload()).await;
    synchronizer.run_sync().await;

    let service_id: Option<String> =
        sqlx::query_scalar("SELECT service_id FROM incidents WHERE id = 'key-1'")
            .fetch_one(env.pool())
            .await
            .unwrap();
    assert_eq!(service_id.as_deref(), Some("PSVC1"));
}

#[tokio::test]
async fn test_incident_number_keeps_stored_identity() {
    let env = TestEnv::new().await;
    let synchronizer = env.synchronizer();
    env.mount(
        "incidents",
        json!({"incidents": [
            {"id": "Q1", "incident_number": 7, "incident_key": "first", "title": "Disk full", "status": "triggered"}
        ]}),
    )
    .await;
    synchronizer.run_sync().await;

    env.server.reset().await;
    env.mount(
        "incidents",
        json!({"incidents": [
            {"id": "Q1", "incident_number": 7, "incident_key": "second", "title": "Disk full", "status": "resolved"}
        ]}),
    )
    .await;
    let report = synchronizer.run_sync().await;

    let incidents = report.entity(EntityKind::Incident).unwrap();
    assert_eq!(incidents.status, EntityStatus::Synced);
    assert_eq!(incidents.identity_conflicts, 1);

    let rows: Vec<(String, String, Option<String>)> =
        sqlx::query_as("SELECT id, status, incident_key FROM incidents")
            .fetch_all(env.pool())
            .await
            .unwrap();
    assert_eq!(
        rows,
        vec![(
            "first".to_string(),
            "resolved".to_string(),
            Some("second".to_string())
        )]
    );
}

#[tokio::test]
async fn test_reused_incident_key_keeps_both_incidents() {
    let env = TestEnv::new().await;
    let synchronizer = env.synchronizer();
    env.mount(
        "incidents",
        json!({"incidents": [
            {"id": "Q1", "incident_number": 1, "incident_key": "disk-full", "title": "first", "status": "resolved"},
            {"id": "Q2", "incident_number": 2, "incident_key": "disk-full", "title": "second", "status": "triggered"}
        ]}),
    )
    .await;

    let report = synchronizer.run_sync().await;
    let incidents = report.entity(EntityKind::Incident).unwrap();
    assert_eq!(incidents.status, EntityStatus::Synced);
    assert_eq!(incidents.records, 2);
    assert_eq!(incidents.identity_conflicts, 1);

    let expected = vec![
        ("Q2".to_string(), 2, "second".to_string()),
        ("disk-full".to_string(), 1, "first".to_string()),
    ];
    let rows: Vec<(String, i64, String)> =
        sqlx::query_as("SELECT id, incident_number, title FROM incidents ORDER BY id")
            .fetch_all(env.pool())
            .await
            .unwrap();
    assert_eq!(rows, expected);

    // A second pass settles on the same rows
    synchronizer.run_sync().await;
    let rows: Vec<(String, i64, String)> =
        sqlx::query_as("SELECT id, incident_number, title FROM incidents ORDER BY id")
            .fetch_all(env.pool())
            .await
            .unwrap();
    assert_eq!(rows, expected);
}

#[tokio::test]
async fn test_escalation_policy_rules_and_targets() {
    let env = TestEnv::new().await;
    let synchronizer = env.synchronizer();
    env.mount("services", services_payload()).await;
    env.mount(
        "escalation_policies",
        json!({"escalation_policies": [{
            "id": "PEP1",
            "name": "Default",
            "summary": "Default",
            "num_loops": 2,
            "on_call_handoff_notifications": "if_has_services",
            "services": [{"id": "PSVC1", "type": "service_reference"}],
            "teams": [{"id": "PT1", "type": "team_reference", "summary": "Ops"}],
            "escalation_rules": [
                {
                    "id": "R1",
                    "escalation_delay_in_minutes": 30,
                    "targets": [
                        {"id": "PU1", "type": "user_reference", "summary": "Ada"},
                        {"id": "PS1", "type": "schedule_reference", "summary": "Primary"}
                    ]
                },
                {
                    "id": "R2",
                    "escalation_delay_in_minutes": 60,
                    "targets": [{"id": "PU1", "type": "user_reference", "summary": "Ada"}]
                }
            ]
        }]}),
    )
    .await;

    // Service edges need the services stored, which the first pass does
    synchronizer.run_sync().await;
    let report = synchronizer.run_sync().await;

    assert_eq!(
        report.entity(EntityKind::EscalationPolicy).unwrap().status,
        EntityStatus::Synced
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM escalation_policies").await, 1);
    assert_eq!(
        env.count("SELECT COUNT(*) FROM escalation_rules WHERE escalation_policy_id = 'PEP1'")
            .await,
        2
    );
    // One user may be a target of several rules
    assert_eq!(
        env.count("SELECT COUNT(*) FROM targets WHERE id = 'PU1'").await,
        2
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM targets").await, 3);
    // Recipients are not synced, so the links stay empty
    assert_eq!(
        env.count("SELECT COUNT(*) FROM targets WHERE user_id IS NOT NULL OR schedule_id IS NOT NULL")
            .await,
        0
    );
    assert_eq!(
        env.count("SELECT COUNT(*) FROM escalation_policy_service").await,
        1
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM escalation_policy_team").await, 1);

    env.server.reset().await;
    env.mount("services", services_payload()).await;
    env.mount(
        "escalation_policies",
        json!({"escalation_policies": [{
            "id": "PEP1",
            "name": "Default",
            "summary": "Default",
            "escalation_rules": [
                {"id": "R2", "escalation_delay_in_minutes": 15, "targets": []}
            ]
        }]}),
    )
    .await;
    synchronizer.run_sync().await;

    assert_eq!(env.count("SELECT COUNT(*) FROM escalation_rules").await, 1);
    assert_eq!(env.count("SELECT COUNT(*) FROM targets").await, 0);
    assert_eq!(
        env.count("SELECT COUNT(*) FROM escalation_policy_service").await,
        0
    );
    assert_eq!(env.count("SELECT COUNT(*) FROM escalation_policy_team").await, 0);
}
