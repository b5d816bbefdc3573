//! HTTP surface tests: routes driven with `oneshot` over a synced database
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

mod fixtures;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use fixtures::TestEnv;
use http_body_util::BodyExt;
use incsrv::app_state::AppState;
use incsrv::config::IncsrvConfig;
use incsrv::routes::create_routes;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn mount_dataset(env: &TestEnv) {
    env.mount(
        "services",
        json!({"services": [
            {"id": "PSVC1", "name": "API", "teams": [{"id": "PT1", "summary": "Ops"}]},
            {"id": "PSVC2", "name": "Billing", "teams": [{"id": "PT1", "summary": "Ops"}]},
            {"id": "PSVC3", "name": "Search", "teams": []}
        ]}),
    )
    .await;
    env.mount(
        "incidents",
        json!({"incidents": [
            {"id": "Q1", "incident_number": 1, "title": "a", "status": "resolved", "service": {"id": "PSVC1"}},
            {"id": "Q2", "incident_number": 2, "title": "b", "status": "triggered", "service": {"id": "PSVC1"}},
            {"id": "Q3", "incident_number": 3, "title": "c", "status": "resolved", "service": {"id": "PSVC1"}},
            {"id": "Q4", "incident_number": 4, "title": "d", "status": "resolved", "service": {"id": "PSVC2"}}
        ]}),
    )
    .await;
    env.mount(
        "teams",
        json!({"teams": [
            {"id": "PT1", "name": "Ops"},
            {"id": "PT2", "name": "Idle"}
        ]}),
    )
    .await;
    env.mount(
        "escalation_policies",
        json!({"escalation_policies": [
            {"id": "PEP1", "name": "Default", "summary": "Default", "description": "Page the on-call"}
        ]}),
    )
    .await;
}

fn app_for(env: &TestEnv) -> (Router, Arc<AppState>) {
    let mut config = IncsrvConfig::default();
    config.remote = env.remote_config();
    let state = Arc::new(AppState::new(
        Arc::new(config),
        Arc::clone(&env.sqlite_client),
        env.synchronizer(),
    ));
    (create_routes(Arc::clone(&state)), state)
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>, Option<String>) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string());
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, body, content_type)
}

async fn get_json(app: &Router, uri: &str) -> Value {
    let (status, body, _) = send(app, "GET", uri).await;
    assert_eq!(status, StatusCode::OK, "GET {}", uri);
    let value: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["success"], true);
    value["data"].clone()
}

#[tokio::test]
async fn test_fetch_data_then_aggregates() {
    let env = TestEnv::new().await;
    mount_dataset(&env).await;
    let (app, _state) = app_for(&env);

    let (status, body, _) = send(&app, "POST", "/api/fetch_data").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        body["data"]["message"],
        "Data fetched and stored successfully"
    );
    assert_eq!(body["data"]["report"]["entities"].as_array().unwrap().len(), 4);

    let data = get_json(&app, "/api/number_of_services").await;
    assert_eq!(data, json!({"number_of_services": 3}));

    let data = get_json(&app, "/api/incidents_per_service").await;
    assert_eq!(
        data,
        json!({"incidents_per_service": {"API": 3, "Billing": 1}})
    );

    let data = get_json(&app, "/api/incidents_by_service_and_status").await;
    assert_eq!(
        data,
        json!({"incidents_by_service_and_status": [
            {"service": "API", "status": "resolved", "count": 2},
            {"service": "API", "status": "triggered", "count": 1},
            {"service": "Billing", "status": "resolved", "count": 1}
        ]})
    );

    let data = get_json(&app, "/api/teams_and_services").await;
    assert_eq!(
        data,
        json!({"teams_and_services": [{"team": "Ops", "services_count": 2}]})
    );

    let data = get_json(&app, "/api/service_with_most_incidents").await;
    assert_eq!(
        data,
        json!({"service_with_most_incidents": "API", "incident_count": 3})
    );

    let data = get_json(&app, "/api/escalation_policies").await;
    assert_eq!(
        data,
        json!({"escalation_policies": [
            {"id": "PEP1", "name": "Default", "description": "Page the on-call"}
        ]})
    );
}

#[tokio::test]
async fn test_listings() {
    let env = TestEnv::new().await;
    mount_dataset(&env).await;
    let (app, state) = app_for(&env);
    state.run_sync().await;

    let services = get_json(&app, "/api/services").await;
    assert_eq!(
        services,
        json!([
            {"id": "PSVC1", "name": "API"},
            {"id": "PSVC2", "name": "Billing"},
            {"id": "PSVC3", "name": "Search"}
        ])
    );

    let incidents = get_json(&app, "/api/incidents").await;
    assert_eq!(incidents.as_array().unwrap().len(), 4);
    assert_eq!(
        incidents[3],
        json!({"id": "Q4", "status": "resolved", "service_id": "PSVC2"})
    );

    let teams = get_json(&app, "/api/teams").await;
    assert_eq!(
        teams,
        json!([{"id": "PT1", "name": "Ops"}, {"id": "PT2", "name": "Idle"}])
    );
}

#[tokio::test]
async fn test_empty_database_answers() {
    let env = TestEnv::new().await;
    let (app, _state) = app_for(&env);

    let data = get_json(&app, "/api/number_of_services").await;
    assert_eq!(data["number_of_services"], 0);

    let data = get_json(&app, "/api/incidents_per_service").await;
    assert_eq!(data, json!({"incidents_per_service": {}}));

    let data = get_json(&app, "/api/service_with_most_incidents").await;
    assert_eq!(
        data,
        json!({"service_with_most_incidents": null, "incident_count": 0})
    );

    let data = get_json(&app, "/api/sync/status").await;
    assert_eq!(data, Value::Null);
}

#[tokio::test]
async fn test_generate_report_csv() {
    let env = TestEnv::new().await;
    mount_dataset(&env).await;
    let (app, state) = app_for(&env);
    state.run_sync().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/generate_report")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/csv"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=report.csv"
    );

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        "Service,Number of Incidents\nAPI,3\nBilling,1\n"
    );
}

#[tokio::test]
async fn test_incidents_graph_png() {
    let env = TestEnv::new().await;
    mount_dataset(&env).await;
    let (app, state) = app_for(&env);
    state.run_sync().await;

    let (status, body, content_type) = send(&app, "GET", "/api/incidents_graph").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type.as_deref(), Some("image/png"));
    let image = image::load_from_memory_with_format(&body, image::ImageFormat::Png).unwrap();
    assert_eq!(image.width(), 1000);
    assert_eq!(image.height(), 500);

    // Same counts under different service names draw different labels
    env.server.reset().await;
    env.mount(
        "services",
        json!({"services": [
            {"id": "PSVC1", "name": "Gateway", "teams": []},
            {"id": "PSVC2", "name": "Payments", "teams": []},
            {"id": "PSVC3", "name": "Search", "teams": []}
        ]}),
    )
    .await;
    state.run_sync().await;

    let (status, renamed, _) = send(&app, "GET", "/api/incidents_graph").await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(body, renamed);
}

#[tokio::test]
async fn test_sync_status_and_health_after_failed_pass() {
    let env = TestEnv::new().await;
    // Nothing mounted: every fetch gets a 404
    let (app, _state) = app_for(&env);

    let data = get_json(&app, "/health").await;
    assert_eq!(data["status"], "healthy");
    assert_eq!(data["service"], "incsrv");
    assert_eq!(data["checks"]["database"]["status"], "healthy");

    let (status, _, _) = send(&app, "POST", "/api/fetch_data").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body, _) = send(&app, "GET", "/api/sync/status").await;
    assert_eq!(status, StatusCode::OK);
    let body: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["metadata"]["complete"], false);
    for entity in body["data"]["entities"].as_array().unwrap() {
        assert_eq!(entity["status"], "fetch_failed");
    }

    let data = get_json(&app, "/health").await;
    assert_eq!(data["status"], "degraded");
    assert_eq!(data["checks"]["sync"]["status"], "degraded");
}

#[tokio::test]
async fn test_admin_log_level_rejects_empty() {
    let env = TestEnv::new().await;
    let (app, _state) = app_for(&env);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/admin/logs/level")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"level": ""}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let env = TestEnv::new().await;
    let (app, _state) = app_for(&env);

    let (status, _, _) = send(&app, "GET", "/api/does_not_exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
