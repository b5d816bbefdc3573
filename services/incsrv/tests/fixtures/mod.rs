//! Shared fixtures for incsrv integration tests
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
#![allow(dead_code)]

use std::sync::Arc;

use common::sqlite::{SqliteClient, SqlitePool};
use incsrv::config::RemoteConfig;
use incsrv::remote_client::RemoteClient;
use incsrv::schema;
use incsrv::sync::{SyncStore, Synchronizer};
use serde_json::Value;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TEST_API_KEY: &str = "test-key";

/// Temporary database plus a mock remote API
pub struct TestEnv {
    _dir: TempDir,
    pub sqlite_client: Arc<SqliteClient>,
    pub server: MockServer,
}

impl TestEnv {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("incsrv.db");
        let sqlite_client = SqliteClient::with_max_connections(&db_path, 4)
            .await
            .unwrap();
        schema::init_schema(sqlite_client.pool()).await.unwrap();

        Self {
            _dir: dir,
            sqlite_client: Arc::new(sqlite_client),
            server: MockServer::start().await,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.sqlite_client.pool()
    }

    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            base_url: self.server.uri(),
            api_key: TEST_API_KEY.to_string(),
            api_version: 2,
            timeout_secs: Some(5),
        }
    }

    pub fn synchronizer(&self) -> Arc<Synchronizer> {
        let client = RemoteClient::new(&self.remote_config()).unwrap();
        let store = SyncStore::new(self.pool().clone());
        Arc::new(Synchronizer::new(Arc::new(client), store))
    }

    /// Serve `body` for `GET /<resource>`
    pub async fn mount(&self, resource: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", resource)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_status(&self, resource: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(format!("/{}", resource)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    pub async fn count(&self, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(self.pool()).await.unwrap()
    }
}
