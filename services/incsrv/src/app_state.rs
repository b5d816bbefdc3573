//! Application State Management
//!
//! Shared resources for the API handlers and the sync scheduler

use std::sync::Arc;
use std::time::Instant;

use common::sqlite::{SqliteClient, SqlitePool};
use tokio::sync::RwLock;

use crate::config::IncsrvConfig;
use crate::sync::{SyncReport, Synchronizer};

pub struct AppState {
    pub config: Arc<IncsrvConfig>,

    /// SQLite client for the synchronized tables
    pub sqlite_client: Arc<SqliteClient>,

    pub synchronizer: Arc<Synchronizer>,

    /// Report of the most recent pass in this process
    last_sync: RwLock<Option<SyncReport>>,

    started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<IncsrvConfig>,
        sqlite_client: Arc<SqliteClient>,
        synchronizer: Arc<Synchronizer>,
    ) -> Self {
        Self {
            config,
            sqlite_client,
            synchronizer,
            last_sync: RwLock::new(None),
            started_at: Instant::now(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.sqlite_client.pool()
    }

    /// Run a pass and remember its report
    pub async fn run_sync(&self) -> SyncReport {
        let report = self.synchronizer.run_sync().await;
        *self.last_sync.write().await = Some(report.clone());
        report
    }

    pub async fn last_sync(&self) -> Option<SyncReport> {
        self.last_sync.read().await.clone()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
