//! Synchronization orchestrator
//!
//! Runs the four fetch-then-reconcile pipelines as independent tasks and
//! joins them into one [`SyncReport`]. Fetches overlap; transactions are
//! serialized by the store's write gate. Only one pass runs at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::reconcile::{
    reconcile, EntityKind, EntityReport, EntityStatus, EscalationPolicyReconciler,
    IncidentReconciler, ServiceReconciler, TeamReconciler,
};
use crate::remote_client::Fetcher;

/// Datastore handle passed to every reconciler of a pass
#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
    write_gate: Arc<Mutex<()>>,
}

impl SyncStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// SQLite allows a single writer; reconcilers hold this around their
    /// transaction
    pub fn write_gate(&self) -> &Mutex<()> {
        &self.write_gate
    }
}

/// Aggregated outcome of one sync pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One entry per entity kind, in kind order
    pub entities: Vec<EntityReport>,
}

impl SyncReport {
    /// True only when every entity kind synced
    pub fn is_complete(&self) -> bool {
        self.entities.len() == EntityKind::ALL.len()
            && self
                .entities
                .iter()
                .all(|e| e.status == EntityStatus::Synced)
    }

    pub fn entity(&self, kind: EntityKind) -> Option<&EntityReport> {
        self.entities.iter().find(|e| e.kind == kind)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

pub struct Synchronizer {
    fetcher: Arc<dyn Fetcher>,
    store: SyncStore,
    pass_lock: Mutex<()>,
}

impl Synchronizer {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: SyncStore) -> Self {
        Self {
            fetcher,
            store,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &SyncStore {
        &self.store
    }

    /// Run one full pass and wait for every pipeline to finish
    ///
    /// A call made while another pass is running waits for it, then runs
    /// its own pass.
    pub async fn run_sync(&self) -> SyncReport {
        let _pass = self.pass_lock.lock().await;

        let id = Uuid::new_v4();
        let started_at = Utc::now();
        info!("Sync pass {} started", id);

        let mut tasks = JoinSet::new();
        for kind in EntityKind::ALL {
            tasks.spawn(run_pipeline(
                kind,
                Arc::clone(&self.fetcher),
                self.store.clone(),
            ));
        }

        let mut entities = Vec::with_capacity(EntityKind::ALL.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => entities.push(report),
                Err(e) => error!("Sync pipeline task failed: {}", e),
            }
        }

        for kind in EntityKind::ALL {
            if !entities.iter().any(|r| r.kind == kind) {
                entities.push(EntityReport::failed(kind, "pipeline task did not complete"));
            }
        }
        entities.sort_by_key(|r| r.kind);

        let report = SyncReport {
            id,
            started_at,
            finished_at: Utc::now(),
            entities,
        };

        if report.is_complete() {
            info!("Sync pass {} complete in {} ms", id, report.duration_ms());
        } else {
            let incomplete: Vec<String> = report
                .entities
                .iter()
                .filter(|e| e.status != EntityStatus::Synced)
                .map(|e| format!("{}={:?}", e.kind, e.status))
                .collect();
            warn!(
                "Sync pass {} finished in {} ms with gaps: {}",
                id,
                report.duration_ms(),
                incomplete.join(", ")
            );
        }

        report
    }
}

async fn run_pipeline(kind: EntityKind, fetcher: Arc<dyn Fetcher>, store: SyncStore) -> EntityReport {
    let payload = match fetcher.fetch(kind).await {
        Ok(payload) => payload,
        Err(e) => return EntityReport::fetch_failed(kind, e.to_string()),
    };

    match kind {
        EntityKind::Service => reconcile(&ServiceReconciler, &store, &payload).await,
        EntityKind::Incident => reconcile(&IncidentReconciler, &store, &payload).await,
        EntityKind::Team => reconcile(&TeamReconciler, &store, &payload).await,
        EntityKind::EscalationPolicy => {
            reconcile(&EscalationPolicyReconciler, &store, &payload).await
        },
    }
}
