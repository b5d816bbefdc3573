//! Entity reconciliation
//!
//! Merges one fetched collection into the local tables. Every entity kind
//! follows the same shape:
//!
//! 1. Extract the collection array from the payload. A null, non-object or
//!    keyless payload is reported as skipped and no table is touched.
//! 2. Decode and prepare each record. A record that cannot form a row is
//!    logged, counted and left out; the rest of the batch proceeds.
//! 3. Upsert every row inside one transaction, serialized by the store's
//!    write gate, and commit. Any datastore error rolls back the whole batch
//!    for this kind only.

pub mod escalation_policy;
pub mod incident;
pub mod service;
pub mod team;

use std::fmt;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, info, warn};

use crate::models::parse_timestamp;
use crate::sync::SyncStore;

pub use escalation_policy::EscalationPolicyReconciler;
pub use incident::IncidentReconciler;
pub use service::ServiceReconciler;
pub use team::TeamReconciler;

/// The synchronized entity kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Service,
    Incident,
    Team,
    EscalationPolicy,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Service,
        EntityKind::Incident,
        EntityKind::Team,
        EntityKind::EscalationPolicy,
    ];

    /// Remote resource path, also the collection key in its payload
    pub fn resource(self) -> &'static str {
        match self {
            EntityKind::Service => "services",
            EntityKind::Incident => "incidents",
            EntityKind::Team => "teams",
            EntityKind::EscalationPolicy => "escalation_policies",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Payload is null or not a JSON object
    EmptyPayload,
    /// Collection key absent, or not an array
    MissingKey,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyPayload => f.write_str("empty payload"),
            SkipReason::MissingKey => f.write_str("missing collection key"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Synced,
    Skipped,
    FetchFailed,
    CommitFailed,
    /// The pipeline task itself died
    Failed,
}

/// Outcome of one entity kind within a sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReport {
    pub kind: EntityKind,
    pub status: EntityStatus,
    /// Rows submitted for upsert in the committed batch
    ///
    /// Records sharing an identity land on the same stored row, so this can
    /// exceed the number of distinct rows written.
    pub records: usize,
    /// Records dropped because they could not form a row
    pub skipped: usize,
    pub identity_conflicts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EntityReport {
    pub fn synced(kind: EntityKind, records: usize, skipped: usize, conflicts: usize) -> Self {
        Self {
            kind,
            status: EntityStatus::Synced,
            records,
            skipped,
            identity_conflicts: conflicts,
            reason: None,
        }
    }

    pub fn skipped(kind: EntityKind, reason: SkipReason) -> Self {
        Self::failure(kind, EntityStatus::Skipped, reason.to_string())
    }

    pub fn fetch_failed(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::failure(kind, EntityStatus::FetchFailed, reason)
    }

    pub fn commit_failed(kind: EntityKind, skipped: usize, reason: impl Into<String>) -> Self {
        Self {
            skipped,
            ..Self::failure(kind, EntityStatus::CommitFailed, reason)
        }
    }

    pub fn failed(kind: EntityKind, reason: impl Into<String>) -> Self {
        Self::failure(kind, EntityStatus::Failed, reason)
    }

    fn failure(kind: EntityKind, status: EntityStatus, reason: impl Into<String>) -> Self {
        Self {
            kind,
            status,
            records: 0,
            skipped: 0,
            identity_conflicts: 0,
            reason: Some(reason.into()),
        }
    }
}

/// Result of upserting a single row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    /// Row disagreed with a stored row's identity; the stored identity was
    /// kept and the row went to its own id
    IdentityConflict,
}

/// Maps remote records of one kind onto local rows
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Decoded remote record
    type Record: DeserializeOwned + Send;
    /// Validated row, ready for upsert
    type Row: Send + Sync;

    fn kind(&self) -> EntityKind;

    /// Turn a decoded record into a row, or explain why it cannot be stored
    fn prepare(&self, record: Self::Record) -> Result<Self::Row, String>;

    /// Upsert one row and rebuild its relationship edges
    async fn upsert(
        &self,
        conn: &mut SqliteConnection,
        row: &Self::Row,
    ) -> Result<UpsertOutcome, sqlx::Error>;
}

/// Reconcile one fetched payload into the store
///
/// Never fails: every outcome, including datastore errors, is reported in
/// the returned [`EntityReport`].
pub async fn reconcile<R: Reconciler>(
    reconciler: &R,
    store: &SyncStore,
    payload: &Value,
) -> EntityReport {
    let kind = reconciler.kind();

    let items = match extract_collection(kind, payload) {
        Ok(items) => items,
        Err(reason) => {
            info!("Nothing to sync for {}: {}", kind, reason);
            return EntityReport::skipped(kind, reason);
        },
    };

    let mut rows = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (index, item) in items.iter().enumerate() {
        let prepared = R::Record::deserialize(item)
            .map_err(|e| e.to_string())
            .and_then(|record| reconciler.prepare(record));
        match prepared {
            Ok(row) => rows.push(row),
            Err(reason) => {
                skipped += 1;
                warn!(
                    "Skipping {} record #{} ({}): {}",
                    kind,
                    index,
                    record_label(item),
                    reason
                );
            },
        }
    }

    let _gate = store.write_gate().lock().await;
    match apply_batch(reconciler, store.pool(), &rows).await {
        Ok(conflicts) => {
            info!(
                "Synced {}: {} rows, {} skipped, {} identity conflicts",
                kind,
                rows.len(),
                skipped,
                conflicts
            );
            EntityReport::synced(kind, rows.len(), skipped, conflicts)
        },
        Err(e) => {
            error!("Sync of {} rolled back: {}", kind, e);
            EntityReport::commit_failed(kind, skipped, e.to_string())
        },
    }
}

fn extract_collection(kind: EntityKind, payload: &Value) -> Result<&Vec<Value>, SkipReason> {
    let object = payload.as_object().ok_or(SkipReason::EmptyPayload)?;
    object
        .get(kind.resource())
        .and_then(Value::as_array)
        .ok_or(SkipReason::MissingKey)
}

fn record_label(item: &Value) -> String {
    item.get("id")
        .and_then(Value::as_str)
        .map(|id| format!("id {}", id))
        .unwrap_or_else(|| "no id".to_string())
}

async fn apply_batch<R: Reconciler>(
    reconciler: &R,
    pool: &SqlitePool,
    rows: &[R::Row],
) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut conflicts = 0;

    for row in rows {
        match reconciler.upsert(&mut *tx, row).await {
            Ok(UpsertOutcome::Applied) => {},
            Ok(UpsertOutcome::IdentityConflict) => conflicts += 1,
            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!("Rollback of {} batch failed: {}", reconciler.kind(), rb);
                }
                return Err(e);
            },
        }
    }

    tx.commit().await?;
    Ok(conflicts)
}

/// Normalize a vendor timestamp to RFC 3339 UTC text for storage
pub(crate) fn timestamp_text(raw: Option<&str>) -> Option<String> {
    parse_timestamp(raw).map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Reject records whose primary key is blank
pub(crate) fn require_id(id: &str) -> Result<(), String> {
    if id.trim().is_empty() {
        Err("empty id".to_string())
    } else {
        Ok(())
    }
}
