//! SQLite schema
//!
//! Table DDL for the synchronized entities. All primary keys are the vendor's
//! string identifiers. Timestamps are RFC 3339 UTC text.

use sqlx::SqlitePool;
use tracing::debug;

pub const SERVICES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS services (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        description TEXT,
        status TEXT,
        html_url TEXT,
        created_at TEXT,
        updated_at TEXT
    )
"#;

pub const TEAMS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS teams (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        summary TEXT,
        html_url TEXT
    )
"#;

/// `service_ref` keeps the vendor's service id even while `service_id` is
/// NULL, so the link can be set once the service is synced.
pub const INCIDENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS incidents (
        id TEXT PRIMARY KEY,
        incident_number INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT,
        status TEXT NOT NULL,
        incident_key TEXT,
        created_at TEXT,
        updated_at TEXT,
        service_ref TEXT,
        service_id TEXT REFERENCES services(id) ON DELETE CASCADE
    )
"#;

pub const USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT,
        html_url TEXT
    )
"#;

pub const SCHEDULES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schedules (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        html_url TEXT
    )
"#;

pub const ESCALATION_POLICIES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS escalation_policies (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        summary TEXT NOT NULL,
        description TEXT,
        num_loops INTEGER,
        on_call_handoff_notifications TEXT
    )
"#;

pub const ESCALATION_RULES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS escalation_rules (
        id TEXT PRIMARY KEY,
        escalation_delay_in_minutes INTEGER,
        escalation_policy_id TEXT NOT NULL
            REFERENCES escalation_policies(id) ON DELETE CASCADE
    )
"#;

/// The same user or schedule can be a target of several rules
pub const TARGETS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS targets (
        escalation_rule_id TEXT NOT NULL
            REFERENCES escalation_rules(id) ON DELETE CASCADE,
        id TEXT NOT NULL,
        type TEXT NOT NULL,
        summary TEXT,
        html_url TEXT,
        user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        schedule_id TEXT REFERENCES schedules(id) ON DELETE SET NULL,
        PRIMARY KEY (escalation_rule_id, id)
    )
"#;

pub const SERVICE_TEAM_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS service_team (
        service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
        team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
        PRIMARY KEY (service_id, team_id)
    )
"#;

pub const ESCALATION_POLICY_SERVICE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS escalation_policy_service (
        escalation_policy_id TEXT NOT NULL
            REFERENCES escalation_policies(id) ON DELETE CASCADE,
        service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
        PRIMARY KEY (escalation_policy_id, service_id)
    )
"#;

pub const ESCALATION_POLICY_TEAM_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS escalation_policy_team (
        escalation_policy_id TEXT NOT NULL
            REFERENCES escalation_policies(id) ON DELETE CASCADE,
        team_id TEXT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
        PRIMARY KEY (escalation_policy_id, team_id)
    )
"#;

const INDEXES: [&str; 4] = [
    "CREATE INDEX IF NOT EXISTS idx_incidents_number ON incidents(incident_number)",
    "CREATE INDEX IF NOT EXISTS idx_incidents_service ON incidents(service_id)",
    "CREATE INDEX IF NOT EXISTS idx_incidents_service_ref ON incidents(service_ref)",
    "CREATE INDEX IF NOT EXISTS idx_rules_policy ON escalation_rules(escalation_policy_id)",
];

/// Tables in dependency order
pub const ALL_TABLES: [&str; 11] = [
    SERVICES_TABLE,
    TEAMS_TABLE,
    INCIDENTS_TABLE,
    USERS_TABLE,
    SCHEDULES_TABLE,
    ESCALATION_POLICIES_TABLE,
    ESCALATION_RULES_TABLE,
    TARGETS_TABLE,
    SERVICE_TEAM_TABLE,
    ESCALATION_POLICY_SERVICE_TABLE,
    ESCALATION_POLICY_TEAM_TABLE,
];

/// Create all tables and indexes (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for ddl in ALL_TABLES.iter().chain(INDEXES.iter()) {
        sqlx::query(*ddl).execute(pool).await?;
    }
    debug!("Schema ready ({} tables)", ALL_TABLES.len());
    Ok(())
}
