//! Remote payload records
//!
//! Shapes of the vendor API collection items. Required fields are plain
//! types so a record lacking one fails to decode and is skipped by the
//! reconciler; everything else is optional and stored as NULL when absent.

use chrono::{DateTime, NaiveDateTime, Utc};
use common::serde_helpers::{deserialize_optional_i64, deserialize_optional_nonempty};
use serde::{Deserialize, Deserializer};

/// Nested reference to another vendor object (`{id, type, summary, html_url}`)
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteReference {
    pub id: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl RemoteReference {
    /// Display name for placeholder rows: summary, falling back to the id
    pub fn display_name(&self) -> &str {
        self.summary
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteService {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub teams: Vec<RemoteReference>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteIncident {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub incident_number: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_optional_nonempty")]
    pub incident_key: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub service: Option<RemoteReference>,
}

impl RemoteIncident {
    /// Local identity: the incident key, or the vendor id when no key is set
    pub fn local_id(&self) -> Option<&str> {
        self.incident_key
            .as_deref()
            .or(self.id.as_deref())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteTeam {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEscalationPolicy {
    pub id: String,
    pub name: String,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub num_loops: Option<i64>,
    #[serde(default)]
    pub on_call_handoff_notifications: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub services: Vec<RemoteReference>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub teams: Vec<RemoteReference>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub escalation_rules: Vec<RemoteEscalationRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteEscalationRule {
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_optional_i64")]
    pub escalation_delay_in_minutes: Option<i64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub targets: Vec<RemoteReference>,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a vendor timestamp into UTC
///
/// Accepts RFC 3339 (`2024-01-15T10:00:00Z`), numeric offsets without a
/// colon (`2024-01-15T10:00:00+0000`) and offset-less values, which are
/// taken as UTC. Anything else yields `None`.
pub fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
