//! Shared Serde helpers
//!
//! Default-value functions and lenient deserializers for payloads whose
//! numeric fields sometimes arrive as strings.

use serde::{Deserialize, Deserializer};

// ============================================================================
// Default Value Functions (for serde #[serde(default = "...")] attributes)
// ============================================================================

/// Default value: true
pub fn bool_true() -> bool {
    true
}

/// Default value: false
pub fn bool_false() -> bool {
    false
}

// ============================================================================
// Custom Deserializers
// ============================================================================

/// Deserialize optional i64
///
/// Supports the following input formats:
/// - `null` or missing → `None`
/// - `""` → `None`
/// - `123` or `"123"` → `Some(123)`
///
/// # Example
/// ```ignore
/// #[derive(Deserialize)]
/// struct Record {
///     #[serde(default, deserialize_with = "deserialize_optional_i64")]
///     num_loops: Option<i64>,
/// }
/// ```
pub fn deserialize_optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        Int(i64),
        String(String),
    }

    match Option::<StringOrInt>::deserialize(deserializer)? {
        None => Ok(None),
        Some(StringOrInt::Int(i)) => Ok(Some(i)),
        Some(StringOrInt::String(s)) if s.trim().is_empty() => Ok(None),
        Some(StringOrInt::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid integer: {}", s))),
    }
}

/// Deserialize optional string, treating `""` as `None`
pub fn deserialize_optional_nonempty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}
