//! Schemas for records stored in the local collections
//!
//! The collections are written by unrelated parts of the site and are only
//! loosely typed. Every field here is optional on the wire: a missing field,
//! a `null`, or a value of the wrong type reads as false, zero or empty.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Collection holding prediction records
pub const PREDICTIONS_COLLECTION: &str = "predictions";

/// Collection holding user records
pub const USERS_COLLECTION: &str = "users";

/// Collection holding application error records
pub const ERRORS_COLLECTION: &str = "errors";

/// Collection the monitor appends alerts to
pub const ALERTS_COLLECTION: &str = "alerts";

/// Error level counted as critical
pub const CRITICAL_LEVEL: &str = "critical";

/// A stored prediction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRecord {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub success: bool,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: f64,

    #[serde(default, deserialize_with = "lenient_f64")]
    pub accuracy: f64,
}

/// A stored user account
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_active: bool,

    #[serde(default, deserialize_with = "lenient_datetime")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A stored application error
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub level: String,

    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
}

impl ErrorRecord {
    pub fn is_critical(&self) -> bool {
        self.level == CRITICAL_LEVEL
    }
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(matches!(value, Some(Value::Bool(true))))
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0))
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => s,
        _ => String::new(),
    })
}

fn lenient_datetime<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(Value::as_str).and_then(parse_timestamp))
}

/// Parse an RFC 3339 instant or a bare `YYYY-MM-DD` date (taken as UTC midnight)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw) {
        return Some(instant.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
