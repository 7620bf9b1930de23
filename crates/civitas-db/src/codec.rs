//! Column conversions shared by the table stores.

use chrono::{DateTime, Utc};
use civitas_types::Position;

use crate::error::DbError;

pub(crate) fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn now_millis() -> i64 {
    to_millis(Utc::now())
}

pub(crate) fn from_millis(ms: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| DbError::Corrupt(format!("timestamp out of range: {ms}")))
}

pub(crate) fn opt_from_millis(ms: Option<i64>) -> Result<Option<DateTime<Utc>>, DbError> {
    ms.map(from_millis).transpose()
}

/// A position stored as three nullable columns; present only if all are.
pub(crate) fn position(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Option<Position> {
    match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Some(Position::new(x, y, z)),
        _ => None,
    }
}

pub(crate) fn json_to_text(value: Option<&serde_json::Value>) -> Result<Option<String>, DbError> {
    value.map(serde_json::to_string).transpose().map_err(DbError::from)
}

pub(crate) fn text_to_json(text: Option<&str>) -> Result<Option<serde_json::Value>, DbError> {
    text.map(serde_json::from_str).transpose().map_err(DbError::from)
}
