//! Row types that have no wire counterpart in mercado-types.
//! Everything else is mapped straight into the shared models.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub lastname: String,
    pub password_hash: String,
}

/// Timestamps are stored as RFC 3339 text with millisecond precision, so
/// lexical order matches time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> (DateTime<Utc>, String) {
    let now = Utc::now();
    // Round-trip through the stored precision so the returned value equals
    // what a later read yields.
    let text = format_timestamp(now);
    let parsed = parse_timestamp(&text).unwrap_or(now);
    (parsed, text)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite's datetime('now') has no timezone; treat as UTC.
            NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .ok()
}

/// Read a timestamp column, failing the row mapping on corrupt values.
pub fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_timestamp(&text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("corrupt timestamp '{}'", text).into(),
        )
    })
}
