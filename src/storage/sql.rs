//! SQL shared by the SQLite and PostgreSQL backends.
//!
//! Instants are stored as Unix milliseconds (`BIGINT`), durations as whole
//! seconds, identifiers as text. Field columns come from [`Field::column`],
//! never from user input.

use crate::analytics::{FirstSeen, Predicate, TimeField};
use crate::models::{DomainId, EventRecord, Field, FieldValues, MAX_DURATION_SECS};
use crate::storage::{StorageError, StorageResult};
use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{ColumnIndex, Database, Decode, Encode, QueryBuilder, Row, Type};
use uuid::Uuid;

pub(crate) const CREATE_EVENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS events (
        id TEXT PRIMARY KEY,
        domain_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        created_at BIGINT NOT NULL,
        duration BIGINT,
        site_location TEXT,
        site_referrer TEXT,
        source TEXT,
        site_language TEXT,
        country TEXT,
        device_type TEXT,
        device_name TEXT,
        device_manufacturer TEXT,
        os_name TEXT,
        os_version TEXT,
        browser_name TEXT,
        browser_version TEXT
    )
"#;

pub(crate) const CREATE_EVENTS_INDEXES: [&str; 2] = [
    "CREATE INDEX IF NOT EXISTS idx_events_domain_created ON events(domain_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_events_domain_session ON events(domain_id, session_id)",
];

pub(crate) const EVENT_COLUMNS: &str = "id, domain_id, session_id, created_at, duration, \
     site_location, site_referrer, source, site_language, country, device_type, device_name, \
     device_manufacturer, os_name, os_version, browser_name, browser_version";

/// Row shape of the `events` table
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    pub id: String,
    pub domain_id: String,
    pub session_id: String,
    pub created_at: i64,
    pub duration: Option<i64>,
    pub site_location: Option<String>,
    pub site_referrer: Option<String>,
    pub source: Option<String>,
    pub site_language: Option<String>,
    pub country: Option<String>,
    pub device_type: Option<String>,
    pub device_name: Option<String>,
    pub device_manufacturer: Option<String>,
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub browser_name: Option<String>,
    pub browser_version: Option<String>,
}

pub(crate) fn from_millis(millis: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| StorageError::Other(anyhow!("timestamp {millis} out of range")))
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StorageError;

    fn try_from(row: EventRow) -> StorageResult<Self> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StorageError::Other(anyhow!("bad event id '{}': {e}", row.id)))?;
        let domain_id = row
            .domain_id
            .parse::<DomainId>()
            .map_err(|e| StorageError::Other(e.into()))?;

        Ok(EventRecord {
            id,
            domain_id,
            session_id: row.session_id,
            created_at: from_millis(row.created_at)?,
            duration: row.duration,
            site_location: row.site_location,
            site_referrer: row.site_referrer,
            source: row.source,
            site_language: row.site_language,
            country: row.country,
            device_type: row.device_type,
            device_name: row.device_name,
            device_manufacturer: row.device_manufacturer,
            os_name: row.os_name,
            os_version: row.os_version,
            browser_name: row.browser_name,
            browser_version: row.browser_version,
        })
    }
}

/// `INSERT` of one record that does nothing when the id already exists
pub(crate) fn push_insert<'args, DB>(builder: &mut QueryBuilder<'args, DB>, record: &EventRecord)
where
    DB: Database,
    String: 'args + Encode<'args, DB> + Type<DB>,
    i64: 'args + Encode<'args, DB> + Type<DB>,
    Option<String>: 'args + Encode<'args, DB> + Type<DB>,
    Option<i64>: 'args + Encode<'args, DB> + Type<DB>,
{
    builder.push(format!("INSERT INTO events ({EVENT_COLUMNS}) VALUES ("));
    let mut values = builder.separated(", ");
    values
        .push_bind(record.id.to_string())
        .push_bind(record.domain_id.to_string())
        .push_bind(record.session_id.clone())
        .push_bind(record.created_at.timestamp_millis())
        .push_bind(record.duration);
    for field in Field::ALL {
        values.push_bind(record.value(field).map(str::to_string));
    }
    values.push_unseparated(") ON CONFLICT (id) DO NOTHING");
}

/// Mirrors [`EventRecord::last_activity`]: out-of-range durations count as 0
fn time_expression(field: TimeField) -> String {
    match field {
        TimeField::CreatedAt => "created_at".to_string(),
        TimeField::LastActivity => format!(
            "(created_at + CASE WHEN duration BETWEEN 0 AND {MAX_DURATION_SECS} \
             THEN duration ELSE 0 END * 1000)"
        ),
    }
}

/// Append the `WHERE` conditions of `predicate` (the caller has already
/// written `WHERE`)
pub(crate) fn push_scope<'args, DB>(builder: &mut QueryBuilder<'args, DB>, predicate: &Predicate)
where
    DB: Database,
    String: 'args + Encode<'args, DB> + Type<DB>,
    i64: 'args + Encode<'args, DB> + Type<DB>,
{
    builder
        .push("domain_id = ")
        .push_bind(predicate.domain_id.to_string());

    if let Some(range) = predicate.time_range {
        let expression = time_expression(range.field);
        builder
            .push(format!(" AND {expression} >= "))
            .push_bind(range.start.timestamp_millis());
        if let Some(end) = range.end {
            builder
                .push(format!(" AND {expression} < "))
                .push_bind(end.timestamp_millis());
        }
    }

    for field in &predicate.required_fields {
        builder.push(format!(" AND {} IS NOT NULL", field.column()));
    }
}

/// `SELECT <fields>, MIN(created_at), COUNT(*) ... GROUP BY <fields>`
pub(crate) fn push_first_seen<'args, DB>(
    builder: &mut QueryBuilder<'args, DB>,
    domain_id: &DomainId,
    fields: &[Field],
) where
    DB: Database,
    String: 'args + Encode<'args, DB> + Type<DB>,
    i64: 'args + Encode<'args, DB> + Type<DB>,
{
    let columns = fields
        .iter()
        .map(Field::column)
        .collect::<Vec<_>>()
        .join(", ");

    builder.push(format!(
        "SELECT {columns}, MIN(created_at) AS first_seen, COUNT(*) AS occurrences FROM events WHERE "
    ));
    let predicate = crate::analytics::filter::scope(*domain_id, None, fields);
    push_scope(builder, &predicate);
    builder.push(format!(" GROUP BY {columns}"));
}

/// Decode one row produced by [`push_first_seen`]
pub(crate) fn decode_first_seen<R>(row: &R, fields: &[Field]) -> StorageResult<FirstSeen>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> String: Decode<'r, R::Database> + Type<R::Database>,
    for<'r> i64: Decode<'r, R::Database> + Type<R::Database>,
{
    let mut pairs = Vec::with_capacity(fields.len());
    for (index, field) in fields.iter().enumerate() {
        pairs.push((*field, row.try_get::<String, _>(index)?));
    }
    let first_seen = from_millis(row.try_get::<i64, _>(fields.len())?)?;
    let count = row.try_get::<i64, _>(fields.len() + 1)?;

    Ok(FirstSeen {
        key: FieldValues::new(pairs),
        first_seen,
        count: u64::try_from(count).unwrap_or_default(),
    })
}
