//! Row mapping between `PostgreSQL` and domain types.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::Row;
use turnstile_core::{
    Event, EventId, EventStatus, IdentityKey, LedgerSnapshot, Registration, RegistrationId,
    RegistrationStatus, StoreError, Subject,
};
use uuid::Uuid;

pub const EVENT_COLUMNS: &str =
    "id, title, max_attendees, current_attendees, status, opens_at, created_at";

pub const REGISTRATION_COLUMNS: &str =
    "id, event_id, subject, identity_key, status, registered_at, cancelled_at";

/// Columns returned by ledger `UPDATE ... RETURNING` statements.
pub const LEDGER_COLUMNS: &str = "id, max_attendees, current_attendees, status";

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

fn count(row: &PgRow, column: &str) -> Result<u32, StoreError> {
    let value: i32 = row.try_get(column).map_err(db_err)?;
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {column}: {value}")))
}

/// Convert a domain count into an `INTEGER` bind value.
pub fn to_db_count(value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("count overflow: {value}")))
}

fn event_status(row: &PgRow) -> Result<EventStatus, StoreError> {
    let raw: String = row.try_get("status").map_err(db_err)?;
    raw.parse().map_err(StoreError::Corrupt)
}

pub fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let id: Uuid = row.try_get("id").map_err(db_err)?;
    let opens_at: Option<DateTime<Utc>> = row.try_get("opens_at").map_err(db_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(db_err)?;

    Ok(Event {
        id: EventId::from_uuid(id),
        title: row.try_get("title").map_err(db_err)?,
        max_attendees: count(row, "max_attendees")?,
        current_attendees: count(row, "current_attendees")?,
        status: event_status(row)?,
        opens_at,
        created_at,
    })
}

pub fn snapshot_from_row(row: &PgRow) -> Result<LedgerSnapshot, StoreError> {
    let id: Uuid = row.try_get("id").map_err(db_err)?;
    Ok(LedgerSnapshot {
        event_id: EventId::from_uuid(id),
        max_attendees: count(row, "max_attendees")?,
        current_attendees: count(row, "current_attendees")?,
        status: event_status(row)?,
    })
}

pub fn registration_from_row(row: &PgRow) -> Result<Registration, StoreError> {
    let id: Uuid = row.try_get("id").map_err(db_err)?;
    let event_id: Uuid = row.try_get("event_id").map_err(db_err)?;
    let Json(subject): Json<Subject> = row.try_get("subject").map_err(db_err)?;
    let identity_key: String = row.try_get("identity_key").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;

    Ok(Registration {
        id: RegistrationId::from_uuid(id),
        event_id: EventId::from_uuid(event_id),
        subject,
        identity_key: IdentityKey::from_stored(identity_key),
        status: status
            .parse::<RegistrationStatus>()
            .map_err(StoreError::Corrupt)?,
        registered_at: row.try_get("registered_at").map_err(db_err)?,
        cancelled_at: row.try_get("cancelled_at").map_err(db_err)?,
    })
}
