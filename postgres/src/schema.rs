//! Database schema for events and registrations.
//!
//! Statements are idempotent (`IF NOT EXISTS`) so [`migrate`] can run on every
//! start-up.

use sqlx::PgPool;
use turnstile_core::StoreError;

/// Schema statements, applied in order.
pub const MIGRATIONS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS events (
        id UUID PRIMARY KEY,
        title TEXT NOT NULL,
        max_attendees INTEGER NOT NULL CHECK (max_attendees > 0),
        current_attendees INTEGER NOT NULL DEFAULT 0
            CHECK (current_attendees >= 0 AND current_attendees <= max_attendees),
        status TEXT NOT NULL,
        opens_at TIMESTAMPTZ,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS registrations (
        id UUID PRIMARY KEY,
        event_id UUID NOT NULL REFERENCES events(id),
        subject JSONB NOT NULL,
        identity_key TEXT NOT NULL,
        status TEXT NOT NULL,
        registered_at TIMESTAMPTZ NOT NULL,
        cancelled_at TIMESTAMPTZ
    )
    ",
    r"
    CREATE UNIQUE INDEX IF NOT EXISTS registrations_one_active_per_identity
        ON registrations (event_id, identity_key)
        WHERE status IN ('registered', 'waitlisted')
    ",
    r"
    CREATE INDEX IF NOT EXISTS registrations_waitlist_fifo
        ON registrations (event_id, registered_at, id)
        WHERE status = 'waitlisted'
    ",
    r"
    CREATE INDEX IF NOT EXISTS registrations_by_event
        ON registrations (event_id, registered_at)
    ",
];

/// Name of the partial unique index guarding duplicate active registrations.
pub const ACTIVE_IDENTITY_INDEX: &str = "registrations_one_active_per_identity";

/// Apply all schema statements.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if any statement fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    for statement in MIGRATIONS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(|e| StoreError::Database(format!("migration failed: {e}")))?;
    }
    tracing::info!(statements = MIGRATIONS.len(), "Schema migrations applied");
    Ok(())
}
