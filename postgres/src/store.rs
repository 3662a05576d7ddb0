//! `PostgreSQL`-backed [`RegistrationStore`].
//!
//! # Locking
//!
//! Every ledger path locks the event row first (`SELECT ... FOR UPDATE`) and only
//! then touches registration rows. With one lock order across all paths,
//! concurrent registrations, cancellations and promotions on the same event queue
//! behind each other instead of deadlocking, and the "earliest waitlisted"
//! choice and its admit happen under the same lock.
//!
//! The admit itself is still a conditional update, so the counter can never pass
//! `max_attendees` even if a caller skips the event lock.

use crate::rows::{
    EVENT_COLUMNS, LEDGER_COLUMNS, REGISTRATION_COLUMNS, event_from_row, registration_from_row,
    snapshot_from_row, to_db_count,
};
use crate::schema::{self, ACTIVE_IDENTITY_INDEX};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, Transaction};
use turnstile_core::{
    AdmitResult, BoxFuture, Event, EventId, EventStatus, IdentityKey, LedgerSnapshot,
    Registration, RegistrationId, RegistrationStore, StoreError, StoreTransaction,
};

fn db_err(e: sqlx::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// SQL expression for the status column once the counter becomes `current`.
///
/// Open and full events get the capacity-derived value; every other status is
/// left alone.
fn derived_status(current: &str, max: &str) -> String {
    format!(
        "CASE WHEN status IN ('registration-open', 'full') \
         THEN CASE WHEN {current} >= {max} THEN 'full' ELSE 'registration-open' END \
         ELSE status END"
    )
}

/// `PostgreSQL` store for events and registrations.
#[derive(Clone, Debug)]
pub struct PostgresRegistrationStore {
    pool: PgPool,
}

impl PostgresRegistrationStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await.map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Connect with explicit pool options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection cannot be established.
    pub async fn connect_with(
        options: PgPoolOptions,
        database_url: &str,
    ) -> Result<Self, StoreError> {
        let pool = options.connect(database_url).await.map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        schema::migrate(&self.pool).await
    }
}

impl RegistrationStore for PostgresRegistrationStore {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn StoreTransaction>, StoreError>> {
        Box::pin(async move {
            let tx = self.pool.begin().await.map_err(db_err)?;
            Ok(Box::new(PgStoreTransaction { tx }) as Box<dyn StoreTransaction>)
        })
    }

    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO events
                 (id, title, max_attendees, current_attendees, status, opens_at, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(event.id.as_uuid())
            .bind(&event.title)
            .bind(to_db_count(event.max_attendees)?)
            .bind(to_db_count(event.current_attendees)?)
            .bind(event.status.as_str())
            .bind(event.opens_at)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn load_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
                .bind(event_id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
            row.as_ref().map(event_from_row).transpose()
        })
    }

    fn load_registration(
        &self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn find_active(
        &self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE event_id = $1 AND identity_key = $2
                   AND status IN ('registered', 'waitlisted')"
            ))
            .bind(event_id.as_uuid())
            .bind(identity_key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn list_registrations(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Registration>, StoreError>> {
        Box::pin(async move {
            let rows = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE event_id = $1
                 ORDER BY registered_at, id"
            ))
            .bind(event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
            rows.iter().map(registration_from_row).collect()
        })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        })
    }
}

struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PgStoreTransaction {
    async fn event_exists(&mut self, event_id: EventId) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(event_id.as_uuid())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(exists.0)
    }
}

impl StoreTransaction for PgStoreTransaction {
    fn lock_event(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Option<Event>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1 FOR UPDATE"
            ))
            .bind(event_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
            row.as_ref().map(event_from_row).transpose()
        })
    }

    fn try_admit(&mut self, event_id: EventId) -> BoxFuture<'_, Result<AdmitResult, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE events
                 SET current_attendees = current_attendees + 1,
                     status = {status}
                 WHERE id = $1
                   AND current_attendees < max_attendees
                   AND status NOT IN ('completed', 'cancelled')
                 RETURNING {LEDGER_COLUMNS}",
                status = derived_status("current_attendees + 1", "max_attendees"),
            );
            let row = sqlx::query(&sql)
                .bind(event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?;

            if let Some(row) = row {
                return Ok(AdmitResult::Admitted(snapshot_from_row(&row)?));
            }
            if self.event_exists(event_id).await? {
                Ok(AdmitResult::Full)
            } else {
                Err(StoreError::event_not_found(event_id))
            }
        })
    }

    fn release(&mut self, event_id: EventId) -> BoxFuture<'_, Result<LedgerSnapshot, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE events
                 SET current_attendees = GREATEST(current_attendees - 1, 0),
                     status = {status}
                 WHERE id = $1
                 RETURNING {LEDGER_COLUMNS}",
                status = derived_status("GREATEST(current_attendees - 1, 0)", "max_attendees"),
            );
            let row = sqlx::query(&sql)
                .bind(event_id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?
                .ok_or_else(|| StoreError::event_not_found(event_id))?;
            snapshot_from_row(&row)
        })
    }

    fn set_capacity(
        &mut self,
        event_id: EventId,
        max_attendees: u32,
    ) -> BoxFuture<'_, Result<Option<LedgerSnapshot>, StoreError>> {
        Box::pin(async move {
            let sql = format!(
                "UPDATE events
                 SET max_attendees = $2,
                     status = {status}
                 WHERE id = $1 AND current_attendees <= $2
                 RETURNING {LEDGER_COLUMNS}",
                status = derived_status("current_attendees", "$2"),
            );
            let row = sqlx::query(&sql)
                .bind(event_id.as_uuid())
                .bind(to_db_count(max_attendees)?)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(db_err)?;

            if let Some(row) = row {
                return snapshot_from_row(&row).map(Some);
            }
            if self.event_exists(event_id).await? {
                Ok(None)
            } else {
                Err(StoreError::event_not_found(event_id))
            }
        })
    }

    fn set_event_status(
        &mut self,
        event_id: EventId,
        status: EventStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE events
                 SET status = CASE WHEN $2 IN ('registration-open', 'full')
                     THEN CASE WHEN current_attendees >= max_attendees
                          THEN 'full' ELSE 'registration-open' END
                     ELSE $2 END
                 WHERE id = $1",
            )
            .bind(event_id.as_uuid())
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::event_not_found(event_id));
            }
            Ok(())
        })
    }

    fn find_active(
        &mut self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE event_id = $1 AND identity_key = $2
                   AND status IN ('registered', 'waitlisted')
                 FOR UPDATE"
            ))
            .bind(event_id.as_uuid())
            .bind(identity_key.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn load_registration(
        &mut self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations WHERE id = $1 FOR UPDATE"
            ))
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn earliest_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            let row = sqlx::query(&format!(
                "SELECT {REGISTRATION_COLUMNS} FROM registrations
                 WHERE event_id = $1 AND status = 'waitlisted'
                 ORDER BY registered_at, id
                 LIMIT 1
                 FOR UPDATE"
            ))
            .bind(event_id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
            row.as_ref().map(registration_from_row).transpose()
        })
    }

    fn insert_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "INSERT INTO registrations
                 (id, event_id, subject, identity_key, status, registered_at, cancelled_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(registration.id.as_uuid())
            .bind(registration.event_id.as_uuid())
            .bind(Json(&registration.subject))
            .bind(registration.identity_key.as_str())
            .bind(registration.status.as_str())
            .bind(registration.registered_at)
            .bind(registration.cancelled_at)
            .execute(&mut *self.tx)
            .await;

            match result {
                Ok(_) => Ok(()),
                Err(sqlx::Error::Database(e))
                    if e.is_unique_violation()
                        && e.constraint() == Some(ACTIVE_IDENTITY_INDEX) =>
                {
                    metrics::counter!("turnstile_store_duplicate_rejections_total").increment(1);
                    Err(StoreError::DuplicateActive {
                        event_id: registration.event_id,
                        identity_key: registration.identity_key,
                    })
                }
                Err(e) => Err(db_err(e)),
            }
        })
    }

    fn update_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let result = sqlx::query(
                "UPDATE registrations SET status = $2, cancelled_at = $3 WHERE id = $1",
            )
            .bind(registration.id.as_uuid())
            .bind(registration.status.as_str())
            .bind(registration.cancelled_at)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::registration_not_found(registration.id));
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move { self.tx.commit().await.map_err(db_err) })
    }
}
