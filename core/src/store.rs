//! Store traits for the capacity ledger and registration records.
//!
//! # Design
//!
//! The store exposes a unit of work ([`StoreTransaction`]) rather than loose
//! read/write calls. The ledger counter and registration status are only ever
//! changed through a transaction, and a transaction either commits every change
//! it made or none of them:
//!
//! - `try_admit` is one conditional update ("increment only if below the limit"),
//!   never a read followed by a write
//! - `release` decrements floored at zero
//! - both recompute the derived [`EventStatus`] in the same step
//! - a second active registration for the same `(event, identity)` pair is
//!   rejected by the store itself with [`StoreError::DuplicateActive`]
//!
//! Dropping a transaction without calling [`StoreTransaction::commit`] discards
//! everything it did.
//!
//! # Implementations
//!
//! - `PostgresRegistrationStore` (in `turnstile-postgres`): row locks and
//!   conditional `UPDATE ... RETURNING`
//! - `InMemoryRegistrationStore` (in `turnstile-testing`): a single mutex held for
//!   the lifetime of each transaction
//!
//! # Dyn Compatibility
//!
//! Methods return [`BoxFuture`] instead of using `async fn` so the store can be
//! shared as `Arc<dyn RegistrationStore>`.

use crate::types::{
    Event, EventId, EventStatus, IdentityKey, Registration, RegistrationId,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed, sendable future returned by store methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Referenced event or registration does not exist.
    #[error("{resource} not found: {id}")]
    NotFound {
        /// Kind of record
        resource: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// Another active registration exists for the same event and identity.
    #[error("active registration already exists for {identity_key} on event {event_id}")]
    DuplicateActive {
        /// Event id
        event_id: EventId,
        /// Identity key
        identity_key: IdentityKey,
    },

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Shorthand for a missing event
    #[must_use]
    pub fn event_not_found(event_id: EventId) -> Self {
        Self::NotFound {
            resource: "event",
            id: event_id.to_string(),
        }
    }

    /// Shorthand for a missing registration
    #[must_use]
    pub fn registration_not_found(id: RegistrationId) -> Self {
        Self::NotFound {
            resource: "registration",
            id: id.to_string(),
        }
    }
}

/// Ledger fields of one event after a counter mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    /// Event id
    pub event_id: EventId,
    /// Capacity
    pub max_attendees: u32,
    /// Counted registrations
    pub current_attendees: u32,
    /// Derived status persisted with the counter
    pub status: EventStatus,
}

/// Outcome of a conditional admit.
///
/// `Full` is the normal "no free slot" signal, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmitResult {
    /// A slot was consumed
    Admitted(LedgerSnapshot),
    /// The event had no free slot (or was not accepting registrations)
    Full,
}

impl AdmitResult {
    /// Whether a slot was consumed
    #[must_use]
    pub const fn admitted(&self) -> bool {
        matches!(self, Self::Admitted(_))
    }
}

/// Store for events and registrations.
///
/// Implementations must be `Send + Sync` so one instance can be shared across
/// concurrent request handlers.
pub trait RegistrationStore: Send + Sync {
    /// Open a unit of work.
    ///
    /// Callers must not await other store calls on the same task while holding a
    /// transaction; implementations may serialize transactions.
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn StoreTransaction>, StoreError>>;

    /// Persist a newly created event.
    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Load an event by id.
    fn load_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>, StoreError>>;

    /// Load a registration by id.
    fn load_registration(
        &self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>>;

    /// Find the active (`registered` or `waitlisted`) registration for an identity.
    fn find_active(
        &self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>>;

    /// All registrations of an event, oldest first.
    fn list_registrations(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Registration>, StoreError>>;

    /// Cheap connectivity check for readiness probes.
    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// One atomic unit of work against the store.
pub trait StoreTransaction: Send {
    /// Load an event and hold its ledger lock until the transaction ends.
    ///
    /// Every other transaction that locks, admits into or releases from the same
    /// event waits for this one.
    fn lock_event(&mut self, event_id: EventId)
    -> BoxFuture<'_, Result<Option<Event>, StoreError>>;

    /// Consume one slot if `current_attendees < max_attendees` and the event is
    /// accepting registrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the event does not exist.
    fn try_admit(&mut self, event_id: EventId) -> BoxFuture<'_, Result<AdmitResult, StoreError>>;

    /// Return one slot, never going below zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the event does not exist.
    fn release(&mut self, event_id: EventId) -> BoxFuture<'_, Result<LedgerSnapshot, StoreError>>;

    /// Change capacity unless the new value is below `current_attendees`.
    ///
    /// Returns `None` when the change was refused.
    fn set_capacity(
        &mut self,
        event_id: EventId,
        max_attendees: u32,
    ) -> BoxFuture<'_, Result<Option<LedgerSnapshot>, StoreError>>;

    /// Overwrite the event status (used for terminal lifecycle changes).
    fn set_event_status(
        &mut self,
        event_id: EventId,
        status: EventStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Find the active registration for an identity within this transaction.
    fn find_active(
        &mut self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>>;

    /// Load a registration, locking it against concurrent transitions.
    fn load_registration(
        &mut self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>>;

    /// The waitlisted registration with the earliest `registered_at` for an event.
    fn earliest_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>>;

    /// Insert a new registration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateActive`] if the registration is active and
    /// another active one exists for the same event and identity.
    fn insert_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Persist a registration's new status fields.
    fn update_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Commit every change made through this transaction.
    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>>;
}
