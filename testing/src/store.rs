//! In-memory registration store for fast, deterministic testing.
//!
//! Each transaction holds the store's single mutex from `begin` until it commits
//! or is dropped, and works on a staged copy of the state. Commit swaps the copy
//! in; dropping discards it. This gives the same all-or-nothing guarantee as the
//! `PostgreSQL` store, with every transaction fully serialized.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, OwnedMutexGuard};
use turnstile_core::{
    AdmitResult, BoxFuture, Event, EventId, EventStatus, IdentityKey, LedgerSnapshot,
    Registration, RegistrationId, RegistrationStatus, RegistrationStore, StoreError,
    StoreTransaction,
};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    events: HashMap<EventId, Event>,
    registrations: HashMap<RegistrationId, Registration>,
}

impl MemoryState {
    fn event_mut(&mut self, event_id: EventId) -> Result<&mut Event, StoreError> {
        self.events
            .get_mut(&event_id)
            .ok_or_else(|| StoreError::event_not_found(event_id))
    }

    fn find_active(&self, event_id: EventId, identity_key: &IdentityKey) -> Option<Registration> {
        self.registrations
            .values()
            .find(|r| {
                r.event_id == event_id && r.identity_key == *identity_key && r.status.is_active()
            })
            .cloned()
    }

    fn registrations_of(&self, event_id: EventId) -> Vec<Registration> {
        let mut registrations: Vec<Registration> = self
            .registrations
            .values()
            .filter(|r| r.event_id == event_id)
            .cloned()
            .collect();
        registrations.sort_by(|a, b| (a.registered_at, a.id).cmp(&(b.registered_at, b.id)));
        registrations
    }
}

const fn snapshot(event: &Event) -> LedgerSnapshot {
    LedgerSnapshot {
        event_id: event.id,
        max_attendees: event.max_attendees,
        current_attendees: event.current_attendees,
        status: event.status,
    }
}

/// In-memory store for tests and local development.
///
/// # Example
///
/// ```
/// use turnstile_testing::InMemoryRegistrationStore;
/// use turnstile_core::{Event, EventId, NewEvent, RegistrationStore, Utc};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryRegistrationStore::new();
/// let event = Event::create(
///     EventId::new(),
///     NewEvent { title: "Meetup".into(), max_attendees: 2, opens_at: None },
///     Utc::now(),
/// );
/// store.insert_event(event.clone()).await?;
///
/// let mut tx = store.begin().await?;
/// assert!(tx.try_admit(event.id).await?.admitted());
/// tx.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryRegistrationStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commits: Arc<AtomicBool>,
}

impl InMemoryRegistrationStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail with [`StoreError::Database`].
    ///
    /// Used to check that a failed commit leaves no partial state behind.
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commits.store(fail, Ordering::SeqCst);
    }

    /// Number of registrations in a given status for an event.
    pub async fn count_in_status(&self, event_id: EventId, status: RegistrationStatus) -> usize {
        self.state
            .lock()
            .await
            .registrations
            .values()
            .filter(|r| r.event_id == event_id && r.status == status)
            .count()
    }
}

impl RegistrationStore for InMemoryRegistrationStore {
    fn begin(&self) -> BoxFuture<'_, Result<Box<dyn StoreTransaction>, StoreError>> {
        Box::pin(async move {
            let guard = Arc::clone(&self.state).lock_owned().await;
            let staged = guard.clone();
            let fail_commit = self.fail_commits.load(Ordering::SeqCst);
            Ok(Box::new(MemoryTransaction {
                guard,
                staged,
                fail_commit,
            }) as Box<dyn StoreTransaction>)
        })
    }

    fn insert_event(&self, event: Event) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            self.state.lock().await.events.insert(event.id, event);
            Ok(())
        })
    }

    fn load_event(&self, event_id: EventId) -> BoxFuture<'_, Result<Option<Event>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().await.events.get(&event_id).cloned()) })
    }

    fn load_registration(
        &self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().await.registrations.get(&id).cloned()) })
    }

    fn find_active(
        &self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().await.find_active(event_id, &identity_key)) })
    }

    fn list_registrations(
        &self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Vec<Registration>, StoreError>> {
        Box::pin(async move { Ok(self.state.lock().await.registrations_of(event_id)) })
    }

    fn ping(&self) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move { Ok(()) })
    }
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    fail_commit: bool,
}

impl StoreTransaction for MemoryTransaction {
    fn lock_event(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Option<Event>, StoreError>> {
        // The whole store is already locked for this transaction.
        Box::pin(async move { Ok(self.staged.events.get(&event_id).cloned()) })
    }

    fn try_admit(&mut self, event_id: EventId) -> BoxFuture<'_, Result<AdmitResult, StoreError>> {
        Box::pin(async move {
            let event = self.staged.event_mut(event_id)?;
            if event.status.is_terminal() || event.current_attendees >= event.max_attendees {
                return Ok(AdmitResult::Full);
            }
            event.current_attendees += 1;
            event.status = event
                .status
                .derive(event.current_attendees, event.max_attendees);
            Ok(AdmitResult::Admitted(snapshot(event)))
        })
    }

    fn release(&mut self, event_id: EventId) -> BoxFuture<'_, Result<LedgerSnapshot, StoreError>> {
        Box::pin(async move {
            let event = self.staged.event_mut(event_id)?;
            event.current_attendees = event.current_attendees.saturating_sub(1);
            event.status = event
                .status
                .derive(event.current_attendees, event.max_attendees);
            Ok(snapshot(event))
        })
    }

    fn set_capacity(
        &mut self,
        event_id: EventId,
        max_attendees: u32,
    ) -> BoxFuture<'_, Result<Option<LedgerSnapshot>, StoreError>> {
        Box::pin(async move {
            let event = self.staged.event_mut(event_id)?;
            if max_attendees < event.current_attendees {
                return Ok(None);
            }
            event.max_attendees = max_attendees;
            event.status = event.status.derive(event.current_attendees, max_attendees);
            Ok(Some(snapshot(event)))
        })
    }

    fn set_event_status(
        &mut self,
        event_id: EventId,
        status: EventStatus,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let event = self.staged.event_mut(event_id)?;
            event.status = status.derive(event.current_attendees, event.max_attendees);
            Ok(())
        })
    }

    fn find_active(
        &mut self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move { Ok(self.staged.find_active(event_id, &identity_key)) })
    }

    fn load_registration(
        &mut self,
        id: RegistrationId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move { Ok(self.staged.registrations.get(&id).cloned()) })
    }

    fn earliest_waitlisted(
        &mut self,
        event_id: EventId,
    ) -> BoxFuture<'_, Result<Option<Registration>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .staged
                .registrations
                .values()
                .filter(|r| r.event_id == event_id && r.status == RegistrationStatus::Waitlisted)
                .min_by_key(|r| (r.registered_at, r.id))
                .cloned())
        })
    }

    fn insert_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if registration.status.is_active()
                && self
                    .staged
                    .find_active(registration.event_id, &registration.identity_key)
                    .is_some()
            {
                return Err(StoreError::DuplicateActive {
                    event_id: registration.event_id,
                    identity_key: registration.identity_key,
                });
            }
            self.staged
                .registrations
                .insert(registration.id, registration);
            Ok(())
        })
    }

    fn update_registration(
        &mut self,
        registration: Registration,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            match self.staged.registrations.get_mut(&registration.id) {
                Some(existing) => {
                    existing.status = registration.status;
                    existing.cancelled_at = registration.cancelled_at;
                    Ok(())
                }
                None => Err(StoreError::registration_not_found(registration.id)),
            }
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, Result<(), StoreError>> {
        Box::pin(async move {
            let MemoryTransaction {
                mut guard,
                staged,
                fail_commit,
            } = *self;
            if fail_commit {
                return Err(StoreError::Database("injected commit failure".to_string()));
            }
            *guard = staged;
            Ok(())
        })
    }
}
