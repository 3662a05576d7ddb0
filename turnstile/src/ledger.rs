//! Capacity ledger.
//!
//! The only code that changes `current_attendees`. Every mutation is a single
//! conditional store primitive issued inside the caller's transaction, so the
//! counter and the registration rows written alongside it commit together.

use crate::metrics;
use serde::Serialize;
use turnstile_core::{
    AdmitResult, Event, EventId, EventStatus, LedgerSnapshot, Registration, RegistrationStatus,
    StoreError, StoreTransaction,
};

/// Atomic slot accounting for one event at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapacityLedger;

impl CapacityLedger {
    /// Consume one slot if one is free.
    ///
    /// Returns [`AdmitResult::Full`] without touching the counter when the event is
    /// at capacity or closed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown event, or a database error.
    pub async fn try_admit(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
    ) -> Result<AdmitResult, StoreError> {
        let result = tx.try_admit(event_id).await?;
        match &result {
            AdmitResult::Admitted(snapshot) => {
                tracing::debug!(
                    %event_id,
                    current = snapshot.current_attendees,
                    max = snapshot.max_attendees,
                    status = %snapshot.status,
                    "Slot admitted"
                );
                metrics::record_free_slots(event_id, snapshot);
            }
            AdmitResult::Full => {
                tracing::debug!(%event_id, "Admit refused, no free slot");
                metrics::record_admission_rejected();
            }
        }
        Ok(result)
    }

    /// Return one slot. The counter never goes below zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown event, or a database error.
    pub async fn release(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
    ) -> Result<LedgerSnapshot, StoreError> {
        let snapshot = tx.release(event_id).await?;
        tracing::debug!(
            %event_id,
            current = snapshot.current_attendees,
            max = snapshot.max_attendees,
            status = %snapshot.status,
            "Slot released"
        );
        metrics::record_free_slots(event_id, &snapshot);
        Ok(snapshot)
    }

    /// Return `count` slots, one conditional decrement per slot.
    ///
    /// Returns `None` when `count` is zero.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown event, or a database error.
    pub async fn release_many(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        count: u32,
    ) -> Result<Option<LedgerSnapshot>, StoreError> {
        let mut last = None;
        for _ in 0..count {
            last = Some(Self::release(tx, event_id).await?);
        }
        Ok(last)
    }
}

/// Reconciliation of an event's counter against its registrations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    /// Event id
    pub event_id: EventId,
    /// Capacity in slots
    pub max_attendees: u32,
    /// Stored counter
    pub current_attendees: u32,
    /// Registrations holding a slot (`registered` or `attended`)
    pub counted: u32,
    /// Registrations queued for a slot
    pub waitlisted: u32,
    /// Status as observed now
    pub status: EventStatus,
    /// Whether `current_attendees == counted`
    pub consistent: bool,
}

impl LedgerReport {
    /// Compare the stored counter with the registrations that hold a slot.
    #[must_use]
    pub fn reconcile(event: &Event, registrations: &[Registration], status: EventStatus) -> Self {
        let count = |wanted: &[RegistrationStatus]| {
            let n = registrations
                .iter()
                .filter(|r| wanted.contains(&r.status))
                .count();
            u32::try_from(n).unwrap_or(u32::MAX)
        };
        let counted = count(&[RegistrationStatus::Registered, RegistrationStatus::Attended]);
        let waitlisted = count(&[RegistrationStatus::Waitlisted]);

        Self {
            event_id: event.id,
            max_attendees: event.max_attendees,
            current_attendees: event.current_attendees,
            counted,
            waitlisted,
            status,
            consistent: counted == event.current_attendees,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;
    use turnstile_core::{NewEvent, RegistrationId, RegistrationStore, Subject, UserId};
    use turnstile_testing::{InMemoryRegistrationStore, test_clock};
    use turnstile_core::environment::Clock;

    async fn store_with_event(max_attendees: u32) -> (InMemoryRegistrationStore, EventId) {
        let store = InMemoryRegistrationStore::new();
        let event = Event::create(
            EventId::new(),
            NewEvent {
                title: "Ledger".to_string(),
                max_attendees,
                opens_at: None,
            },
            test_clock().now(),
        );
        let id = event.id;
        store.insert_event(event).await.expect("insert event");
        (store, id)
    }

    #[tokio::test]
    async fn admits_until_full_then_refuses() {
        let (store, event_id) = store_with_event(1).await;
        let mut tx = store.begin().await.expect("begin");

        let first = CapacityLedger::try_admit(tx.as_mut(), event_id).await.expect("admit");
        assert!(first.admitted());
        let second = CapacityLedger::try_admit(tx.as_mut(), event_id).await.expect("admit");
        assert_eq!(second, AdmitResult::Full);
    }

    #[tokio::test]
    async fn release_many_returns_each_slot() {
        let (store, event_id) = store_with_event(3).await;
        let mut tx = store.begin().await.expect("begin");
        for _ in 0..3 {
            CapacityLedger::try_admit(tx.as_mut(), event_id).await.expect("admit");
        }

        let snapshot = CapacityLedger::release_many(tx.as_mut(), event_id, 2)
            .await
            .expect("release")
            .expect("snapshot");
        assert_eq!(snapshot.current_attendees, 1);
        assert_eq!(snapshot.status, EventStatus::RegistrationOpen);

        let none = CapacityLedger::release_many(tx.as_mut(), event_id, 0)
            .await
            .expect("release");
        assert!(none.is_none());
    }

    #[test]
    fn reconcile_counts_attended_as_holding_a_slot() {
        let now = test_clock().now();
        let mut event = Event::create(
            EventId::new(),
            NewEvent {
                title: "Ledger".to_string(),
                max_attendees: 5,
                opens_at: None,
            },
            now,
        );
        event.current_attendees = 2;

        let registration = |status| {
            Registration::new(
                RegistrationId::new(),
                event.id,
                Subject::user(UserId::new()),
                status,
                now,
            )
        };
        let registrations = vec![
            registration(RegistrationStatus::Registered),
            registration(RegistrationStatus::Attended),
            registration(RegistrationStatus::Waitlisted),
            registration(RegistrationStatus::Cancelled),
        ];

        let report = LedgerReport::reconcile(&event, &registrations, event.status);
        assert_eq!(report.counted, 2);
        assert_eq!(report.waitlisted, 1);
        assert!(report.consistent);
    }
}
