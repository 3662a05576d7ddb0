//! Admission controller.
//!
//! Decides whether a new registration is `registered` or `waitlisted`. Runs
//! inside a transaction that already holds the event lock, so the duplicate
//! check, the eligibility check and the admit see the same state.

use crate::error::RegistrationError;
use crate::ledger::CapacityLedger;
use chrono::{DateTime, Utc};
use turnstile_core::{
    AdmitResult, EventId, EventStatus, Registration, RegistrationId, RegistrationStatus,
    StoreTransaction, Subject,
};

/// Admission decisions for new registrations.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmissionController;

impl AdmissionController {
    /// Create and persist a registration for `subject` on `event_id`.
    ///
    /// The order is fixed: lock the event, reject a duplicate identity, reject an
    /// event that is not open, then ask the ledger for a slot. A refused admit
    /// waitlists the registration instead of failing.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateRegistration`] if the identity already has
    ///   an active registration
    /// - [`RegistrationError::EventUnavailable`] if the event is missing, upcoming
    ///   or closed
    /// - [`RegistrationError::Store`] on infrastructure failure
    pub async fn admit(
        tx: &mut dyn StoreTransaction,
        registration_id: RegistrationId,
        event_id: EventId,
        subject: Subject,
        now: DateTime<Utc>,
    ) -> Result<Registration, RegistrationError> {
        let event = tx.lock_event(event_id).await?;

        let identity_key = subject.identity_key();
        if tx.find_active(event_id, identity_key.clone()).await?.is_some() {
            tracing::debug!(%event_id, identity = %identity_key, "Duplicate registration rejected");
            return Err(RegistrationError::DuplicateRegistration);
        }

        let Some(event) = event else {
            return Err(RegistrationError::EventUnavailable);
        };
        if !event.accepts_registrations(now) {
            tracing::debug!(%event_id, status = %event.status, "Event not accepting registrations");
            return Err(RegistrationError::EventUnavailable);
        }
        if event.status == EventStatus::Upcoming {
            // opens_at has passed; persist the open status before counting
            tx.set_event_status(event_id, EventStatus::RegistrationOpen)
                .await?;
        }

        let status = match CapacityLedger::try_admit(tx, event_id).await? {
            AdmitResult::Admitted(_) => RegistrationStatus::Registered,
            AdmitResult::Full => RegistrationStatus::Waitlisted,
        };

        let registration = Registration::new(registration_id, event_id, subject, status, now);
        tx.insert_registration(registration.clone()).await?;

        tracing::info!(
            %event_id,
            registration_id = %registration.id,
            status = %registration.status,
            "Registration created"
        );
        Ok(registration)
    }
}
