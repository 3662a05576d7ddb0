//! Waitlist promoter.
//!
//! Fills freed slots from the waitlist in `registered_at` order. One slot is
//! handled at a time: pick the earliest waitlisted registration, ask the ledger
//! for a slot, and only then flip the registration to `registered`. If the
//! ledger refuses, the candidate stays waitlisted.

use crate::error::RegistrationError;
use crate::ledger::CapacityLedger;
use crate::lifecycle::{self, Transition};
use chrono::{DateTime, Utc};
use turnstile_core::{AdmitResult, EventId, Registration, StoreTransaction};

/// FIFO promotion from the waitlist.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaitlistPromoter;

impl WaitlistPromoter {
    /// Promote the earliest waitlisted registration into one free slot.
    ///
    /// Returns `None` when the waitlist is empty or the ledger has no free slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] on infrastructure failure.
    pub async fn promote_next(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, RegistrationError> {
        let Some(candidate) = tx.earliest_waitlisted(event_id).await? else {
            tracing::debug!(%event_id, "Waitlist empty, nothing to promote");
            return Ok(None);
        };
        Self::promote(tx, candidate, now).await
    }

    /// Fill up to `slots` freed slots, one at a time, in FIFO order.
    ///
    /// Stops early when the waitlist runs out or the ledger refuses an admit.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] on infrastructure failure.
    pub async fn fill_freed_slots(
        tx: &mut dyn StoreTransaction,
        event_id: EventId,
        slots: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Registration>, RegistrationError> {
        let mut promoted = Vec::new();
        for _ in 0..slots {
            match Self::promote_next(tx, event_id, now).await? {
                Some(registration) => promoted.push(registration),
                None => break,
            }
        }
        if !promoted.is_empty() {
            tracing::info!(%event_id, count = promoted.len(), "Waitlist promoted");
        }
        Ok(promoted)
    }

    /// Promote a specific waitlisted registration, bypassing FIFO order.
    ///
    /// Used for explicit admin promotion. Returns `None` if the ledger has no
    /// free slot.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::InvalidTransition`] if the registration is not waitlisted
    /// - [`RegistrationError::Store`] on infrastructure failure
    pub async fn promote(
        tx: &mut dyn StoreTransaction,
        mut candidate: Registration,
        now: DateTime<Utc>,
    ) -> Result<Option<Registration>, RegistrationError> {
        lifecycle::check(candidate.status, Transition::Promote)?;

        match CapacityLedger::try_admit(tx, candidate.event_id).await? {
            AdmitResult::Full => {
                tracing::debug!(
                    event_id = %candidate.event_id,
                    registration_id = %candidate.id,
                    "No free slot, candidate stays waitlisted"
                );
                Ok(None)
            }
            AdmitResult::Admitted(_) => {
                lifecycle::apply(&mut candidate, Transition::Promote, now)?;
                tx.update_registration(candidate.clone()).await?;
                tracing::info!(
                    event_id = %candidate.event_id,
                    registration_id = %candidate.id,
                    "Registration promoted from waitlist"
                );
                Ok(Some(candidate))
            }
        }
    }
}
