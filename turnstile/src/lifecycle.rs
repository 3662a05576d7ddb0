//! Registration state machine.
//!
//! ```text
//!              ┌──── promote (slot consumed) ────┐
//!              │                                 ▼
//!   waitlisted ┤                            registered ──── mark attended ───► attended
//!              │                                 │
//!              └──── cancel ──► cancelled ◄──── cancel (slot released)
//! ```
//!
//! Transition rules are pure. Callers pair a [`SlotEffect`] with the matching
//! [`crate::ledger::CapacityLedger`] call inside the same transaction.

use crate::error::RegistrationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{Actor, Registration, RegistrationStatus};

/// A requested status change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Move to `cancelled`
    Cancel,
    /// Move from `waitlisted` to `registered`
    Promote,
    /// Move from `registered` to `attended`
    MarkAttended,
}

impl Transition {
    /// Status the registration ends up in
    #[must_use]
    pub const fn target(self) -> RegistrationStatus {
        match self {
            Self::Cancel => RegistrationStatus::Cancelled,
            Self::Promote => RegistrationStatus::Registered,
            Self::MarkAttended => RegistrationStatus::Attended,
        }
    }

    /// Stable label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Promote => "promote",
            Self::MarkAttended => "mark_attended",
        }
    }
}

/// What a transition does to the event's counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotEffect {
    /// One slot must be returned to the ledger
    Released,
    /// One slot must be taken from the ledger
    Consumed,
    /// The counter is unchanged
    Neutral,
}

/// Check whether `transition` is allowed from `from`.
///
/// # Errors
///
/// - [`RegistrationError::AlreadyCancelled`] when cancelling a cancelled registration
/// - [`RegistrationError::InvalidTransition`] for every other undefined edge
pub fn check(from: RegistrationStatus, transition: Transition) -> Result<SlotEffect, RegistrationError> {
    use RegistrationStatus::{Attended, Cancelled, Registered, Waitlisted};

    match (from, transition) {
        (Registered, Transition::Cancel) => Ok(SlotEffect::Released),
        (Waitlisted, Transition::Cancel) | (Registered, Transition::MarkAttended) => {
            Ok(SlotEffect::Neutral)
        }
        (Waitlisted, Transition::Promote) => Ok(SlotEffect::Consumed),
        (Cancelled, Transition::Cancel) => Err(RegistrationError::AlreadyCancelled),
        (Attended | Cancelled | Registered | Waitlisted, _) => {
            Err(RegistrationError::InvalidTransition {
                from,
                to: transition.target(),
            })
        }
    }
}

/// Apply `transition` to `registration`.
///
/// Sets `cancelled_at` on cancellation. The registration is left unchanged on error.
///
/// # Errors
///
/// Same as [`check`].
pub fn apply(
    registration: &mut Registration,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<SlotEffect, RegistrationError> {
    let effect = check(registration.status, transition)?;
    registration.status = transition.target();
    if transition == Transition::Cancel {
        registration.cancelled_at = Some(now);
    }
    Ok(effect)
}

/// Check that `actor` may perform `transition` on `registration`.
///
/// Owners and admins may cancel. Only admins may promote or mark attendance.
///
/// # Errors
///
/// Returns [`RegistrationError::Unauthorized`] otherwise.
pub fn authorize(
    actor: &Actor,
    registration: &Registration,
    transition: Transition,
) -> Result<(), RegistrationError> {
    let allowed = match transition {
        Transition::Cancel => actor.is_admin() || actor.owns(&registration.identity_key),
        Transition::Promote | Transition::MarkAttended => actor.is_admin(),
    };
    if allowed {
        Ok(())
    } else {
        Err(RegistrationError::Unauthorized)
    }
}
