//! Error types for registration operations.

use thiserror::Error;
use turnstile_core::{EventId, RegistrationId, RegistrationStatus, StoreError, ValidationError};

/// Errors returned by [`crate::RegistrationService`] operations.
///
/// Business failures (everything except [`RegistrationError::Store`]) leave the
/// store untouched: the transaction they occurred in is dropped before commit.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// Malformed input, rejected before any store access
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Referenced event or registration does not exist
    #[error("{resource} {id} not found")]
    NotFound {
        /// Resource kind ("event" or "registration")
        resource: &'static str,
        /// Requested id
        id: String,
    },

    /// The identity already holds an active registration for the event
    #[error("an active registration already exists for this identity")]
    DuplicateRegistration,

    /// The event is not accepting registrations
    #[error("event is not accepting registrations")]
    EventUnavailable,

    /// The caller may not perform the operation
    #[error("not authorized to perform this operation")]
    Unauthorized,

    /// Cancel requested for a registration that is already cancelled
    #[error("registration is already cancelled")]
    AlreadyCancelled,

    /// The registration status does not allow the requested transition
    #[error("cannot move registration from {from} to {to}")]
    InvalidTransition {
        /// Current status
        from: RegistrationStatus,
        /// Requested target status
        to: RegistrationStatus,
    },

    /// New capacity would fall below the slots already consumed
    #[error("capacity {requested} is below current attendance {current}")]
    CapacityBelowAttendance {
        /// Slots currently consumed
        current: u32,
        /// Capacity that was requested
        requested: u32,
    },

    /// Admin promotion found no free slot
    #[error("event has no free slot")]
    EventFull,

    /// Event already reached a terminal status
    #[error("event is already closed")]
    EventClosed,

    /// Infrastructure failure
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { resource, id } => Self::NotFound { resource, id },
            StoreError::DuplicateActive { .. } => Self::DuplicateRegistration,
            other => Self::Store(other),
        }
    }
}

impl RegistrationError {
    /// Stable machine-readable code, used in bulk reports and HTTP bodies
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::DuplicateRegistration => "DUPLICATE_REGISTRATION",
            Self::EventUnavailable => "EVENT_UNAVAILABLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AlreadyCancelled => "ALREADY_CANCELLED",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::CapacityBelowAttendance { .. } => "CAPACITY_BELOW_ATTENDANCE",
            Self::EventFull => "EVENT_FULL",
            Self::EventClosed => "EVENT_CLOSED",
            Self::Store(_) => "STORE_ERROR",
        }
    }

    pub(crate) fn event_not_found(event_id: EventId) -> Self {
        StoreError::event_not_found(event_id).into()
    }

    pub(crate) fn registration_not_found(id: RegistrationId) -> Self {
        StoreError::registration_not_found(id).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnstile_core::IdentityKey;

    #[test]
    fn duplicate_store_error_maps_to_duplicate_registration() {
        let err = RegistrationError::from(StoreError::DuplicateActive {
            event_id: EventId::new(),
            identity_key: IdentityKey::from_stored("a@example.com"),
        });
        assert!(matches!(err, RegistrationError::DuplicateRegistration));
    }

    #[test]
    fn database_error_stays_a_store_error() {
        let err = RegistrationError::from(StoreError::Database("boom".to_string()));
        assert_eq!(err.code(), "STORE_ERROR");
    }

    #[test]
    fn transition_error_names_both_statuses() {
        let err = RegistrationError::InvalidTransition {
            from: RegistrationStatus::Attended,
            to: RegistrationStatus::Cancelled,
        };
        assert_eq!(err.to_string(), "cannot move registration from attended to cancelled");
    }
}
