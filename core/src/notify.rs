//! Notification collaborator interface.
//!
//! Delivery is fire-and-forget from the registration subsystem's point of view:
//! a failed notification is logged by the caller and never undoes the state
//! transition that triggered it.

use crate::store::BoxFuture;
use crate::types::{EventId, RegistrationId, Subject};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What happened to a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// Admitted at registration time
    Registered,
    /// Placed on the waitlist at registration time
    Waitlisted,
    /// Moved from the waitlist into a slot
    Promoted,
    /// Cancelled by the registrant or an admin
    Cancelled,
}

/// Message handed to the notification dispatcher.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Kind of change
    pub kind: NotificationKind,
    /// Registration that changed
    pub registration_id: RegistrationId,
    /// Owning event
    pub event_id: EventId,
    /// Who to notify
    pub subject: Subject,
}

/// Delivery failure reported by a [`Notifier`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Notification dispatcher.
pub trait Notifier: Send + Sync {
    /// Send a notification.
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>>;
}
