//! Domain types for event capacity accounting.
//!
//! This module contains the identifiers, value objects and entities shared by the
//! store implementations and the service layer: [`Event`] with its ledger fields,
//! [`Registration`] with its lifecycle status, and the [`Subject`]/[`IdentityKey`]
//! pair used for duplicate detection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a registration
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(Uuid);

impl RegistrationId {
    /// Creates a new random `RegistrationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `RegistrationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Authenticated user identifier, supplied by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Input rejected before any store access.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Guest name is empty or whitespace
    #[error("guest name must not be blank")]
    BlankName,

    /// Guest email is not of the form `local@domain`
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// Event capacity must be at least one slot
    #[error("max_attendees must be greater than 0")]
    ZeroCapacity,

    /// Event title is empty or whitespace
    #[error("event title must not be blank")]
    BlankTitle,

    /// Bulk request carried no registration ids
    #[error("bulk operation requires at least one registration id")]
    EmptyBatch,

    /// Bulk request exceeded the configured batch limit
    #[error("bulk operation accepts at most {limit} registration ids, got {actual}")]
    BatchTooLarge {
        /// Configured maximum
        limit: usize,
        /// Ids supplied
        actual: usize,
    },
}

/// Normalize an email address for identity comparison.
///
/// Trims surrounding whitespace and lower-cases the whole address.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidEmail`] unless the address has exactly one `@`
/// with non-empty text on both sides and no inner whitespace.
pub fn normalize_email(raw: &str) -> Result<String, ValidationError> {
    let email = raw.trim().to_lowercase();
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.contains(char::is_whitespace)
        }
        _ => false,
    };

    if valid {
        Ok(email)
    } else {
        Err(ValidationError::InvalidEmail(raw.trim().to_string()))
    }
}

// ============================================================================
// Subjects and identity
// ============================================================================

/// Normalized duplicate-registration key.
///
/// For users this is the user id; for guests it is the lower-cased email. The two
/// spaces cannot collide because UUID text never contains `@`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Identity key for an authenticated user
    #[must_use]
    pub fn for_user(user_id: UserId) -> Self {
        Self(user_id.to_string())
    }

    /// Identity key for a guest email.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidEmail`] if the address is malformed.
    pub fn for_guest_email(email: &str) -> Result<Self, ValidationError> {
        normalize_email(email).map(Self)
    }

    /// Rebuild a key from its stored text form.
    #[must_use]
    pub fn from_stored(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the key text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contact details supplied by an unauthenticated registrant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestContact {
    /// Display name
    pub name: String,
    /// Email address (normalized on validation)
    pub email: String,
    /// Optional phone number
    pub phone: Option<String>,
}

impl GuestContact {
    /// Validate and normalize guest contact fields.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::BlankName`] or [`ValidationError::InvalidEmail`].
    pub fn new(
        name: impl Into<String>,
        email: &str,
        phone: Option<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::BlankName);
        }
        let email = normalize_email(email)?;
        let phone = phone
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(Self { name, email, phone })
    }
}

/// Who a registration is for. Immutable after creation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    /// Authenticated user
    User {
        /// User id from the identity provider
        user_id: UserId,
    },
    /// Guest registrant identified by contact details
    Guest(GuestContact),
}

impl Subject {
    /// Subject for an authenticated user
    #[must_use]
    pub const fn user(user_id: UserId) -> Self {
        Self::User { user_id }
    }

    /// Subject for a guest, validating the contact fields.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a blank name or malformed email.
    pub fn guest(
        name: impl Into<String>,
        email: &str,
        phone: Option<String>,
    ) -> Result<Self, ValidationError> {
        GuestContact::new(name, email, phone).map(Self::Guest)
    }

    /// Duplicate-detection key for this subject.
    ///
    /// Guest emails are normalized on construction, so this is infallible.
    #[must_use]
    pub fn identity_key(&self) -> IdentityKey {
        match self {
            Self::User { user_id } => IdentityKey::for_user(*user_id),
            Self::Guest(contact) => IdentityKey(contact.email.to_lowercase()),
        }
    }
}

/// Caller performing a lifecycle operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    /// Authenticated non-admin user
    User(UserId),
    /// Unauthenticated guest proving ownership by email
    Guest {
        /// Email the guest registered with
        email: String,
    },
    /// Administrator
    Admin(UserId),
}

impl Actor {
    /// Whether the actor holds admin rights
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// Whether the actor owns a registration with the given identity key.
    ///
    /// Admins own only registrations made under their own user id.
    #[must_use]
    pub fn owns(&self, identity_key: &IdentityKey) -> bool {
        match self {
            Self::User(user_id) | Self::Admin(user_id) => {
                IdentityKey::for_user(*user_id) == *identity_key
            }
            Self::Guest { email } => {
                IdentityKey::for_guest_email(email).is_ok_and(|key| key == *identity_key)
            }
        }
    }
}

// ============================================================================
// Event
// ============================================================================

/// Lifecycle status of an event.
///
/// `Full` and `RegistrationOpen` are derived from the ledger counters; `Completed`
/// and `Cancelled` are terminal and override the capacity-derived value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventStatus {
    /// Registration has not opened yet
    Upcoming,
    /// Accepting registrations with free slots
    RegistrationOpen,
    /// Accepting registrations onto the waitlist only
    Full,
    /// Event took place (terminal)
    Completed,
    /// Event was called off (terminal)
    Cancelled,
}

impl EventStatus {
    /// Whether the status is terminal (`Completed` or `Cancelled`)
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Recompute the capacity-derived status after a counter change.
    ///
    /// Terminal and `Upcoming` statuses are preserved; otherwise the result is
    /// `Full` iff `current >= max`.
    #[must_use]
    pub const fn derive(self, current: u32, max: u32) -> Self {
        match self {
            Self::Upcoming | Self::Completed | Self::Cancelled => self,
            Self::RegistrationOpen | Self::Full => {
                if current >= max {
                    Self::Full
                } else {
                    Self::RegistrationOpen
                }
            }
        }
    }

    /// Stable text form used by stores and the HTTP layer
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upcoming => "upcoming",
            Self::RegistrationOpen => "registration-open",
            Self::Full => "full",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upcoming" => Ok(Self::Upcoming),
            "registration-open" => Ok(Self::RegistrationOpen),
            "full" => Ok(Self::Full),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown event status: {other}")),
        }
    }
}

/// Parameters for creating an event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event title
    pub title: String,
    /// Capacity in slots
    pub max_attendees: u32,
    /// When registration opens (`None` = immediately)
    pub opens_at: Option<DateTime<Utc>>,
}

/// An event together with the ledger fields owned by this subsystem.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event id
    pub id: EventId,
    /// Event title (metadata, owned externally)
    pub title: String,
    /// Capacity in slots
    pub max_attendees: u32,
    /// Registrations currently holding a slot
    pub current_attendees: u32,
    /// Stored status (see [`Event::effective_status`])
    pub status: EventStatus,
    /// When registration opens
    pub opens_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Build a fresh event with an empty ledger.
    ///
    /// The event starts `Upcoming` if `opens_at` lies after `now`, otherwise
    /// `RegistrationOpen`.
    #[must_use]
    pub fn create(id: EventId, new_event: NewEvent, now: DateTime<Utc>) -> Self {
        let status = match new_event.opens_at {
            Some(opens_at) if opens_at > now => EventStatus::Upcoming,
            _ => EventStatus::RegistrationOpen,
        };
        Self {
            id,
            title: new_event.title,
            max_attendees: new_event.max_attendees,
            current_attendees: 0,
            status,
            opens_at: new_event.opens_at,
            created_at: now,
        }
    }

    /// Status as observed at `now`.
    ///
    /// An `Upcoming` event whose open time has passed is reported as
    /// `RegistrationOpen` or `Full` according to its counters.
    #[must_use]
    pub fn effective_status(&self, now: DateTime<Utc>) -> EventStatus {
        match (self.status, self.opens_at) {
            (EventStatus::Upcoming, Some(opens_at)) if opens_at <= now => {
                EventStatus::RegistrationOpen.derive(self.current_attendees, self.max_attendees)
            }
            (status, _) => status,
        }
    }

    /// Whether a registration request may be accepted at `now`
    #[must_use]
    pub fn accepts_registrations(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.effective_status(now),
            EventStatus::RegistrationOpen | EventStatus::Full
        )
    }

    /// Slots not currently consumed
    #[must_use]
    pub const fn free_slots(&self) -> u32 {
        self.max_attendees.saturating_sub(self.current_attendees)
    }
}

// ============================================================================
// Registration
// ============================================================================

/// Lifecycle status of a registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    /// Holding a counted slot
    Registered,
    /// Queued for a slot
    Waitlisted,
    /// Withdrawn (terminal)
    Cancelled,
    /// Checked in by an admin (terminal, still counted)
    Attended,
}

impl RegistrationStatus {
    /// Whether the registration blocks a new one for the same identity
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Registered | Self::Waitlisted)
    }

    /// Whether no further transitions are defined
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Attended)
    }

    /// Stable text form used by stores and the HTTP layer
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Waitlisted => "waitlisted",
            Self::Cancelled => "cancelled",
            Self::Attended => "attended",
        }
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registered" => Ok(Self::Registered),
            "waitlisted" => Ok(Self::Waitlisted),
            "cancelled" => Ok(Self::Cancelled),
            "attended" => Ok(Self::Attended),
            other => Err(format!("unknown registration status: {other}")),
        }
    }
}

/// One subject's registration for one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// Registration id
    pub id: RegistrationId,
    /// Owning event (immutable)
    pub event_id: EventId,
    /// Registrant (immutable)
    pub subject: Subject,
    /// Normalized dedup key derived from `subject`
    pub identity_key: IdentityKey,
    /// Current lifecycle status
    pub status: RegistrationStatus,
    /// Creation time; defines waitlist FIFO order
    pub registered_at: DateTime<Utc>,
    /// Set on the transition into `Cancelled`
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Registration {
    /// Create a registration in its initial status.
    #[must_use]
    pub fn new(
        id: RegistrationId,
        event_id: EventId,
        subject: Subject,
        status: RegistrationStatus,
        registered_at: DateTime<Utc>,
    ) -> Self {
        let identity_key = subject.identity_key();
        Self {
            id,
            event_id,
            subject,
            identity_key,
            status,
            registered_at,
            cancelled_at: None,
        }
    }
}

/// Answer to "is this identity registered for this event?".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationLookup {
    /// Holds a slot
    Registered,
    /// Queued for a slot
    Waitlisted,
    /// No active registration
    None,
}

impl From<Option<&Registration>> for RegistrationLookup {
    fn from(registration: Option<&Registration>) -> Self {
        match registration.map(|r| r.status) {
            Some(RegistrationStatus::Registered) => Self::Registered,
            Some(RegistrationStatus::Waitlisted) => Self::Waitlisted,
            _ => Self::None,
        }
    }
}
