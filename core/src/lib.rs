//! # Turnstile Core
//!
//! Domain types and storage abstractions for event capacity accounting and
//! waitlist promotion.
//!
//! An event has a fixed number of slots (`max_attendees`). Registrations either
//! consume a slot (`registered`) or queue for one (`waitlisted`). The counter of
//! consumed slots (`current_attendees`) is shared by every concurrent request that
//! touches the event, so all mutation of it goes through the atomic primitives of
//! [`store::StoreTransaction`].
//!
//! ## Core Concepts
//!
//! - **Event**: owns the ledger fields `max_attendees`, `current_attendees` and the
//!   derived [`EventStatus`]
//! - **Registration**: one subject's claim on an event, moving through
//!   [`RegistrationStatus`]
//! - **Identity key**: normalized dedup key (user id or lower-cased guest email)
//! - **Store**: unit-of-work abstraction; ledger and registration writes made
//!   through one transaction commit together or not at all
//! - **Environment**: [`environment::Clock`] and [`notify::Notifier`] are injected
//!   so the service layer stays deterministic under test
//!
//! ## Implementations
//!
//! - `PostgresRegistrationStore` (in `turnstile-postgres`): production store
//! - `InMemoryRegistrationStore` (in `turnstile-testing`): fast, deterministic tests

pub mod notify;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use notify::{Notification, NotificationKind, Notifier, NotifyError};
pub use store::{
    AdmitResult, BoxFuture, LedgerSnapshot, RegistrationStore, StoreError, StoreTransaction,
};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// All time-dependent behavior reads the clock through this trait so that tests
/// can pin or step time explicitly.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Registration timestamps define waitlist FIFO order, so tests that assert on
    /// promotion order inject a clock that advances between calls.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
