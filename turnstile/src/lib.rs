//! # Turnstile
//!
//! Event registration with capacity accounting and FIFO waitlist promotion.
//!
//! Each event has a fixed number of slots. A registration either takes a slot
//! (`registered`) or queues for one (`waitlisted`). When a slot frees up, the
//! earliest waitlisted registration is promoted into it in the same transaction
//! that released it, so the counter never exceeds capacity and never drifts from
//! the registrations that hold a slot.
//!
//! ## Architecture
//!
//! - [`ledger::CapacityLedger`]: the only code that mutates `current_attendees`
//! - [`admission::AdmissionController`]: registered vs waitlisted
//! - [`lifecycle`]: the registration state machine
//! - [`promoter::WaitlistPromoter`]: FIFO promotion into freed slots
//! - [`bulk::BulkCoordinator`]: admin actions over many registrations
//! - [`service::RegistrationService`]: facade used by the HTTP layer
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use turnstile::{RegistrationService, TracingNotifier};
//! use turnstile_core::environment::SystemClock;
//! use turnstile_testing::InMemoryRegistrationStore;
//!
//! let service = RegistrationService::new(
//!     Arc::new(InMemoryRegistrationStore::new()),
//!     Arc::new(SystemClock),
//!     Arc::new(TracingNotifier),
//! );
//! let registration = service.register(event_id, Subject::user(user_id)).await?;
//! ```

pub mod admission;
pub mod api;
pub mod bulk;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod metrics;
pub mod notifier;
pub mod promoter;
pub mod server;
pub mod service;

pub use bulk::{BulkAction, BulkItemOutcome, BulkItemResult, BulkReport, BulkRequest};
pub use config::Config;
pub use error::RegistrationError;
pub use ledger::{CapacityLedger, LedgerReport};
pub use notifier::TracingNotifier;
pub use service::{
    CancelOutcome, CapacityChange, ClosingStatus, RegistrationService, ServiceSettings,
};
