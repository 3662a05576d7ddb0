//! HTTP API handlers, organized by resource:
//! - Events: creation, capacity and lifecycle (admin)
//! - Registrations: register, status checks, cancel, attendance
//! - Admin: bulk operations

pub mod admin;
pub mod caller;
pub mod error;
pub mod events;
pub mod registrations;

pub use caller::Caller;
pub use error::AppError;
