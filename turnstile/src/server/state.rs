//! Application state for the HTTP server.

use crate::service::RegistrationService;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; the service shares its environment through an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Registration operations
    pub service: RegistrationService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(service: RegistrationService) -> Self {
        Self { service }
    }
}
