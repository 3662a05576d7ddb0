//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{admin, events, registrations};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the complete Axum router.
///
/// Health checks live at the root; everything else is nested under `/api`.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Event administration
        .route("/events", post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/capacity", put(events::update_capacity))
        .route("/events/:id/close", post(events::close_event))
        .route("/events/:id/ledger", get(events::get_ledger))
        // Registrations
        .route(
            "/events/:id/registrations",
            post(registrations::register).get(events::list_registrations),
        )
        .route(
            "/events/:id/registration-status",
            get(registrations::registration_status),
        )
        .route("/registrations/:id", get(registrations::get_registration))
        .route(
            "/registrations/:id/cancel",
            post(registrations::cancel_registration),
        )
        .route("/registrations/:id/attend", post(registrations::mark_attended))
        .route(
            "/registrations/:id/promote",
            post(registrations::promote_registration),
        )
        // Admin
        .route(
            "/admin/registrations/bulk",
            post(admin::bulk_registrations),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .with_state(state)
}
