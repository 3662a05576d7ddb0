//! Registration API endpoints.
//!
//! - POST /api/events/:id/registrations - Register the caller or a guest
//! - GET /api/events/:id/registration-status - Is an identity registered?
//! - GET /api/registrations/:id - Registration details (owner or admin)
//! - POST /api/registrations/:id/cancel - Cancel (owner or admin)
//! - POST /api/registrations/:id/attend - Mark attended (admin)
//! - POST /api/registrations/:id/promote - Promote from the waitlist (admin)
//!
//! # Registration Flow
//!
//! ```text
//! register ──► registered ──► attended
//!    │             │
//!    ▼             ▼
//! waitlisted ──► cancelled
//!    │
//!    └── slot freed ──► registered (FIFO)
//! ```

use super::caller::Caller;
use super::error::AppError;
use crate::error::RegistrationError;
use crate::server::state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{
    EventId, IdentityKey, Registration, RegistrationId, RegistrationLookup, RegistrationStatus,
    Subject, UserId,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Guest contact details for unauthenticated registration.
#[derive(Debug, Deserialize)]
pub struct GuestRequest {
    /// Display name
    pub name: String,
    /// Email address
    pub email: String,
    /// Optional phone number
    #[serde(default)]
    pub phone: Option<String>,
}

/// Request to register for an event.
///
/// Without `guest`, the authenticated caller is registered.
#[derive(Debug, Default, Deserialize)]
pub struct RegisterRequest {
    /// Guest contact details
    #[serde(default)]
    pub guest: Option<GuestRequest>,
}

/// Response after registering.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    /// Created registration ID
    pub registration_id: RegistrationId,
    /// `registered` or `waitlisted`
    pub status: RegistrationStatus,
}

/// Query for the registration status check.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// User id or guest email; defaults to the caller
    #[serde(default)]
    pub identity: Option<String>,
}

/// Registration status check response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Event ID
    pub event_id: EventId,
    /// `registered`, `waitlisted` or `none`
    pub status: RegistrationLookup,
}

/// Request to cancel a registration.
#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    /// Email the guest registered with (guests only)
    #[serde(default)]
    pub email: Option<String>,
}

/// Response after cancelling.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    /// Cancelled registration ID
    pub registration_id: RegistrationId,
    /// Always `cancelled`
    pub status: RegistrationStatus,
    /// Waitlist entry promoted into the released slot
    pub promoted_registration_id: Option<RegistrationId>,
}

/// Registration details response.
#[derive(Debug, Serialize)]
pub struct RegistrationResponse {
    /// Registration ID
    pub id: RegistrationId,
    /// Event ID
    pub event_id: EventId,
    /// Registrant
    pub subject: Subject,
    /// Current status
    pub status: RegistrationStatus,
    /// Creation time (waitlist position)
    pub registered_at: DateTime<Utc>,
    /// Cancellation time
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl From<Registration> for RegistrationResponse {
    fn from(r: Registration) -> Self {
        Self {
            id: r.id,
            event_id: r.event_id,
            subject: r.subject,
            status: r.status,
            registered_at: r.registered_at,
            cancelled_at: r.cancelled_at,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Register for an event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events/<event_id>/registrations \
///   -H "Content-Type: application/json" \
///   -d '{"guest": {"name": "Ada", "email": "ada@example.com"}}'
/// ```
///
/// Response (201):
/// ```json
/// {"registration_id": "...", "status": "waitlisted"}
/// ```
///
/// # Errors
///
/// Returns 409 for a duplicate registration or an event that is not open.
pub async fn register(
    caller: Caller,
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
    request: Option<Json<RegisterRequest>>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let subject = match (request.guest, caller.user_id) {
        (Some(guest), _) => Subject::guest(guest.name, &guest.email, guest.phone)
            .map_err(RegistrationError::from)?,
        (None, Some(user_id)) => Subject::user(user_id),
        (None, None) => {
            return Err(AppError::unauthorized(
                "Sign in or provide guest contact details",
            ));
        }
    };

    let registration = state.service.register(event_id, subject).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            registration_id: registration.id,
            status: registration.status,
        }),
    ))
}

/// Check whether an identity holds an active registration.
///
/// `identity` may be a user id or a guest email. Without it, the caller's
/// user id is checked.
///
/// # Errors
///
/// Returns 400 for a malformed identity and 401 if none can be determined.
pub async fn registration_status(
    caller: Caller,
    Path(event_id): Path<EventId>,
    Query(query): Query<StatusQuery>,
    State(state): State<AppState>,
) -> Result<Json<StatusResponse>, AppError> {
    let identity_key = match (query.identity, caller.user_id) {
        (Some(raw), _) => parse_identity(&raw)?,
        (None, Some(user_id)) => IdentityKey::for_user(user_id),
        (None, None) => {
            return Err(AppError::unauthorized("Provide an identity to check"));
        }
    };

    let status = state.service.is_registered(event_id, identity_key).await?;
    Ok(Json(StatusResponse { event_id, status }))
}

/// Get registration details.
///
/// # Errors
///
/// Returns 403 unless the caller owns the registration or is an admin.
pub async fn get_registration(
    caller: Caller,
    Path(registration_id): Path<RegistrationId>,
    State(state): State<AppState>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let actor = caller.actor()?;
    let registration = state.service.registration(registration_id).await?;
    if !actor.is_admin() && !actor.owns(&registration.identity_key) {
        return Err(RegistrationError::Unauthorized.into());
    }
    Ok(Json(registration.into()))
}

/// Cancel a registration.
///
/// Guests prove ownership with the email they registered with.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/registrations/<id>/cancel \
///   -H "Content-Type: application/json" \
///   -d '{"email": "ada@example.com"}'
/// ```
///
/// # Errors
///
/// Returns 403 for non-owners and 409 if the registration is already cancelled.
pub async fn cancel_registration(
    caller: Caller,
    Path(registration_id): Path<RegistrationId>,
    State(state): State<AppState>,
    request: Option<Json<CancelRequest>>,
) -> Result<Json<CancelResponse>, AppError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    let actor = caller.actor_or_guest(request.email)?;

    let outcome = state.service.cancel(&actor, registration_id).await?;
    Ok(Json(CancelResponse {
        registration_id: outcome.registration.id,
        status: outcome.registration.status,
        promoted_registration_id: outcome.promoted.map(|r| r.id),
    }))
}

/// Mark a registration as attended.
///
/// # Errors
///
/// Returns 403 for non-admins and 409 unless the registration is `registered`.
pub async fn mark_attended(
    caller: Caller,
    Path(registration_id): Path<RegistrationId>,
    State(state): State<AppState>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let actor = caller.actor()?;
    let registration = state.service.mark_attended(&actor, registration_id).await?;
    Ok(Json(registration.into()))
}

/// Promote a specific waitlisted registration.
///
/// # Errors
///
/// Returns 403 for non-admins and 409 if no slot is free.
pub async fn promote_registration(
    caller: Caller,
    Path(registration_id): Path<RegistrationId>,
    State(state): State<AppState>,
) -> Result<Json<RegistrationResponse>, AppError> {
    let actor = caller.actor()?;
    let registration = state.service.promote(&actor, registration_id).await?;
    Ok(Json(registration.into()))
}

fn parse_identity(raw: &str) -> Result<IdentityKey, AppError> {
    if raw.contains('@') {
        return IdentityKey::for_guest_email(raw)
            .map_err(|e| RegistrationError::from(e).into());
    }
    raw.parse::<UserId>()
        .map(IdentityKey::for_user)
        .map_err(|_| AppError::bad_request("identity must be a user id or an email address"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_accepts_email_and_user_id() {
        let user_id = UserId::new();
        assert_eq!(
            parse_identity(&user_id.to_string()).ok(),
            Some(IdentityKey::for_user(user_id))
        );
        assert_eq!(
            parse_identity("Ada@Example.com").ok(),
            IdentityKey::for_guest_email("ada@example.com").ok()
        );
    }

    #[test]
    fn identity_rejects_garbage() {
        assert!(parse_identity("not-an-id").is_err());
        assert!(parse_identity("@").is_err());
    }
}
