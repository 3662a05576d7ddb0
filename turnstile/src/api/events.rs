//! Event administration API endpoints.
//!
//! - POST /api/events - Create an event (admin)
//! - GET /api/events/:id - Event details with ledger counters
//! - PUT /api/events/:id/capacity - Change capacity (admin)
//! - POST /api/events/:id/close - Complete or cancel an event (admin)
//! - GET /api/events/:id/ledger - Counter reconciliation report (admin)
//! - GET /api/events/:id/registrations - All registrations of an event (admin)

use super::caller::Caller;
use super::error::AppError;
use crate::ledger::LedgerReport;
use crate::server::state::AppState;
use crate::service::ClosingStatus;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use turnstile_core::{Event, EventId, EventStatus, NewEvent, Registration, RegistrationId};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create a new event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Event title
    pub title: String,
    /// Capacity in slots
    pub max_attendees: u32,
    /// When registration opens (default: immediately)
    #[serde(default)]
    pub opens_at: Option<DateTime<Utc>>,
}

/// Event details response.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Event ID
    pub id: EventId,
    /// Event title
    pub title: String,
    /// Capacity in slots
    pub max_attendees: u32,
    /// Slots consumed
    pub current_attendees: u32,
    /// Slots still free
    pub available: u32,
    /// Event status
    pub status: EventStatus,
    /// When registration opens
    pub opens_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl From<Event> for EventResponse {
    fn from(event: Event) -> Self {
        Self {
            available: event.free_slots(),
            id: event.id,
            title: event.title,
            max_attendees: event.max_attendees,
            current_attendees: event.current_attendees,
            status: event.status,
            opens_at: event.opens_at,
            created_at: event.created_at,
        }
    }
}

/// Request to change an event's capacity.
#[derive(Debug, Deserialize)]
pub struct UpdateCapacityRequest {
    /// New capacity in slots
    pub max_attendees: u32,
}

/// Response after a capacity change.
#[derive(Debug, Serialize)]
pub struct UpdateCapacityResponse {
    /// Event ID
    pub event_id: EventId,
    /// Capacity in slots
    pub max_attendees: u32,
    /// Slots consumed
    pub current_attendees: u32,
    /// Event status
    pub status: EventStatus,
    /// Waitlist entries promoted into the new slots
    pub promoted: Vec<RegistrationId>,
}

/// Request to close an event.
#[derive(Debug, Deserialize)]
pub struct CloseEventRequest {
    /// Terminal status
    pub status: ClosingStatus,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new event.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/events \
///   -H "x-user-id: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "x-user-role: admin" \
///   -H "Content-Type: application/json" \
///   -d '{"title": "Rust Meetup", "max_attendees": 50}'
/// ```
///
/// # Errors
///
/// Returns 401/403 for non-admin callers and 400 for invalid input.
pub async fn create_event(
    caller: Caller,
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    let actor = caller.actor()?;
    let event = state
        .service
        .create_event(
            &actor,
            NewEvent {
                title: request.title,
                max_attendees: request.max_attendees,
                opens_at: request.opens_at,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(event.into())))
}

/// Get event details.
///
/// # Errors
///
/// Returns 404 if the event does not exist.
pub async fn get_event(
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
) -> Result<Json<EventResponse>, AppError> {
    let event = state.service.event(event_id).await?;
    Ok(Json(event.into()))
}

/// Change an event's capacity.
///
/// Raising capacity promotes waitlisted registrations into the new slots.
///
/// # Errors
///
/// Returns 409 if the new capacity is below current attendance.
pub async fn update_capacity(
    caller: Caller,
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
    Json(request): Json<UpdateCapacityRequest>,
) -> Result<Json<UpdateCapacityResponse>, AppError> {
    let actor = caller.actor()?;
    let change = state
        .service
        .set_capacity(&actor, event_id, request.max_attendees)
        .await?;
    Ok(Json(UpdateCapacityResponse {
        event_id,
        max_attendees: change.ledger.max_attendees,
        current_attendees: change.ledger.current_attendees,
        status: change.ledger.status,
        promoted: change.promoted.iter().map(|r| r.id).collect(),
    }))
}

/// Complete or cancel an event.
///
/// # Errors
///
/// Returns 409 if the event is already closed.
pub async fn close_event(
    caller: Caller,
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
    Json(request): Json<CloseEventRequest>,
) -> Result<Json<EventResponse>, AppError> {
    let actor = caller.actor()?;
    let event = state
        .service
        .close_event(&actor, event_id, request.status)
        .await?;
    Ok(Json(event.into()))
}

/// Reconcile an event's counter against its registrations.
///
/// # Errors
///
/// Returns 403 for non-admin callers and 404 for unknown events.
pub async fn get_ledger(
    caller: Caller,
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
) -> Result<Json<LedgerReport>, AppError> {
    require_admin(&caller)?;
    Ok(Json(state.service.ledger_report(event_id).await?))
}

/// List all registrations of an event.
///
/// # Errors
///
/// Returns 403 for non-admin callers and 404 for unknown events.
pub async fn list_registrations(
    caller: Caller,
    Path(event_id): Path<EventId>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Registration>>, AppError> {
    require_admin(&caller)?;
    Ok(Json(state.service.registrations(event_id).await?))
}

fn require_admin(caller: &Caller) -> Result<(), AppError> {
    if caller.actor()?.is_admin() {
        Ok(())
    } else {
        Err(crate::error::RegistrationError::Unauthorized.into())
    }
}
