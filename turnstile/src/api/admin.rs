//! Admin bulk operations.
//!
//! - POST /api/admin/registrations/bulk - Apply one action to many registrations

use super::caller::Caller;
use super::error::AppError;
use crate::bulk::{BulkReport, BulkRequest};
use crate::server::state::AppState;
use axum::{Json, extract::State};

/// Cancel, promote or mark attended a batch of registrations.
///
/// Items fail individually; the response lists every item in request order.
///
/// # Example
///
/// ```bash
/// curl -X POST http://localhost:8080/api/admin/registrations/bulk \
///   -H "x-user-id: 550e8400-e29b-41d4-a716-446655440000" \
///   -H "x-user-role: admin" \
///   -H "Content-Type: application/json" \
///   -d '{"registration_ids": ["..."], "action": "cancel"}'
/// ```
///
/// Response:
/// ```json
/// {
///   "modified_count": 1,
///   "per_event_promotions": {"<event_id>": ["<registration_id>"]},
///   "items": [{"registration_id": "...", "outcome": "modified", "status": "cancelled"}]
/// }
/// ```
///
/// # Errors
///
/// Returns 403 for non-admins and 400 for an empty or oversized batch.
pub async fn bulk_registrations(
    caller: Caller,
    State(state): State<AppState>,
    Json(request): Json<BulkRequest>,
) -> Result<Json<BulkReport>, AppError> {
    let actor = caller.actor()?;
    let report = state.service.bulk_admin_operation(&actor, request).await?;
    Ok(Json(report))
}
