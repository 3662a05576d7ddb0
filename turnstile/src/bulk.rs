//! Bulk operation coordinator.
//!
//! Applies one admin action to many registrations. Ids are grouped by event and
//! each group runs in its own transaction holding that event's lock, so ledger
//! reconciliation for an event is all-or-nothing. A business failure on one item
//! (wrong status, missing id) is reported for that item and does not stop the
//! rest of its group. An infrastructure failure fails the whole group.
//!
//! For `cancel`, released slots are tallied across the group, returned to the
//! ledger, and then filled from the waitlist one slot at a time.

use crate::error::RegistrationError;
use crate::ledger::CapacityLedger;
use crate::lifecycle::{self, SlotEffect, Transition};
use crate::metrics::{self, PromotionTrigger};
use crate::notifier;
use crate::promoter::WaitlistPromoter;
use crate::service::RegistrationEnvironment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use turnstile_core::{
    Actor, EventId, NotificationKind, Registration, RegistrationId, RegistrationStatus,
    RegistrationStore, StoreTransaction, ValidationError,
};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Admin action applied to every id of a bulk request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    /// Cancel, releasing slots of registered entries
    Cancel,
    /// Promote specific waitlisted entries if a slot is free
    Promote,
    /// Mark registered entries as attended
    MarkAttended,
}

impl BulkAction {
    /// Lifecycle transition the action performs
    #[must_use]
    pub const fn transition(self) -> Transition {
        match self {
            Self::Cancel => Transition::Cancel,
            Self::Promote => Transition::Promote,
            Self::MarkAttended => Transition::MarkAttended,
        }
    }
}

/// Bulk request body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BulkRequest {
    /// Target registrations; duplicates are processed once
    pub registration_ids: Vec<RegistrationId>,
    /// Action to apply
    pub action: BulkAction,
}

/// Result for one targeted registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BulkItemOutcome {
    /// The action was applied
    Modified {
        /// Status after the action
        status: RegistrationStatus,
    },
    /// The action was not applied
    Failed {
        /// Machine-readable reason
        code: &'static str,
        /// Human-readable reason
        message: String,
    },
}

impl From<&RegistrationError> for BulkItemOutcome {
    fn from(err: &RegistrationError) -> Self {
        Self::Failed {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// One line of a [`BulkReport`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BulkItemResult {
    /// Targeted registration
    pub registration_id: RegistrationId,
    /// What happened to it
    #[serde(flatten)]
    pub outcome: BulkItemOutcome,
}

/// Summary of a bulk operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Items the action was applied to
    pub modified_count: usize,
    /// Waitlist entries promoted into slots freed by the operation, per event
    pub per_event_promotions: BTreeMap<EventId, Vec<RegistrationId>>,
    /// Per-item results in request order (duplicates removed)
    pub items: Vec<BulkItemResult>,
}

// ============================================================================
// Per-event batch
// ============================================================================

/// Outcome of applying one transition to registrations of a single event.
#[derive(Debug)]
pub(crate) struct EventBatch {
    /// Per-item result, in the order the ids were given
    pub items: Vec<(RegistrationId, Result<Registration, RegistrationError>)>,
    /// Registrations promoted into slots released by the batch
    pub promoted: Vec<Registration>,
}

/// Apply `transition` to `ids` (all belonging to `event_id`) in one transaction.
///
/// # Errors
///
/// Returns an error only for infrastructure failures or a missing event; nothing
/// is committed in that case.
pub(crate) async fn apply_to_event(
    store: &dyn RegistrationStore,
    event_id: EventId,
    ids: &[RegistrationId],
    transition: Transition,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<EventBatch, RegistrationError> {
    let mut tx = store.begin().await?;
    if tx.lock_event(event_id).await?.is_none() {
        return Err(RegistrationError::event_not_found(event_id));
    }

    let mut items = Vec::with_capacity(ids.len());
    let mut released = 0u32;
    for &id in ids {
        match apply_one(tx.as_mut(), event_id, id, transition, actor, now).await {
            Ok((registration, effect)) => {
                if effect == SlotEffect::Released {
                    released += 1;
                }
                items.push((id, Ok(registration)));
            }
            Err(RegistrationError::Store(e)) => return Err(RegistrationError::Store(e)),
            Err(e) => items.push((id, Err(e))),
        }
    }

    CapacityLedger::release_many(tx.as_mut(), event_id, released).await?;
    let promoted = WaitlistPromoter::fill_freed_slots(tx.as_mut(), event_id, released, now).await?;
    tx.commit().await?;

    Ok(EventBatch { items, promoted })
}

async fn apply_one(
    tx: &mut dyn StoreTransaction,
    event_id: EventId,
    id: RegistrationId,
    transition: Transition,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<(Registration, SlotEffect), RegistrationError> {
    let Some(mut registration) = tx.load_registration(id).await? else {
        return Err(RegistrationError::registration_not_found(id));
    };
    if registration.event_id != event_id {
        return Err(RegistrationError::registration_not_found(id));
    }
    lifecycle::authorize(actor, &registration, transition)?;

    if transition == Transition::Promote {
        let promoted = WaitlistPromoter::promote(tx, registration, now)
            .await?
            .ok_or(RegistrationError::EventFull)?;
        return Ok((promoted, SlotEffect::Consumed));
    }

    let effect = lifecycle::apply(&mut registration, transition, now)?;
    tx.update_registration(registration.clone()).await?;
    Ok((registration, effect))
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs admin bulk requests against the service environment.
pub struct BulkCoordinator<'a> {
    env: &'a RegistrationEnvironment,
}

impl<'a> BulkCoordinator<'a> {
    /// Create a coordinator over `env`
    #[must_use]
    pub const fn new(env: &'a RegistrationEnvironment) -> Self {
        Self { env }
    }

    /// Apply `request.action` to every registration in the request.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::Validation`] for an empty or oversized batch
    /// - [`RegistrationError::Store`] if registrations cannot be classified;
    ///   nothing has been modified in that case
    pub async fn run(
        &self,
        actor: &Actor,
        request: BulkRequest,
    ) -> Result<BulkReport, RegistrationError> {
        if !actor.is_admin() {
            return Err(RegistrationError::Unauthorized);
        }
        let ids = self.validate(request.registration_ids)?;
        let action = request.action;
        let transition = action.transition();
        let now = self.env.clock.now();

        let (groups, mut outcomes) = self.classify(&ids).await?;

        let mut report = BulkReport::default();
        for (event_id, group) in groups {
            match apply_to_event(self.env.store.as_ref(), event_id, &group, transition, actor, now)
                .await
            {
                Ok(batch) => {
                    self.publish(action, event_id, &batch, &mut report).await;
                    for (id, result) in batch.items {
                        outcomes.insert(id, to_outcome(&result));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        %event_id,
                        error = %e,
                        items = group.len(),
                        "Bulk group failed, no changes committed for this event"
                    );
                    for id in group {
                        outcomes.insert(id, BulkItemOutcome::from(&e));
                    }
                }
            }
        }

        for id in ids {
            let outcome = outcomes.remove(&id).unwrap_or_else(|| {
                BulkItemOutcome::from(&RegistrationError::registration_not_found(id))
            });
            let modified = matches!(outcome, BulkItemOutcome::Modified { .. });
            metrics::record_bulk_item(transition.as_str(), modified);
            if modified {
                report.modified_count += 1;
            }
            report.items.push(BulkItemResult {
                registration_id: id,
                outcome,
            });
        }

        tracing::info!(
            action = transition.as_str(),
            items = report.items.len(),
            modified = report.modified_count,
            promoted_events = report.per_event_promotions.len(),
            "Bulk operation completed"
        );
        Ok(report)
    }

    fn validate(&self, mut ids: Vec<RegistrationId>) -> Result<Vec<RegistrationId>, ValidationError> {
        if ids.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }
        let limit = self.env.settings.max_bulk_batch;
        if ids.len() > limit {
            return Err(ValidationError::BatchTooLarge {
                limit,
                actual: ids.len(),
            });
        }
        let mut seen = HashSet::with_capacity(ids.len());
        ids.retain(|id| seen.insert(*id));
        Ok(ids)
    }

    /// Group ids by owning event, in order of first appearance.
    ///
    /// Unknown ids are failed up front and belong to no group.
    async fn classify(
        &self,
        ids: &[RegistrationId],
    ) -> Result<
        (
            Vec<(EventId, Vec<RegistrationId>)>,
            HashMap<RegistrationId, BulkItemOutcome>,
        ),
        RegistrationError,
    > {
        let mut groups: Vec<(EventId, Vec<RegistrationId>)> = Vec::new();
        let mut group_index: HashMap<EventId, usize> = HashMap::new();
        let mut outcomes = HashMap::new();

        for &id in ids {
            let Some(registration) = self.env.store.load_registration(id).await? else {
                outcomes.insert(
                    id,
                    BulkItemOutcome::from(&RegistrationError::registration_not_found(id)),
                );
                continue;
            };
            let index = *group_index.entry(registration.event_id).or_insert_with(|| {
                groups.push((registration.event_id, Vec::new()));
                groups.len() - 1
            });
            if let Some((_, group)) = groups.get_mut(index) {
                group.push(id);
            }
        }
        Ok((groups, outcomes))
    }

    async fn publish(
        &self,
        action: BulkAction,
        event_id: EventId,
        batch: &EventBatch,
        report: &mut BulkReport,
    ) {
        let notifier = self.env.notifier.as_ref();
        for (_, result) in &batch.items {
            let Ok(registration) = result else { continue };
            match action {
                BulkAction::Cancel => {
                    metrics::record_cancellation();
                    notifier::deliver(notifier, NotificationKind::Cancelled, registration).await;
                }
                BulkAction::Promote => {
                    metrics::record_promotions(PromotionTrigger::Admin, 1);
                    notifier::deliver(notifier, NotificationKind::Promoted, registration).await;
                }
                BulkAction::MarkAttended => {}
            }
        }

        if !batch.promoted.is_empty() {
            metrics::record_promotions(PromotionTrigger::BulkCancellation, batch.promoted.len());
            notifier::deliver_all(notifier, NotificationKind::Promoted, &batch.promoted).await;
            report
                .per_event_promotions
                .insert(event_id, batch.promoted.iter().map(|r| r.id).collect());
        }
    }
}

fn to_outcome(result: &Result<Registration, RegistrationError>) -> BulkItemOutcome {
    match result {
        Ok(registration) => BulkItemOutcome::Modified {
            status: registration.status,
        },
        Err(e) => BulkItemOutcome::from(e),
    }
}
