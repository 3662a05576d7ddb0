//! Registration service.
//!
//! Facade over the admission controller, state machine, waitlist promoter and
//! bulk coordinator. Every operation that touches the ledger runs in one store
//! transaction that locks the event first; notifications go out after commit.

use crate::admission::AdmissionController;
use crate::bulk::{self, BulkCoordinator, BulkReport, BulkRequest, EventBatch};
use crate::error::RegistrationError;
use crate::ledger::LedgerReport;
use crate::lifecycle::Transition;
use crate::metrics::{self, PromotionTrigger};
use crate::notifier;
use crate::promoter::WaitlistPromoter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use turnstile_core::environment::Clock;
use turnstile_core::{
    Actor, Event, EventId, EventStatus, IdentityKey, LedgerSnapshot, NewEvent, NotificationKind,
    Notifier, Registration, RegistrationId, RegistrationLookup, RegistrationStatus,
    RegistrationStore, StoreError, Subject, ValidationError,
};

/// Default upper bound on ids per bulk request.
pub const DEFAULT_MAX_BULK_BATCH: usize = 500;

/// Tunables of the registration service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Maximum ids accepted by one bulk request
    pub max_bulk_batch: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            max_bulk_batch: DEFAULT_MAX_BULK_BATCH,
        }
    }
}

/// Dependencies injected into the service.
pub struct RegistrationEnvironment {
    /// Event and registration store
    pub store: Arc<dyn RegistrationStore>,
    /// Time source for registration timestamps and open checks
    pub clock: Arc<dyn Clock>,
    /// Notification dispatcher
    pub notifier: Arc<dyn Notifier>,
    /// Tunables
    pub settings: ServiceSettings,
}

/// Terminal status an admin can close an event with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosingStatus {
    /// The event took place
    Completed,
    /// The event was called off
    Cancelled,
}

impl From<ClosingStatus> for EventStatus {
    fn from(status: ClosingStatus) -> Self {
        match status {
            ClosingStatus::Completed => Self::Completed,
            ClosingStatus::Cancelled => Self::Cancelled,
        }
    }
}

/// Result of a successful cancellation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CancelOutcome {
    /// The cancelled registration
    pub registration: Registration,
    /// Waitlist entry promoted into the released slot, if any
    pub promoted: Option<Registration>,
}

/// Result of a capacity change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapacityChange {
    /// Ledger after the change and any promotions
    pub ledger: LedgerSnapshot,
    /// Waitlist entries promoted into new slots, oldest first
    pub promoted: Vec<Registration>,
}

/// Registration operations for events with limited capacity.
///
/// Cheap to clone; all clones share one environment.
#[derive(Clone)]
pub struct RegistrationService {
    env: Arc<RegistrationEnvironment>,
}

impl RegistrationService {
    /// Create a service with default settings.
    #[must_use]
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_settings(store, clock, notifier, ServiceSettings::default())
    }

    /// Create a service with explicit settings.
    #[must_use]
    pub fn with_settings(
        store: Arc<dyn RegistrationStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            env: Arc::new(RegistrationEnvironment {
                store,
                clock,
                notifier,
                settings,
            }),
        }
    }

    /// Service settings
    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.env.settings
    }

    // ========================================================================
    // Event administration
    // ========================================================================

    /// Create an event with an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::Validation`] for a blank title or zero capacity
    #[tracing::instrument(skip(self, actor, new_event), fields(max_attendees = new_event.max_attendees))]
    pub async fn create_event(
        &self,
        actor: &Actor,
        new_event: NewEvent,
    ) -> Result<Event, RegistrationError> {
        require_admin(actor)?;
        if new_event.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle.into());
        }
        if new_event.max_attendees == 0 {
            return Err(ValidationError::ZeroCapacity.into());
        }

        let event = Event::create(EventId::new(), new_event, self.env.clock.now());
        self.env.store.insert_event(event.clone()).await?;
        tracing::info!(event_id = %event.id, status = %event.status, "Event created");
        Ok(event)
    }

    /// Change an event's capacity and promote waitlisted entries into any new slots.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::Validation`] for zero capacity
    /// - [`RegistrationError::NotFound`] for an unknown event
    /// - [`RegistrationError::CapacityBelowAttendance`] if fewer slots than are
    ///   already consumed were requested
    #[tracing::instrument(skip(self, actor))]
    pub async fn set_capacity(
        &self,
        actor: &Actor,
        event_id: EventId,
        max_attendees: u32,
    ) -> Result<CapacityChange, RegistrationError> {
        require_admin(actor)?;
        if max_attendees == 0 {
            return Err(ValidationError::ZeroCapacity.into());
        }
        let now = self.env.clock.now();

        let mut tx = self.env.store.begin().await?;
        let Some(event) = tx.lock_event(event_id).await? else {
            return Err(RegistrationError::event_not_found(event_id));
        };
        let Some(snapshot) = tx.set_capacity(event_id, max_attendees).await? else {
            return Err(RegistrationError::CapacityBelowAttendance {
                current: event.current_attendees,
                requested: max_attendees,
            });
        };
        let free = snapshot
            .max_attendees
            .saturating_sub(snapshot.current_attendees);
        let promoted = WaitlistPromoter::fill_freed_slots(tx.as_mut(), event_id, free, now).await?;
        let ledger = tx
            .lock_event(event_id)
            .await?
            .map_or(snapshot, |e| LedgerSnapshot {
                event_id,
                max_attendees: e.max_attendees,
                current_attendees: e.current_attendees,
                status: e.status,
            });
        tx.commit().await?;

        tracing::info!(
            %event_id,
            from = event.max_attendees,
            to = max_attendees,
            promoted = promoted.len(),
            "Capacity changed"
        );
        metrics::record_free_slots(event_id, &ledger);
        metrics::record_promotions(PromotionTrigger::CapacityIncrease, promoted.len());
        notifier::deliver_all(
            self.env.notifier.as_ref(),
            NotificationKind::Promoted,
            &promoted,
        )
        .await;

        Ok(CapacityChange { ledger, promoted })
    }

    /// Move an event into a terminal status. Closed events admit no one.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::NotFound`] for an unknown event
    /// - [`RegistrationError::EventClosed`] if the event is already closed
    #[tracing::instrument(skip(self, actor))]
    pub async fn close_event(
        &self,
        actor: &Actor,
        event_id: EventId,
        status: ClosingStatus,
    ) -> Result<Event, RegistrationError> {
        require_admin(actor)?;

        let mut tx = self.env.store.begin().await?;
        let Some(mut event) = tx.lock_event(event_id).await? else {
            return Err(RegistrationError::event_not_found(event_id));
        };
        if event.status.is_terminal() {
            return Err(RegistrationError::EventClosed);
        }
        tx.set_event_status(event_id, status.into()).await?;
        tx.commit().await?;

        event.status = status.into();
        tracing::info!(%event_id, status = %event.status, "Event closed");
        Ok(event)
    }

    // ========================================================================
    // Registration lifecycle
    // ========================================================================

    /// Register `subject` for an event.
    ///
    /// The registration is `registered` if a slot was free and `waitlisted`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::DuplicateRegistration`] if the subject already has an
    ///   active registration for the event
    /// - [`RegistrationError::EventUnavailable`] if the event is not open
    /// - [`RegistrationError::Store`] on infrastructure failure (nothing is persisted)
    #[tracing::instrument(skip(self, subject), fields(identity = %subject.identity_key()))]
    pub async fn register(
        &self,
        event_id: EventId,
        subject: Subject,
    ) -> Result<Registration, RegistrationError> {
        let now = self.env.clock.now();
        let mut tx = self.env.store.begin().await?;
        let registration =
            AdmissionController::admit(tx.as_mut(), RegistrationId::new(), event_id, subject, now)
                .await?;
        tx.commit().await?;

        metrics::record_registration(registration.status);
        let kind = match registration.status {
            RegistrationStatus::Waitlisted => NotificationKind::Waitlisted,
            _ => NotificationKind::Registered,
        };
        notifier::deliver(self.env.notifier.as_ref(), kind, &registration).await;
        Ok(registration)
    }

    /// Cancel a registration. A released slot is immediately offered to the
    /// waitlist in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::NotFound`] for an unknown registration
    /// - [`RegistrationError::Unauthorized`] unless `actor` owns the registration
    ///   or is an admin
    /// - [`RegistrationError::AlreadyCancelled`] if it is already cancelled
    /// - [`RegistrationError::InvalidTransition`] if it is `attended`
    #[tracing::instrument(skip(self, actor))]
    pub async fn cancel(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<CancelOutcome, RegistrationError> {
        let (registration, promoted) = self
            .transition_one(actor, registration_id, Transition::Cancel)
            .await?;

        metrics::record_cancellation();
        metrics::record_promotions(PromotionTrigger::Cancellation, promoted.len());
        let notifier = self.env.notifier.as_ref();
        notifier::deliver(notifier, NotificationKind::Cancelled, &registration).await;
        notifier::deliver_all(notifier, NotificationKind::Promoted, &promoted).await;

        Ok(CancelOutcome {
            registration,
            promoted: promoted.into_iter().next(),
        })
    }

    /// Mark a registered attendee as attended. Capacity-neutral.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::NotFound`] for an unknown registration
    /// - [`RegistrationError::InvalidTransition`] unless it is `registered`
    #[tracing::instrument(skip(self, actor))]
    pub async fn mark_attended(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        require_admin(actor)?;
        let (registration, _) = self
            .transition_one(actor, registration_id, Transition::MarkAttended)
            .await?;
        Ok(registration)
    }

    /// Promote a specific waitlisted registration if a slot is free.
    ///
    /// # Errors
    ///
    /// - [`RegistrationError::Unauthorized`] unless `actor` is an admin
    /// - [`RegistrationError::NotFound`] for an unknown registration
    /// - [`RegistrationError::InvalidTransition`] unless it is `waitlisted`
    /// - [`RegistrationError::EventFull`] if no slot is free
    #[tracing::instrument(skip(self, actor))]
    pub async fn promote(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        require_admin(actor)?;
        let (registration, _) = self
            .transition_one(actor, registration_id, Transition::Promote)
            .await?;

        metrics::record_promotions(PromotionTrigger::Admin, 1);
        notifier::deliver(
            self.env.notifier.as_ref(),
            NotificationKind::Promoted,
            &registration,
        )
        .await;
        Ok(registration)
    }

    /// Apply an admin action to many registrations.
    ///
    /// # Errors
    ///
    /// See [`BulkCoordinator::run`].
    #[tracing::instrument(skip(self, actor, request), fields(action = ?request.action, items = request.registration_ids.len()))]
    pub async fn bulk_admin_operation(
        &self,
        actor: &Actor,
        request: BulkRequest,
    ) -> Result<BulkReport, RegistrationError> {
        BulkCoordinator::new(&self.env).run(actor, request).await
    }

    /// Run one transition through the per-event batch path.
    async fn transition_one(
        &self,
        actor: &Actor,
        registration_id: RegistrationId,
        transition: Transition,
    ) -> Result<(Registration, Vec<Registration>), RegistrationError> {
        let existing = self
            .env
            .store
            .load_registration(registration_id)
            .await?
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))?;

        let EventBatch { items, promoted } = bulk::apply_to_event(
            self.env.store.as_ref(),
            existing.event_id,
            &[registration_id],
            transition,
            actor,
            self.env.clock.now(),
        )
        .await?;

        let registration = items
            .into_iter()
            .next()
            .map(|(_, result)| result)
            .unwrap_or_else(|| Err(RegistrationError::registration_not_found(registration_id)))?;
        Ok((registration, promoted))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `identity_key` holds an active registration for the event.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::Store`] on infrastructure failure.
    pub async fn is_registered(
        &self,
        event_id: EventId,
        identity_key: IdentityKey,
    ) -> Result<RegistrationLookup, RegistrationError> {
        let active = self.env.store.find_active(event_id, identity_key).await?;
        Ok(RegistrationLookup::from(active.as_ref()))
    }

    /// Load an event, reporting its status as observed now.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotFound`] for an unknown event.
    pub async fn event(&self, event_id: EventId) -> Result<Event, RegistrationError> {
        let mut event = self
            .env
            .store
            .load_event(event_id)
            .await?
            .ok_or_else(|| RegistrationError::event_not_found(event_id))?;
        event.status = event.effective_status(self.env.clock.now());
        Ok(event)
    }

    /// Load a registration.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotFound`] for an unknown registration.
    pub async fn registration(
        &self,
        registration_id: RegistrationId,
    ) -> Result<Registration, RegistrationError> {
        self.env
            .store
            .load_registration(registration_id)
            .await?
            .ok_or_else(|| RegistrationError::registration_not_found(registration_id))
    }

    /// All registrations of an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotFound`] for an unknown event.
    pub async fn registrations(
        &self,
        event_id: EventId,
    ) -> Result<Vec<Registration>, RegistrationError> {
        self.event(event_id).await?;
        Ok(self.env.store.list_registrations(event_id).await?)
    }

    /// Compare an event's counter with the registrations holding a slot.
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError::NotFound`] for an unknown event.
    pub async fn ledger_report(&self, event_id: EventId) -> Result<LedgerReport, RegistrationError> {
        let event = self.event(event_id).await?;
        let registrations = self.env.store.list_registrations(event_id).await?;
        let report = LedgerReport::reconcile(&event, &registrations, event.status);
        if !report.consistent {
            tracing::warn!(
                %event_id,
                current = report.current_attendees,
                counted = report.counted,
                "Ledger counter disagrees with registrations"
            );
        }
        Ok(report)
    }

    /// Check store connectivity.
    ///
    /// # Errors
    ///
    /// Returns the store error if the store is unreachable.
    pub async fn ping(&self) -> Result<(), StoreError> {
        self.env.store.ping().await
    }
}

fn require_admin(actor: &Actor) -> Result<(), RegistrationError> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(RegistrationError::Unauthorized)
    }
}
