//! End-to-end registration scenarios against the in-memory store.
//!
//! Each test drives `RegistrationService` the way the HTTP layer does and then
//! checks the ledger counter, registration statuses and notifications.
//!
//! Run with: `cargo test --test registration_scenarios_test`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

use chrono::Duration;
use std::sync::Arc;
use turnstile::{
    BulkAction, BulkItemOutcome, BulkRequest, ClosingStatus, RegistrationError,
    RegistrationService, ServiceSettings,
};
use turnstile_core::environment::Clock;
use turnstile_core::{
    Actor, EventId, EventStatus, IdentityKey, NewEvent, NotificationKind, Registration,
    RegistrationId, RegistrationLookup, RegistrationStatus, RegistrationStore, Subject, UserId,
    ValidationError,
};
use turnstile_testing::{InMemoryRegistrationStore, RecordingNotifier, SteppingClock};

struct Harness {
    service: RegistrationService,
    store: InMemoryRegistrationStore,
    notifier: Arc<RecordingNotifier>,
    clock: Arc<SteppingClock>,
    admin: Actor,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(ServiceSettings::default())
    }

    fn with_settings(settings: ServiceSettings) -> Self {
        let store = InMemoryRegistrationStore::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let clock = Arc::new(SteppingClock::default());
        let service = RegistrationService::with_settings(
            Arc::new(store.clone()),
            clock.clone(),
            notifier.clone(),
            settings,
        );
        Self {
            service,
            store,
            notifier,
            clock,
            admin: Actor::Admin(UserId::new()),
        }
    }

    async fn event(&self, max_attendees: u32) -> EventId {
        self.service
            .create_event(
                &self.admin,
                NewEvent {
                    title: "Rust Meetup".to_string(),
                    max_attendees,
                    opens_at: None,
                },
            )
            .await
            .expect("create event")
            .id
    }

    async fn register_user(&self, event_id: EventId) -> (UserId, Registration) {
        let user_id = UserId::new();
        let registration = self
            .service
            .register(event_id, Subject::user(user_id))
            .await
            .expect("register");
        (user_id, registration)
    }

    /// Insert a waitlisted entry directly, leaving the slot it would need free.
    async fn seed_waitlisted(&self, event_id: EventId) -> Registration {
        let registration = Registration::new(
            RegistrationId::new(),
            event_id,
            Subject::user(UserId::new()),
            RegistrationStatus::Waitlisted,
            self.clock.now(),
        );
        let mut tx = self.store.begin().await.unwrap();
        tx.insert_registration(registration.clone()).await.unwrap();
        tx.commit().await.unwrap();
        registration
    }

    async fn status_of(&self, id: RegistrationId) -> RegistrationStatus {
        self.service.registration(id).await.expect("load").status
    }

    async fn current(&self, event_id: EventId) -> u32 {
        self.service
            .event(event_id)
            .await
            .expect("load event")
            .current_attendees
    }
}

// ============================================================================
// Admission
// ============================================================================

#[tokio::test]
async fn registrations_beyond_capacity_are_waitlisted() {
    let h = Harness::new();
    let event_id = h.event(2).await;

    let (_, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let (_, c) = h.register_user(event_id).await;

    assert_eq!(a.status, RegistrationStatus::Registered);
    assert_eq!(b.status, RegistrationStatus::Registered);
    assert_eq!(c.status, RegistrationStatus::Waitlisted);

    let event = h.service.event(event_id).await.unwrap();
    assert_eq!(event.current_attendees, 2);
    assert_eq!(event.status, EventStatus::Full);
    assert_eq!(h.notifier.of_kind(NotificationKind::Registered).len(), 2);
    assert_eq!(h.notifier.of_kind(NotificationKind::Waitlisted).len(), 1);
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let h = Harness::new();
    let event_id = h.event(5).await;
    let (user_id, _) = h.register_user(event_id).await;

    let err = h
        .service
        .register(event_id, Subject::user(user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateRegistration));
    assert_eq!(h.current(event_id).await, 1);
}

#[tokio::test]
async fn guest_duplicates_ignore_email_case() {
    let h = Harness::new();
    let event_id = h.event(5).await;

    h.service
        .register(
            event_id,
            Subject::guest("Ada", "ada@example.com", None).unwrap(),
        )
        .await
        .unwrap();
    let err = h
        .service
        .register(
            event_id,
            Subject::guest("Ada L.", "  ADA@Example.com ", None).unwrap(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, RegistrationError::DuplicateRegistration));
}

#[tokio::test]
async fn waitlisted_identity_is_also_a_duplicate() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.register_user(event_id).await;
    let (user_id, waitlisted) = h.register_user(event_id).await;
    assert_eq!(waitlisted.status, RegistrationStatus::Waitlisted);

    let err = h
        .service
        .register(event_id, Subject::user(user_id))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::DuplicateRegistration));
}

#[tokio::test]
async fn identity_can_register_again_after_cancelling() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (user_id, first) = h.register_user(event_id).await;

    h.service
        .cancel(&Actor::User(user_id), first.id)
        .await
        .unwrap();
    let second = h
        .service
        .register(event_id, Subject::user(user_id))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(second.status, RegistrationStatus::Registered);
    assert_eq!(h.current(event_id).await, 1);
}

#[tokio::test]
async fn unknown_event_is_unavailable() {
    let h = Harness::new();
    let err = h
        .service
        .register(EventId::new(), Subject::user(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EventUnavailable));
}

#[tokio::test]
async fn upcoming_event_rejects_until_it_opens() {
    let h = Harness::new();
    let opens_at = h.clock.now() + Duration::hours(1);
    let event = h
        .service
        .create_event(
            &h.admin,
            NewEvent {
                title: "Launch".to_string(),
                max_attendees: 3,
                opens_at: Some(opens_at),
            },
        )
        .await
        .unwrap();
    assert_eq!(event.status, EventStatus::Upcoming);

    let err = h
        .service
        .register(event.id, Subject::user(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EventUnavailable));

    h.clock.advance(Duration::hours(2));
    let (_, registration) = h.register_user(event.id).await;
    assert_eq!(registration.status, RegistrationStatus::Registered);
    assert_eq!(
        h.service.event(event.id).await.unwrap().status,
        EventStatus::RegistrationOpen
    );
}

#[tokio::test]
async fn closed_event_rejects_registrations() {
    let h = Harness::new();
    let event_id = h.event(3).await;
    h.service
        .close_event(&h.admin, event_id, ClosingStatus::Completed)
        .await
        .unwrap();

    let err = h
        .service
        .register(event_id, Subject::user(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EventUnavailable));

    let err = h
        .service
        .close_event(&h.admin, event_id, ClosingStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EventClosed));
}

// ============================================================================
// Cancellation and promotion
// ============================================================================

#[tokio::test]
async fn cancelling_registered_promotes_earliest_waitlisted() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (owner, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let (_, c) = h.register_user(event_id).await;

    let outcome = h.service.cancel(&Actor::User(owner), a.id).await.unwrap();

    assert_eq!(outcome.registration.status, RegistrationStatus::Cancelled);
    assert!(outcome.registration.cancelled_at.is_some());
    assert_eq!(outcome.promoted.as_ref().map(|r| r.id), Some(b.id));
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(c.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 1);

    let promoted = h.notifier.of_kind(NotificationKind::Promoted);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].registration_id, b.id);
    assert_eq!(h.notifier.of_kind(NotificationKind::Cancelled).len(), 1);
}

#[tokio::test]
async fn cancelling_without_waitlist_frees_the_slot() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (owner, a) = h.register_user(event_id).await;

    let outcome = h.service.cancel(&Actor::User(owner), a.id).await.unwrap();

    assert!(outcome.promoted.is_none());
    let event = h.service.event(event_id).await.unwrap();
    assert_eq!(event.current_attendees, 0);
    assert_eq!(event.status, EventStatus::RegistrationOpen);
}

#[tokio::test]
async fn cancelling_waitlisted_does_not_touch_the_counter() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (_, a) = h.register_user(event_id).await;
    let (owner, b) = h.register_user(event_id).await;

    let outcome = h.service.cancel(&Actor::User(owner), b.id).await.unwrap();

    assert!(outcome.promoted.is_none());
    assert_eq!(h.status_of(a.id).await, RegistrationStatus::Registered);
    assert_eq!(h.current(event_id).await, 1);
}

#[tokio::test]
async fn cancelling_twice_reports_already_cancelled() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (owner, a) = h.register_user(event_id).await;
    h.register_user(event_id).await;
    let actor = Actor::User(owner);

    h.service.cancel(&actor, a.id).await.unwrap();
    let err = h.service.cancel(&actor, a.id).await.unwrap_err();

    assert!(matches!(err, RegistrationError::AlreadyCancelled));
    assert_eq!(h.current(event_id).await, 1);
    assert_eq!(h.notifier.of_kind(NotificationKind::Cancelled).len(), 1);
}

#[tokio::test]
async fn attended_registration_cannot_be_cancelled() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (owner, a) = h.register_user(event_id).await;

    let attended = h.service.mark_attended(&h.admin, a.id).await.unwrap();
    assert_eq!(attended.status, RegistrationStatus::Attended);

    let err = h.service.cancel(&Actor::User(owner), a.id).await.unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::InvalidTransition {
            from: RegistrationStatus::Attended,
            to: RegistrationStatus::Cancelled,
        }
    ));
    assert_eq!(h.current(event_id).await, 1);
    assert!(h.service.ledger_report(event_id).await.unwrap().consistent);
}

#[tokio::test]
async fn only_registered_entries_can_be_marked_attended() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.register_user(event_id).await;
    let (_, waitlisted) = h.register_user(event_id).await;

    let err = h
        .service
        .mark_attended(&h.admin, waitlisted.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidTransition { .. }));
}

#[tokio::test]
async fn only_the_owner_or_an_admin_may_cancel() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (_, a) = h.register_user(event_id).await;
    let guest = h
        .service
        .register(
            event_id,
            Subject::guest("Grace", "grace@example.com", None).unwrap(),
        )
        .await
        .unwrap();

    let err = h
        .service
        .cancel(&Actor::User(UserId::new()), a.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Unauthorized));

    let err = h
        .service
        .cancel(
            &Actor::Guest {
                email: "mallory@example.com".to_string(),
            },
            guest.id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Unauthorized));

    h.service
        .cancel(
            &Actor::Guest {
                email: "Grace@Example.com".to_string(),
            },
            guest.id,
        )
        .await
        .unwrap();
    h.service.cancel(&h.admin, a.id).await.unwrap();
    assert_eq!(h.current(event_id).await, 0);
}

#[tokio::test]
async fn cancel_of_unknown_registration_is_not_found() {
    let h = Harness::new();
    let err = h
        .service
        .cancel(&h.admin, RegistrationId::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::NotFound {
            resource: "registration",
            ..
        }
    ));
}

#[tokio::test]
async fn cancelling_on_a_closed_event_does_not_promote() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (owner, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    h.service
        .close_event(&h.admin, event_id, ClosingStatus::Cancelled)
        .await
        .unwrap();

    let outcome = h.service.cancel(&Actor::User(owner), a.id).await.unwrap();

    assert!(outcome.promoted.is_none());
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Waitlisted);
    let event = h.service.event(event_id).await.unwrap();
    assert_eq!(event.current_attendees, 0);
    assert_eq!(event.status, EventStatus::Cancelled);
}

// ============================================================================
// Admin promotion and capacity changes
// ============================================================================

#[tokio::test]
async fn admin_promotion_without_free_slot_fails() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;

    let err = h.service.promote(&h.admin, b.id).await.unwrap_err();

    assert!(matches!(err, RegistrationError::EventFull));
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 1);
}

#[tokio::test]
async fn admin_promotion_takes_a_free_slot_out_of_order() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let first = h.seed_waitlisted(event_id).await;
    let second = h.seed_waitlisted(event_id).await;

    let promoted = h.service.promote(&h.admin, second.id).await.unwrap();

    assert_eq!(promoted.status, RegistrationStatus::Registered);
    assert_eq!(h.status_of(first.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 1);
    assert_eq!(h.notifier.of_kind(NotificationKind::Promoted).len(), 1);
}

#[tokio::test]
async fn admin_promotion_requires_admin() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.register_user(event_id).await;
    let (owner, b) = h.register_user(event_id).await;

    let err = h
        .service
        .promote(&Actor::User(owner), b.id)
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Unauthorized));
}

#[tokio::test]
async fn promoting_a_registered_entry_is_invalid() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (_, a) = h.register_user(event_id).await;

    let err = h.service.promote(&h.admin, a.id).await.unwrap_err();
    assert!(matches!(err, RegistrationError::InvalidTransition { .. }));
    assert_eq!(h.current(event_id).await, 1);
}

#[tokio::test]
async fn raising_capacity_promotes_in_fifo_order() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let (_, c) = h.register_user(event_id).await;
    let (_, d) = h.register_user(event_id).await;

    let change = h.service.set_capacity(&h.admin, event_id, 3).await.unwrap();

    let promoted: Vec<RegistrationId> = change.promoted.iter().map(|r| r.id).collect();
    assert_eq!(promoted, vec![b.id, c.id]);
    assert_eq!(change.ledger.current_attendees, 3);
    assert_eq!(change.ledger.max_attendees, 3);
    assert_eq!(change.ledger.status, EventStatus::Full);
    assert_eq!(h.status_of(d.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.notifier.of_kind(NotificationKind::Promoted).len(), 2);
}

#[tokio::test]
async fn capacity_cannot_drop_below_attendance() {
    let h = Harness::new();
    let event_id = h.event(3).await;
    h.register_user(event_id).await;
    h.register_user(event_id).await;

    let err = h
        .service
        .set_capacity(&h.admin, event_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::CapacityBelowAttendance {
            current: 2,
            requested: 1,
        }
    ));

    let err = h
        .service
        .set_capacity(&h.admin, event_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Validation(ValidationError::ZeroCapacity)
    ));

    let change = h.service.set_capacity(&h.admin, event_id, 2).await.unwrap();
    assert_eq!(change.ledger.status, EventStatus::Full);
    assert!(change.promoted.is_empty());
}

#[tokio::test]
async fn event_creation_is_validated() {
    let h = Harness::new();
    let err = h
        .service
        .create_event(
            &h.admin,
            NewEvent {
                title: "Empty".to_string(),
                max_attendees: 0,
                opens_at: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Validation(ValidationError::ZeroCapacity)
    ));

    let err = h
        .service
        .create_event(
            &Actor::User(UserId::new()),
            NewEvent {
                title: "Mine".to_string(),
                max_attendees: 10,
                opens_at: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Unauthorized));
}

// ============================================================================
// Failure handling
// ============================================================================

#[tokio::test]
async fn failed_commit_leaves_no_trace() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (owner, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;

    h.store.fail_commits(true);
    let err = h.service.cancel(&Actor::User(owner), a.id).await.unwrap_err();
    assert!(matches!(err, RegistrationError::Store(_)));
    let err = h
        .service
        .register(event_id, Subject::user(UserId::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Store(_)));
    h.store.fail_commits(false);

    assert_eq!(h.status_of(a.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 1);
    assert_eq!(
        h.store
            .count_in_status(event_id, RegistrationStatus::Waitlisted)
            .await,
        1
    );
    assert!(h.notifier.of_kind(NotificationKind::Cancelled).is_empty());
}

#[tokio::test]
async fn notification_failure_does_not_undo_the_transition() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    h.notifier.fail_deliveries();

    let (owner, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let outcome = h.service.cancel(&Actor::User(owner), a.id).await.unwrap();

    assert_eq!(outcome.promoted.map(|r| r.id), Some(b.id));
    assert_eq!(h.status_of(a.id).await, RegistrationStatus::Cancelled);
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Registered);
    // registered, waitlisted, cancelled, promoted
    assert_eq!(h.notifier.sent().len(), 4);
}

// ============================================================================
// Bulk operations
// ============================================================================

#[tokio::test]
async fn bulk_cancel_promotes_one_waitlisted_entry_per_released_slot() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (_, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let (_, c) = h.register_user(event_id).await;
    let (_, d) = h.register_user(event_id).await;
    let (_, e) = h.register_user(event_id).await;

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![a.id, b.id],
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 2);
    assert_eq!(report.per_event_promotions.get(&event_id), Some(&vec![c.id, d.id]));
    assert_eq!(h.status_of(c.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(d.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(e.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 2);
    assert!(h.service.ledger_report(event_id).await.unwrap().consistent);
}

#[tokio::test]
async fn bulk_reports_each_item_in_request_order() {
    let h = Harness::new();
    let event_id = h.event(3).await;
    let (_, a) = h.register_user(event_id).await;
    let (owner, b) = h.register_user(event_id).await;
    h.service.cancel(&Actor::User(owner), b.id).await.unwrap();
    let unknown = RegistrationId::new();

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![a.id, b.id, unknown, a.id],
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 1);
    let ids: Vec<RegistrationId> = report.items.iter().map(|i| i.registration_id).collect();
    assert_eq!(ids, vec![a.id, b.id, unknown]);
    assert_eq!(
        report.items[0].outcome,
        BulkItemOutcome::Modified {
            status: RegistrationStatus::Cancelled
        }
    );
    assert!(matches!(
        report.items[1].outcome,
        BulkItemOutcome::Failed {
            code: "ALREADY_CANCELLED",
            ..
        }
    ));
    assert!(matches!(
        report.items[2].outcome,
        BulkItemOutcome::Failed {
            code: "NOT_FOUND",
            ..
        }
    ));
    assert!(report.per_event_promotions.is_empty());
    assert_eq!(h.current(event_id).await, 0);
}

#[tokio::test]
async fn bulk_cancel_spans_events() {
    let h = Harness::new();
    let first = h.event(1).await;
    let second = h.event(1).await;
    let (_, a1) = h.register_user(first).await;
    let (_, w1) = h.register_user(first).await;
    let (_, a2) = h.register_user(second).await;
    let (_, w2) = h.register_user(second).await;

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![a2.id, a1.id],
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 2);
    assert_eq!(report.per_event_promotions.get(&first), Some(&vec![w1.id]));
    assert_eq!(report.per_event_promotions.get(&second), Some(&vec![w2.id]));
    assert_eq!(h.current(first).await, 1);
    assert_eq!(h.current(second).await, 1);
}

#[tokio::test]
async fn bulk_mark_attended_is_capacity_neutral() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (_, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;
    let (_, w) = h.register_user(event_id).await;

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![a.id, b.id, w.id],
                action: BulkAction::MarkAttended,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 2);
    assert!(matches!(
        report.items[2].outcome,
        BulkItemOutcome::Failed {
            code: "INVALID_TRANSITION",
            ..
        }
    ));
    assert_eq!(h.current(event_id).await, 2);
    assert!(report.per_event_promotions.is_empty());
}

#[tokio::test]
async fn bulk_promote_follows_request_order_until_slots_run_out() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let w1 = h.seed_waitlisted(event_id).await;
    let w2 = h.seed_waitlisted(event_id).await;
    let w3 = h.seed_waitlisted(event_id).await;

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![w3.id, w1.id, w2.id],
                action: BulkAction::Promote,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 2);
    assert!(matches!(
        report.items[2].outcome,
        BulkItemOutcome::Failed {
            code: "EVENT_FULL",
            ..
        }
    ));
    assert_eq!(h.status_of(w3.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(w1.id).await, RegistrationStatus::Registered);
    assert_eq!(h.status_of(w2.id).await, RegistrationStatus::Waitlisted);
    assert_eq!(h.current(event_id).await, 2);
    assert!(report.per_event_promotions.is_empty());
}

#[tokio::test]
async fn bulk_promote_at_capacity_fails_every_item() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (_, a) = h.register_user(event_id).await;
    let (_, b) = h.register_user(event_id).await;

    let report = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![b.id, a.id],
                action: BulkAction::Promote,
            },
        )
        .await
        .unwrap();

    assert_eq!(report.modified_count, 0);
    assert!(matches!(
        report.items[0].outcome,
        BulkItemOutcome::Failed {
            code: "EVENT_FULL",
            ..
        }
    ));
    assert!(matches!(
        report.items[1].outcome,
        BulkItemOutcome::Failed {
            code: "INVALID_TRANSITION",
            ..
        }
    ));
    assert_eq!(h.status_of(b.id).await, RegistrationStatus::Waitlisted);
}

#[tokio::test]
async fn bulk_requests_are_validated_before_any_change() {
    let h = Harness::with_settings(ServiceSettings { max_bulk_batch: 2 });
    let event_id = h.event(5).await;
    let (_, a) = h.register_user(event_id).await;

    let err = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: Vec::new(),
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Validation(ValidationError::EmptyBatch)
    ));

    let err = h
        .service
        .bulk_admin_operation(
            &h.admin,
            BulkRequest {
                registration_ids: vec![a.id, RegistrationId::new(), RegistrationId::new()],
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistrationError::Validation(ValidationError::BatchTooLarge {
            limit: 2,
            actual: 3,
        })
    ));

    let err = h
        .service
        .bulk_admin_operation(
            &Actor::User(UserId::new()),
            BulkRequest {
                registration_ids: vec![a.id],
                action: BulkAction::Cancel,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RegistrationError::Unauthorized));

    assert_eq!(h.status_of(a.id).await, RegistrationStatus::Registered);
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn registration_lookup_reports_active_status() {
    let h = Harness::new();
    let event_id = h.event(1).await;
    let (registered, _) = h.register_user(event_id).await;
    h.service
        .register(
            event_id,
            Subject::guest("Ada", "ada@example.com", None).unwrap(),
        )
        .await
        .unwrap();

    let lookup = |key| h.service.is_registered(event_id, key);
    assert_eq!(
        lookup(IdentityKey::for_user(registered)).await.unwrap(),
        RegistrationLookup::Registered
    );
    assert_eq!(
        lookup(IdentityKey::for_guest_email("ADA@example.com").unwrap())
            .await
            .unwrap(),
        RegistrationLookup::Waitlisted
    );
    assert_eq!(
        lookup(IdentityKey::for_user(UserId::new())).await.unwrap(),
        RegistrationLookup::None
    );
}

#[tokio::test]
async fn ledger_report_matches_registrations() {
    let h = Harness::new();
    let event_id = h.event(2).await;
    let (_, a) = h.register_user(event_id).await;
    let (owner, b) = h.register_user(event_id).await;
    h.register_user(event_id).await;
    h.register_user(event_id).await;
    h.service.mark_attended(&h.admin, a.id).await.unwrap();
    h.service.cancel(&Actor::User(owner), b.id).await.unwrap();

    let report = h.service.ledger_report(event_id).await.unwrap();

    assert_eq!(report.max_attendees, 2);
    assert_eq!(report.current_attendees, 2);
    assert_eq!(report.counted, 2);
    assert_eq!(report.waitlisted, 1);
    assert_eq!(report.status, EventStatus::Full);
    assert!(report.consistent);

    let listed = h.service.registrations(event_id).await.unwrap();
    assert_eq!(listed.len(), 4);
    assert!(listed.windows(2).all(|w| w[0].registered_at <= w[1].registered_at));
}
