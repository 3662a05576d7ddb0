//! Business metrics for registration and waitlist activity.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `turnstile_registrations_total{outcome}` - Registrations by initial status
//! - `turnstile_cancellations_total` - Registrations cancelled
//! - `turnstile_promotions_total{trigger}` - Waitlist promotions by trigger
//! - `turnstile_admissions_rejected_total` - Admits refused because the event was full
//! - `turnstile_bulk_items_total{action,outcome}` - Bulk items by action and result
//! - `turnstile_notification_failures_total` - Notifications that failed to deliver
//!
//! ## Gauges
//! - `turnstile_free_slots{event_id}` - Free slots after the last ledger change

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;
use turnstile_core::{EventId, LedgerSnapshot, RegistrationStatus};

/// What caused a waitlist promotion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromotionTrigger {
    /// A registered attendee cancelled
    Cancellation,
    /// An admin cancelled registrations in bulk
    BulkCancellation,
    /// Capacity was raised
    CapacityIncrease,
    /// An admin promoted a specific registration
    Admin,
}

impl PromotionTrigger {
    /// Label value used on the promotions counter
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cancellation => "cancellation",
            Self::BulkCancellation => "bulk_cancellation",
            Self::CapacityIncrease => "capacity_increase",
            Self::Admin => "admin",
        }
    }
}

/// Register metric descriptions.
///
/// Call once at start-up, before any metric is recorded.
pub fn register_business_metrics() {
    describe_counter!(
        "turnstile_registrations_total",
        "Total registrations by initial outcome (registered, waitlisted)"
    );
    describe_counter!(
        "turnstile_cancellations_total",
        "Total registrations cancelled"
    );
    describe_counter!(
        "turnstile_promotions_total",
        "Total waitlist promotions by trigger"
    );
    describe_counter!(
        "turnstile_admissions_rejected_total",
        "Admission attempts refused because the event was full or closed"
    );
    describe_counter!(
        "turnstile_bulk_items_total",
        "Bulk operation items by action and outcome"
    );
    describe_counter!(
        "turnstile_notification_failures_total",
        "Notifications the dispatcher failed to deliver"
    );
    describe_gauge!(
        "turnstile_free_slots",
        "Free slots of an event after its last ledger change"
    );

    tracing::info!("Business metrics registered");
}

/// Install the Prometheus recorder with an HTTP listener on `addr`.
///
/// # Errors
///
/// Returns [`BuildError`] if the recorder is already installed or the listener
/// cannot be bound.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    register_business_metrics();
    tracing::info!(%addr, "Prometheus metrics available at http://{addr}/metrics");
    Ok(())
}

// ============================================================================
// Metric Recording Functions
// ============================================================================

/// Record a new registration and the status it was created in.
pub fn record_registration(status: RegistrationStatus) {
    metrics::counter!("turnstile_registrations_total", "outcome" => status.as_str()).increment(1);
}

/// Record a cancellation.
pub fn record_cancellation() {
    metrics::counter!("turnstile_cancellations_total").increment(1);
}

/// Record `count` promotions caused by `trigger`.
pub fn record_promotions(trigger: PromotionTrigger, count: usize) {
    if count == 0 {
        return;
    }
    metrics::counter!("turnstile_promotions_total", "trigger" => trigger.as_str())
        .increment(u64::try_from(count).unwrap_or(u64::MAX));
}

/// Record an admit refused by the ledger.
pub fn record_admission_rejected() {
    metrics::counter!("turnstile_admissions_rejected_total").increment(1);
}

/// Record one processed bulk item.
pub fn record_bulk_item(action: &'static str, succeeded: bool) {
    let outcome = if succeeded { "modified" } else { "failed" };
    metrics::counter!("turnstile_bulk_items_total", "action" => action, "outcome" => outcome)
        .increment(1);
}

/// Record a failed notification delivery.
pub fn record_notification_failure() {
    metrics::counter!("turnstile_notification_failures_total").increment(1);
}

/// Publish the free slot count of an event.
pub fn record_free_slots(event_id: EventId, snapshot: &LedgerSnapshot) {
    let free = snapshot
        .max_attendees
        .saturating_sub(snapshot.current_attendees);
    metrics::gauge!("turnstile_free_slots", "event_id" => event_id.to_string())
        .set(f64::from(free));
}
