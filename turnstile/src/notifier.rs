//! Notification delivery.
//!
//! Delivery happens after commit and never fails the operation that triggered it.

use crate::metrics;
use turnstile_core::{BoxFuture, Notification, NotificationKind, Notifier, NotifyError, Registration};

/// Notifier that writes each notification to the log.
///
/// Used when no outbound channel is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
        Box::pin(async move {
            tracing::info!(
                kind = ?notification.kind,
                registration_id = %notification.registration_id,
                event_id = %notification.event_id,
                "Notification dispatched"
            );
            Ok(())
        })
    }
}

/// Send one notification about `registration`, logging a failure instead of
/// returning it.
pub async fn deliver(notifier: &dyn Notifier, kind: NotificationKind, registration: &Registration) {
    let notification = Notification {
        kind,
        registration_id: registration.id,
        event_id: registration.event_id,
        subject: registration.subject.clone(),
    };
    if let Err(e) = notifier.notify(notification).await {
        metrics::record_notification_failure();
        tracing::warn!(
            error = %e,
            kind = ?kind,
            registration_id = %registration.id,
            "Notification delivery failed"
        );
    }
}

/// Send the same kind of notification for each registration, in order.
pub async fn deliver_all(
    notifier: &dyn Notifier,
    kind: NotificationKind,
    registrations: &[Registration],
) {
    for registration in registrations {
        deliver(notifier, kind, registration).await;
    }
}
