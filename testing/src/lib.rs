//! # Turnstile Testing
//!
//! Testing utilities for the capacity ledger and registration service.
//!
//! This crate provides:
//! - [`InMemoryRegistrationStore`]: transactional in-memory store
//! - [`FixedClock`] and [`SteppingClock`]: deterministic time
//! - [`RecordingNotifier`]: captures notifications for assertions
//!
//! ## Example
//!
//! ```ignore
//! use turnstile_testing::{InMemoryRegistrationStore, RecordingNotifier, SteppingClock};
//!
//! #[tokio::test]
//! async fn registers_first_subject() {
//!     let store = InMemoryRegistrationStore::new();
//!     let service = RegistrationService::new(
//!         Arc::new(store.clone()),
//!         Arc::new(SteppingClock::default()),
//!         Arc::new(RecordingNotifier::new()),
//!     );
//!     // ...
//! }
//! ```

pub mod store;

pub use mocks::{FixedClock, RecordingNotifier, SteppingClock, test_clock};
pub use store::InMemoryRegistrationStore;

/// Mock implementations of Environment traits
pub mod mocks {
    use chrono::{DateTime, Duration, Utc};
    use std::sync::Mutex;
    use turnstile_core::environment::Clock;
    use turnstile_core::{BoxFuture, Notification, NotificationKind, Notifier, NotifyError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use turnstile_testing::mocks::FixedClock;
    /// use turnstile_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(epoch())
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |t| t.with_timezone(&Utc))
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Successive registrations get strictly increasing `registered_at` values,
    /// which pins down waitlist order in tests.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }

        /// Move the clock forward without reading it
        pub fn advance(&self, by: Duration) {
            if let Ok(mut next) = self.next.lock() {
                *next += by;
            }
        }
    }

    impl Default for SteppingClock {
        fn default() -> Self {
            Self::new(epoch(), Duration::milliseconds(1))
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> DateTime<Utc> {
            match self.next.lock() {
                Ok(mut next) => {
                    let now = *next;
                    *next += self.step;
                    now
                }
                Err(poisoned) => *poisoned.into_inner(),
            }
        }
    }

    /// Notifier that records every notification it receives.
    ///
    /// Can be switched into a failing mode to check that delivery errors never
    /// roll back state transitions.
    #[derive(Debug, Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<Notification>>,
        fail: Mutex<bool>,
    }

    impl RecordingNotifier {
        /// Create an empty recorder
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Make every subsequent delivery fail (the notification is still recorded)
        pub fn fail_deliveries(&self) {
            if let Ok(mut fail) = self.fail.lock() {
                *fail = true;
            }
        }

        /// Everything recorded so far, in delivery order
        #[must_use]
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().map(|s| s.clone()).unwrap_or_default()
        }

        /// Recorded notifications of one kind
        #[must_use]
        pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
            self.sent()
                .into_iter()
                .filter(|n| n.kind == kind)
                .collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) -> BoxFuture<'_, Result<(), NotifyError>> {
            Box::pin(async move {
                if let Ok(mut sent) = self.sent.lock() {
                    sent.push(notification);
                }
                let failing = self.fail.lock().map(|f| *f).unwrap_or(false);
                if failing {
                    Err(NotifyError("recording notifier set to fail".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }
}
