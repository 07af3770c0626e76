//! # Booking Testing
//!
//! Testing utilities for the booking workspace.
//!
//! This crate provides:
//! - In-memory implementations of every collaborator trait, with fault
//!   injection ([`InMemoryBookingStore`], [`InMemoryWorkerDirectory`],
//!   [`InMemoryLedgerStore`], [`RecordingNotificationSender`])
//! - A fixed clock
//! - [`BookingBuilder`] and invariant assertions
//! - A Given-When-Then harness for transition planning ([`TransitionTest`])
//! - proptest strategies for actors, actions and payloads
//!
//! ## Example
//!
//! ```ignore
//! use booking_testing::{BookingBuilder, InMemoryBookingStore, InMemoryWorkerDirectory, test_clock, worker};
//!
//! #[tokio::test]
//! async fn assigns() {
//!     let store = Arc::new(InMemoryBookingStore::with_bookings([BookingBuilder::new("bk-1").build()]));
//!     let workers = Arc::new(InMemoryWorkerDirectory::new([worker("w-1", &["cleaning"])]));
//!     let engine = TransitionEngine::new(store, workers, Arc::new(test_clock()), EngineConfig::default());
//!     // ...
//! }
//! ```

pub mod directory;
pub mod ledger;
pub mod notifications;
pub mod store;

use chrono::{DateTime, Utc};

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{DateTime, Utc};
    use booking_core::environment::Clock;

    /// Fixed clock for deterministic tests
    ///
    /// # Example
    ///
    /// ```
    /// use booking_testing::mocks::FixedClock;
    /// use booking_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
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

    /// Fixed clock at 2025-01-01 00:00:00 UTC
    ///
    /// # Panics
    ///
    /// Never in practice: the timestamp is a constant.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Builders and assertions.
pub mod helpers {
    use super::mocks::test_clock;
    use booking_core::environment::Clock;
    use booking_core::{
        Booking, BookingId, BookingStatus, CustomerId, Money, ServiceId, Version, WorkerId,
    };
    use std::collections::HashSet;

    /// Builds bookings in any state without going through transitions.
    ///
    /// Defaults: customer `c-1`, service `cleaning`, price 25.00, pending,
    /// version 0, empty intent log.
    #[derive(Clone, Debug)]
    pub struct BookingBuilder {
        booking: Booking,
    }

    impl BookingBuilder {
        /// Start from a pending booking with the given id.
        #[must_use]
        pub fn new(id: &str) -> Self {
            Self {
                booking: Booking::new_pending(
                    BookingId::new(id),
                    CustomerId::new("c-1"),
                    ServiceId::new("cleaning"),
                    Money::from_minor(2_500),
                    test_clock().now(),
                ),
            }
        }

        /// Set the owning customer.
        #[must_use]
        pub fn customer(mut self, customer: &str) -> Self {
            self.booking.customer_id = CustomerId::new(customer);
            self
        }

        /// Set the service.
        #[must_use]
        pub fn service(mut self, service: &str) -> Self {
            self.booking.service_id = ServiceId::new(service);
            self
        }

        /// Set the price.
        #[must_use]
        pub fn price(mut self, price: Money) -> Self {
            self.booking.price = price;
            self
        }

        /// Set the status, leaving the worker as is.
        #[must_use]
        pub fn status(mut self, status: BookingStatus) -> Self {
            self.booking.status = status;
            self
        }

        /// Set the assigned worker.
        #[must_use]
        pub fn worker(mut self, worker: &str) -> Self {
            self.booking.worker_id = Some(WorkerId::new(worker));
            self
        }

        /// Assigned to `worker`.
        #[must_use]
        pub fn assigned(self, worker: &str) -> Self {
            self.status(BookingStatus::Assigned).worker(worker)
        }

        /// Accepted by `worker`.
        #[must_use]
        pub fn accepted(self, worker: &str) -> Self {
            self.status(BookingStatus::Accepted).worker(worker)
        }

        /// In progress with `worker`.
        #[must_use]
        pub fn in_progress(self, worker: &str) -> Self {
            self.status(BookingStatus::InProgress).worker(worker)
        }

        /// Completed by `worker`.
        #[must_use]
        pub fn completed(self, worker: &str) -> Self {
            self.status(BookingStatus::Completed).worker(worker)
        }

        /// Set the stored version.
        #[must_use]
        pub fn version(mut self, version: u64) -> Self {
            self.booking.version = Version::new(version);
            self
        }

        /// Finish.
        #[must_use]
        pub fn build(self) -> Booking {
            self.booking
        }
    }

    /// Assert every invariant a stored booking must satisfy.
    ///
    /// # Panics
    ///
    /// Panics naming the first violated invariant.
    pub fn assert_invariants(booking: &Booking) {
        assert!(
            booking.worker_invariant_holds(),
            "booking {} is {} with worker {:?}",
            booking.id,
            booking.status,
            booking.worker_id
        );

        let mut ids = HashSet::new();
        for intent in &booking.intent_log {
            assert!(ids.insert(&intent.id), "intent {} logged twice", intent.id);
            assert_eq!(
                intent.booking_id, booking.id,
                "intent {} logged on the wrong booking",
                intent.id
            );
        }
    }
}

/// proptest strategies for domain inputs.
pub mod properties {
    use booking_core::{Action, Actor, CustomerId, TransitionPayload, WorkerId};
    use proptest::prelude::*;

    /// Workers the strategies draw from.
    pub const WORKERS: [&str; 3] = ["w-1", "w-2", "w-3"];

    /// Any actor: admin, customer `c-1`/`c-2`, or one of [`WORKERS`].
    pub fn arb_actor() -> impl Strategy<Value = Actor> {
        prop_oneof![
            Just(Actor::Admin),
            prop_oneof![Just("c-1"), Just("c-2")].prop_map(|id| Actor::Customer(CustomerId::new(id))),
            proptest::sample::select(WORKERS.to_vec()).prop_map(|id| Actor::Worker(WorkerId::new(id))),
        ]
    }

    /// Any action.
    pub fn arb_action() -> impl Strategy<Value = Action> {
        proptest::sample::select(Action::ALL.to_vec())
    }

    /// Payloads naming a known worker, an unknown one, or none.
    pub fn arb_payload() -> impl Strategy<Value = TransitionPayload> {
        (
            proptest::option::of(prop_oneof![
                proptest::sample::select(WORKERS.to_vec()),
                Just("w-unknown"),
            ]),
            proptest::option::of(Just("changed plans")),
        )
            .prop_map(|(worker, reason)| TransitionPayload {
                worker_id: worker.map(WorkerId::new),
                reason: reason.map(str::to_string),
            })
    }

    /// A sequence of requests.
    pub fn arb_requests(
        max_len: usize,
    ) -> impl Strategy<Value = Vec<(Actor, Action, TransitionPayload)>> {
        proptest::collection::vec((arb_actor(), arb_action(), arb_payload()), 1..max_len.max(2))
    }
}

// Re-export commonly used items
pub use directory::{InMemoryWorkerDirectory, worker};
pub use helpers::{BookingBuilder, assert_invariants};
pub use ledger::InMemoryLedgerStore;
pub use mocks::{FixedClock, test_clock};
pub use notifications::RecordingNotificationSender;
pub use store::InMemoryBookingStore;
pub use transition_test::TransitionTest;
