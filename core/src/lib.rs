//! # Booking Core
//!
//! Types, rules and collaborator traits for the booking lifecycle of a
//! home-services marketplace.
//!
//! ## Concepts
//!
//! - **Booking**: a customer's request for a service, carried through
//!   `pending → assigned → accepted → in_progress → completed` (or
//!   `cancelled`/`rejected`) by admins and workers
//! - **Transition**: one validated status change, committed by
//!   compare-and-swap on the booking's version
//! - **Intent**: a side effect (wallet credit, coin credit, notification)
//!   recorded in the booking's append-only log and applied later, exactly
//!   once, by a consumer
//!
//! ## Layout
//!
//! - [`state_machine`]: the edge table and pure transition planning
//! - [`worker`]: worker records and the assignment selection policy
//! - [`store`], [`ledger`], [`notification`]: traits implemented by the
//!   persistence and delivery layers
//! - [`environment`]: injected clock
//!
//! Nothing in this crate performs I/O; the async engine and the consumers
//! live in `booking-runtime`.

pub mod error;
pub mod ledger;
pub mod notification;
pub mod state_machine;
pub mod store;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use error::{StoreError, TransitionError};
pub use smallvec::SmallVec;
pub use types::{
    Action, Actor, ActorRole, Booking, BookingId, BookingStatus, CustomerId, Intent, IntentId,
    IntentKind, Money, NotificationEvent, Recipient, ServiceId, TransitionPayload, Version,
    WorkerId,
};

/// Environment module - Dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
