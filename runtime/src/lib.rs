//! # Booking Runtime
//!
//! Async execution around the pure rules in `booking-core`:
//!
//! - [`engine::TransitionEngine`]: load, validate, plan and commit a
//!   transition with bounded compare-and-swap retry
//! - [`ledger::LedgerApplier`] and [`notifier::Notifier`]: idempotent intent
//!   consumers
//! - [`drain::IntentDrain`]: background loop feeding a consumer from the
//!   intent log
//! - [`retry`], [`metrics`], [`health`]: shared operational plumbing
//!
//! # Example
//!
//! ```ignore
//! use booking_runtime::engine::{EngineConfig, TransitionEngine, TransitionRequest};
//! use booking_core::{Action, Actor, BookingId, TransitionPayload};
//!
//! let engine = TransitionEngine::new(bookings, workers, clock, EngineConfig::default());
//! let result = engine
//!     .request_transition(
//!         TransitionRequest::new(BookingId::new("bk-1"), Actor::Admin, Action::Assign)
//!             .with_payload(TransitionPayload::worker("w-7")),
//!     )
//!     .await?;
//! assert_eq!(result.intents.len(), 1);
//! ```

pub mod drain;
pub mod engine;
pub mod health;
pub mod ledger;
pub mod metrics;
pub mod notifier;
pub mod retry;

pub use drain::{ApplyOutcome, ConsumerError, DrainError, DrainReport, IntentConsumer, IntentDrain};
pub use engine::{EngineConfig, MAX_ATTEMPTS, TransitionEngine, TransitionRequest, TransitionResult};
pub use ledger::{LEDGER_CONSUMER, LedgerApplier};
pub use notifier::{NOTIFIER_CONSUMER, Notifier};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_predicate};
