//! Booking store and intent log abstractions.
//!
//! The engine needs exactly two capabilities from persistence: read a booking
//! by id, and replace it conditionally on the version it read. Nothing here
//! assumes multi-document transactions.
//!
//! # Implementations
//!
//! - `PostgresBookingStore` (in `booking-postgres`): production
//! - `InMemoryBookingStore` (in `booking-testing`): tests, with fault injection
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the
//! engine can hold `Arc<dyn BookingStore>`.

use crate::error::StoreError;
use crate::types::{Booking, BookingId, Intent, IntentId, Version};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Persistent booking records with compare-and-swap updates.
pub trait BookingStore: Send + Sync {
    /// Load a booking.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no booking with this id
    /// - `Unavailable`: the database could not be reached
    fn get(&self, booking_id: BookingId) -> StoreFuture<'_, Booking>;

    /// Atomically replace a booking if its stored version is `expected`.
    ///
    /// `next.version` is ignored; on success the store writes
    /// `expected.next()` and returns the booking as stored.
    ///
    /// The intent log is append-only. Intents in `next.intent_log` whose ids
    /// are already stored are left as stored (including their `applied_by`
    /// sets); the remainder is appended in order.
    ///
    /// # Errors
    ///
    /// - `VersionConflict`: stored version differs; nothing was written
    /// - `NotFound`: no booking with this id
    /// - `InvalidUpdate`: `next` would drop or reorder logged intents
    /// - `Unavailable`: the database could not be reached
    fn compare_and_swap(
        &self,
        booking_id: BookingId,
        expected: Version,
        next: Booking,
    ) -> StoreFuture<'_, Booking>;

    /// Insert a new booking as given.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: a booking with this id is stored
    /// - `Unavailable`: the database could not be reached
    fn create(&self, booking: Booking) -> StoreFuture<'_, Booking>;
}

/// Unprocessed intents of one booking, in log order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingIntents {
    /// Booking the intents belong to.
    pub booking_id: BookingId,
    /// Intents the consumer has not processed, oldest first.
    pub intents: Vec<Intent>,
}

/// Consumer-side view of the intent log.
///
/// Marking an intent applied does not change the booking's version: it is
/// bookkeeping on the log entry, not a transition.
pub trait IntentLog: Send + Sync {
    /// Up to `limit` intents not yet applied by `consumer`, grouped per
    /// booking, each group in log order, groups ordered by booking id.
    ///
    /// With `after` set, only bookings whose id sorts strictly after it are
    /// considered. Drains page through the log this way so bookings that
    /// keep failing cannot hold every batch.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: the database could not be reached
    fn unapplied(
        &self,
        consumer: &'static str,
        after: Option<BookingId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<PendingIntents>>;

    /// Record that `consumer` processed an intent. Idempotent.
    ///
    /// # Errors
    ///
    /// - `NotFound`: booking or intent unknown
    /// - `Unavailable`: the database could not be reached
    fn mark_applied(
        &self,
        booking_id: BookingId,
        intent_id: IntentId,
        consumer: &'static str,
    ) -> StoreFuture<'_, ()>;
}

/// Append-only merge used by store implementations.
///
/// Returns the log to persist: the stored log with each entry kept verbatim,
/// followed by the entries of `proposed` beyond it.
///
/// # Errors
///
/// Returns `InvalidUpdate` when `proposed` does not start with the stored
/// intents in the same order.
pub fn merge_intent_log(stored: &[Intent], proposed: Vec<Intent>) -> Result<Vec<Intent>, StoreError> {
    if proposed.len() < stored.len() {
        return Err(StoreError::InvalidUpdate(format!(
            "intent log would shrink from {} to {} entries",
            stored.len(),
            proposed.len()
        )));
    }

    if let Some((existing, candidate)) = stored
        .iter()
        .zip(proposed.iter())
        .find(|(existing, candidate)| existing.id != candidate.id)
    {
        return Err(StoreError::InvalidUpdate(format!(
            "intent log rewrites {} as {}",
            existing.id, candidate.id
        )));
    }

    let mut merged = stored.to_vec();
    merged.extend(proposed.into_iter().skip(stored.len()));
    Ok(merged)
}
