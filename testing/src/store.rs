//! In-memory booking store with fault injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on lock poisoning

use booking_core::store::{BookingStore, IntentLog, PendingIntents, StoreFuture, merge_intent_log};
use booking_core::{Booking, BookingId, IntentId, StoreError, Version};
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Barrier;

#[derive(Debug, Default)]
struct Faults {
    unavailable: AtomicBool,
    forced_conflicts: AtomicUsize,
    gated_swaps: AtomicUsize,
    gate: Mutex<Option<Arc<Barrier>>>,
    failing_marks: AtomicUsize,
}

/// `BTreeMap`-backed [`BookingStore`] and [`IntentLog`].
///
/// Behaves like the production store (version bump on swap, append-only
/// intent log) and can be told to misbehave:
///
/// - [`Self::set_unavailable`]: every call fails with `Unavailable`
/// - [`Self::force_conflicts`]: the next `n` swaps report a concurrent writer
/// - [`Self::gate_swaps`]: the next `n` swaps wait on a barrier first, so
///   concurrent callers reach the swap having read the same version
/// - [`Self::fail_marks`]: the next `n` `mark_applied` calls fail
///
/// Clones share state.
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookingStore {
    bookings: Arc<RwLock<BTreeMap<BookingId, Booking>>>,
    faults: Arc<Faults>,
    swaps: Arc<AtomicUsize>,
}

impl InMemoryBookingStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `bookings`, stored as given.
    #[must_use]
    pub fn with_bookings(bookings: impl IntoIterator<Item = Booking>) -> Self {
        let store = Self::new();
        for booking in bookings {
            store.insert(booking);
        }
        store
    }

    /// Insert or overwrite a booking directly, bypassing version checks.
    pub fn insert(&self, booking: Booking) {
        self.bookings.write().unwrap().insert(booking.id.clone(), booking);
    }

    /// Current stored copy of a booking.
    #[must_use]
    pub fn snapshot(&self, booking_id: &BookingId) -> Option<Booking> {
        self.bookings.read().unwrap().get(booking_id).cloned()
    }

    /// Number of successful swaps so far.
    #[must_use]
    pub fn swap_count(&self) -> usize {
        self.swaps.load(Ordering::SeqCst)
    }

    /// Make every operation fail with `Unavailable` (or stop doing so).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.faults.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make the next `n` swaps fail with `VersionConflict` without writing.
    pub fn force_conflicts(&self, n: usize) {
        self.faults.forced_conflicts.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` swaps wait on `barrier` before checking the version.
    pub fn gate_swaps(&self, barrier: Arc<Barrier>, n: usize) {
        *self.faults.gate.lock().unwrap() = Some(barrier);
        self.faults.gated_swaps.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` `mark_applied` calls fail with `Unavailable`.
    pub fn fail_marks(&self, n: usize) {
        self.faults.failing_marks.store(n, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.faults.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }

    fn take_gate(&self) -> Option<Arc<Barrier>> {
        take_one(&self.faults.gated_swaps)
            .then(|| self.faults.gate.lock().unwrap().clone())
            .flatten()
    }

    fn swap(&self, booking_id: &BookingId, expected: Version, next: Booking) -> Result<Booking, StoreError> {
        let mut bookings = self.bookings.write().unwrap();
        let stored = bookings
            .get_mut(booking_id)
            .ok_or_else(|| StoreError::NotFound(booking_id.clone()))?;

        if take_one(&self.faults.forced_conflicts) {
            return Err(StoreError::VersionConflict {
                booking_id: booking_id.clone(),
                expected,
                actual: stored.version.next()?,
            });
        }

        if stored.version != expected {
            return Err(StoreError::VersionConflict {
                booking_id: booking_id.clone(),
                expected,
                actual: stored.version,
            });
        }

        let intent_log = merge_intent_log(&stored.intent_log, next.intent_log)?;
        *stored = Booking {
            id: stored.id.clone(),
            version: expected.next()?,
            intent_log,
            ..next
        };
        self.swaps.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

/// Decrement `counter` if positive; true when it was.
fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl BookingStore for InMemoryBookingStore {
    fn get(&self, booking_id: BookingId) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            self.check_available()?;
            self.snapshot(&booking_id)
                .ok_or(StoreError::NotFound(booking_id))
        })
    }

    fn compare_and_swap(
        &self,
        booking_id: BookingId,
        expected: Version,
        next: Booking,
    ) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            if let Some(barrier) = self.take_gate() {
                barrier.wait().await;
            }
            self.check_available()?;
            self.swap(&booking_id, expected, next)
        })
    }

    fn create(&self, booking: Booking) -> StoreFuture<'_, Booking> {
        Box::pin(async move {
            self.check_available()?;
            let mut bookings = self.bookings.write().unwrap();
            if bookings.contains_key(&booking.id) {
                return Err(StoreError::AlreadyExists(booking.id));
            }
            bookings.insert(booking.id.clone(), booking.clone());
            Ok(booking)
        })
    }
}

impl IntentLog for InMemoryBookingStore {
    fn unapplied(
        &self,
        consumer: &'static str,
        after: Option<BookingId>,
        limit: usize,
    ) -> StoreFuture<'_, Vec<PendingIntents>> {
        Box::pin(async move {
            self.check_available()?;
            let bookings = self.bookings.read().unwrap();
            let mut remaining = limit;
            let mut groups = Vec::new();

            let start = after.map_or(Bound::Unbounded, Bound::Excluded);
            for booking in bookings.range((start, Bound::Unbounded)).map(|(_, b)| b) {
                if remaining == 0 {
                    break;
                }
                let intents: Vec<_> = booking
                    .unapplied_by(consumer)
                    .take(remaining)
                    .cloned()
                    .collect();
                if intents.is_empty() {
                    continue;
                }
                remaining -= intents.len();
                groups.push(PendingIntents {
                    booking_id: booking.id.clone(),
                    intents,
                });
            }
            Ok(groups)
        })
    }

    fn mark_applied(
        &self,
        booking_id: BookingId,
        intent_id: IntentId,
        consumer: &'static str,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.check_available()?;
            if take_one(&self.faults.failing_marks) {
                return Err(StoreError::Unavailable("injected mark failure".to_string()));
            }
            let mut bookings = self.bookings.write().unwrap();
            let intent = bookings
                .get_mut(&booking_id)
                .and_then(|b| b.intent_log.iter_mut().find(|i| i.id == intent_id))
                .ok_or_else(|| StoreError::NotFound(booking_id.clone()))?;
            intent.applied_by.insert(consumer.to_string());
            Ok(())
        })
    }
}
