//! Worker records as seen by the engine, and the assignment selection policy.
//!
//! Workers are owned by another part of the marketplace. The engine only
//! reads them: to check an admin's assignment and to pick a worker when asked
//! to auto-assign.

use crate::store::StoreFuture;
use crate::types::{Booking, ServiceId, WorkerId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Read-only view of a worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Worker id.
    pub id: WorkerId,
    /// Services the worker is qualified for.
    pub services: BTreeSet<ServiceId>,
    /// Deactivated workers receive no new bookings.
    pub active: bool,
    /// Maximum number of simultaneously open bookings.
    pub capacity: u32,
    /// Bookings currently assigned, accepted or in progress.
    pub open_bookings: u32,
}

impl Worker {
    /// Whether the worker is qualified for `service`.
    #[must_use]
    pub fn can_serve(&self, service: &ServiceId) -> bool {
        self.services.contains(service)
    }

    /// Whether the worker can take one more booking right now.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.active && self.open_bookings < self.capacity
    }
}

/// Lookup of worker records.
pub trait WorkerDirectory: Send + Sync {
    /// Fetch one worker. `Ok(None)` when the id is unknown.
    fn get(&self, worker_id: WorkerId) -> StoreFuture<'_, Option<Worker>>;

    /// All workers qualified for a service, available or not.
    fn candidates(&self, service_id: ServiceId) -> StoreFuture<'_, Vec<Worker>>;
}

/// Pick the worker an auto-assignment should go to.
///
/// Only qualified, available workers other than the one currently on the
/// booking are considered. Among those the least loaded wins; ties go to the
/// smallest id so the choice is deterministic.
#[must_use]
pub fn select_worker<'a>(booking: &Booking, candidates: &'a [Worker]) -> Option<&'a Worker> {
    candidates
        .iter()
        .filter(|w| w.can_serve(&booking.service_id))
        .filter(|w| w.is_available())
        .filter(|w| booking.worker_id.as_ref() != Some(&w.id))
        .min_by(|a, b| {
            a.open_bookings
                .cmp(&b.open_bookings)
                .then_with(|| a.id.cmp(&b.id))
        })
}
