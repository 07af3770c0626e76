//! In-memory worker directory.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use booking_core::store::StoreFuture;
use booking_core::worker::{Worker, WorkerDirectory};
use booking_core::{ServiceId, StoreError, WorkerId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// A worker offering `services`, active, capacity 3, no open bookings.
#[must_use]
pub fn worker(id: &str, services: &[&str]) -> Worker {
    Worker {
        id: WorkerId::new(id),
        services: services.iter().copied().map(ServiceId::new).collect::<BTreeSet<_>>(),
        active: true,
        capacity: 3,
        open_bookings: 0,
    }
}

/// [`WorkerDirectory`] over a fixed set of workers.
///
/// Open-booking counts are whatever the test sets; nothing is derived from
/// bookings.
#[derive(Clone, Debug, Default)]
pub struct InMemoryWorkerDirectory {
    workers: Arc<RwLock<BTreeMap<WorkerId, Worker>>>,
    unavailable: Arc<AtomicBool>,
    lookups: Arc<AtomicUsize>,
}

impl InMemoryWorkerDirectory {
    /// Create a directory holding `workers`.
    #[must_use]
    pub fn new(workers: impl IntoIterator<Item = Worker>) -> Self {
        let directory = Self::default();
        for w in workers {
            directory.upsert(w);
        }
        directory
    }

    /// Insert or replace a worker.
    pub fn upsert(&self, worker: Worker) {
        self.workers.write().unwrap().insert(worker.id.clone(), worker);
    }

    /// Make every lookup fail with `Unavailable` (or stop doing so).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get` and `candidates` calls so far.
    #[must_use]
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("worker directory switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl WorkerDirectory for InMemoryWorkerDirectory {
    fn get(&self, worker_id: WorkerId) -> StoreFuture<'_, Option<Worker>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self.workers.read().unwrap().get(&worker_id).cloned())
        })
    }

    fn candidates(&self, service_id: ServiceId) -> StoreFuture<'_, Vec<Worker>> {
        Box::pin(async move {
            self.check_available()?;
            Ok(self
                .workers
                .read()
                .unwrap()
                .values()
                .filter(|w| w.can_serve(&service_id))
                .cloned()
                .collect())
        })
    }
}
