//! The transition engine.
//!
//! Loads a booking, validates the request against the edge table, plans the
//! write and commits it with a single compare-and-swap. A lost race is
//! retried from the load, at most [`MAX_ATTEMPTS`] times in total.

use crate::metrics::TransitionMetrics;
use booking_core::environment::Clock;
use booking_core::state_machine::{
    CoinRate, TransitionInput, needs_worker_lookup, plan_transition, validate_edge,
};
use booking_core::store::BookingStore;
use booking_core::worker::{Worker, WorkerDirectory, select_worker};
use booking_core::{
    Action, Actor, BookingId, BookingStatus, Intent, StoreError, TransitionError,
    TransitionPayload, Version, WorkerId,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Total compare-and-swap attempts per request, first one included.
pub const MAX_ATTEMPTS: usize = 3;

/// Engine tunables.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Loyalty coins credited per unit of price on completion.
    pub coin_rate: CoinRate,
}

/// A request to move a booking along one edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    /// Target booking.
    pub booking_id: BookingId,
    /// Who is asking.
    pub actor: Actor,
    /// What they ask for.
    pub action: Action,
    /// Action-specific data.
    #[serde(default)]
    pub payload: TransitionPayload,
    /// Version the caller last saw. When set, any mismatch is reported as
    /// `VersionConflict` instead of being retried.
    #[serde(default)]
    pub expected_version: Option<Version>,
}

impl TransitionRequest {
    /// A request without payload or version pin.
    #[must_use]
    pub fn new(booking_id: BookingId, actor: Actor, action: Action) -> Self {
        Self {
            booking_id,
            actor,
            action,
            payload: TransitionPayload::default(),
            expected_version: None,
        }
    }

    /// Attach a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: TransitionPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Pin the request to a version.
    #[must_use]
    pub fn expecting(mut self, version: Version) -> Self {
        self.expected_version = Some(version);
        self
    }
}

/// A committed transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionResult {
    /// Booking id.
    pub booking_id: BookingId,
    /// Status after the transition.
    pub status: BookingStatus,
    /// Version after the transition.
    pub version: Version,
    /// Assigned worker after the transition.
    pub worker_id: Option<WorkerId>,
    /// Intents this transition appended to the log.
    pub intents: Vec<Intent>,
}

/// Validates and commits booking transitions.
///
/// Stateless apart from its collaborators; share it behind an `Arc` and call
/// it from any number of tasks.
pub struct TransitionEngine {
    bookings: Arc<dyn BookingStore>,
    workers: Arc<dyn WorkerDirectory>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl TransitionEngine {
    /// Create an engine over the given collaborators.
    #[must_use]
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        workers: Arc<dyn WorkerDirectory>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            bookings,
            workers,
            clock,
            config,
        }
    }

    /// Apply one transition.
    ///
    /// # Errors
    ///
    /// - `NotFound`, `TerminalState`, `InvalidTransition`, `Forbidden`,
    ///   `InvalidPayload`: deterministic, returned without retry
    /// - `VersionConflict`: `expected_version` was set and is stale
    /// - `Conflict`: lost the race [`MAX_ATTEMPTS`] times
    /// - `DependencyUnavailable`: store or worker directory unreachable
    #[tracing::instrument(
        skip(self, request),
        fields(
            booking_id = %request.booking_id,
            action = %request.action,
            role = %request.actor.role(),
        )
    )]
    pub async fn request_transition(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionResult, TransitionError> {
        let started = Instant::now();
        let result = self.commit_with_retry(&request).await;

        let outcome = match &result {
            Ok(committed) => {
                tracing::info!(
                    status = %committed.status,
                    version = %committed.version,
                    intents = committed.intents.len(),
                    "Transition committed"
                );
                "committed"
            },
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, "Transition not applied");
                outcome_label(err)
            },
            Err(err) => {
                tracing::debug!(error = %err, "Transition refused");
                outcome_label(err)
            },
        };
        TransitionMetrics::record(request.action.as_str(), outcome, started.elapsed());

        result
    }

    /// Assign (or reassign) a booking to the least-loaded capable worker.
    ///
    /// A pending booking is assigned; an assigned one is reassigned to a
    /// different worker. The commit itself is an ordinary admin transition.
    ///
    /// # Errors
    ///
    /// As [`Self::request_transition`]; `InvalidPayload` when no candidate
    /// worker is available.
    #[tracing::instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn auto_assign(
        &self,
        booking_id: BookingId,
    ) -> Result<TransitionResult, TransitionError> {
        let booking = self.bookings.get(booking_id.clone()).await?;

        let action = match booking.status {
            BookingStatus::Pending => Action::Assign,
            BookingStatus::Assigned => Action::Reassign,
            status if status.is_terminal() => {
                return Err(TransitionError::TerminalState { booking_id, status });
            },
            status => {
                return Err(TransitionError::InvalidTransition {
                    status,
                    action: Action::Assign,
                });
            },
        };

        let candidates = self
            .workers
            .candidates(booking.service_id.clone())
            .await
            .map_err(directory_unavailable)?;

        let chosen = select_worker(&booking, &candidates).ok_or_else(|| {
            TransitionError::InvalidPayload(format!(
                "no available worker offers service {}",
                booking.service_id
            ))
        })?;
        tracing::debug!(worker_id = %chosen.id, candidates = candidates.len(), "Selected worker");

        let request = TransitionRequest::new(booking_id, Actor::Admin, action)
            .with_payload(TransitionPayload::worker(chosen.id.clone()));
        self.request_transition(request).await
    }

    async fn commit_with_retry(
        &self,
        request: &TransitionRequest,
    ) -> Result<TransitionResult, TransitionError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let booking = self.bookings.get(request.booking_id.clone()).await?;

            match request.expected_version {
                Some(expected) if expected != booking.version => {
                    return Err(TransitionError::VersionConflict {
                        booking_id: booking.id,
                        expected,
                        actual: booking.version,
                    });
                },
                _ => {},
            }

            validate_edge(&booking, request.action, request.actor.role())?;
            let worker = self.lookup_worker(request).await?;

            let plan = plan_transition(&TransitionInput {
                booking: &booking,
                actor: &request.actor,
                action: request.action,
                payload: &request.payload,
                worker: worker.as_ref(),
                now: self.clock.now(),
                coin_rate: self.config.coin_rate,
            })?;

            match self
                .bookings
                .compare_and_swap(booking.id.clone(), booking.version, plan.next)
                .await
            {
                Ok(stored) => {
                    return Ok(TransitionResult {
                        booking_id: stored.id,
                        status: stored.status,
                        version: stored.version,
                        worker_id: stored.worker_id,
                        intents: plan.emitted.into_vec(),
                    });
                },
                Err(StoreError::VersionConflict { actual, .. }) => {
                    TransitionMetrics::record_conflict();
                    if let Some(expected) = request.expected_version {
                        return Err(TransitionError::VersionConflict {
                            booking_id: booking.id,
                            expected,
                            actual,
                        });
                    }
                    tracing::warn!(
                        attempt,
                        read = %booking.version,
                        stored = %actual,
                        "Lost compare-and-swap, reloading"
                    );
                },
                Err(err) => return Err(err.into()),
            }
        }

        tracing::error!(attempts = MAX_ATTEMPTS, "Gave up after repeated conflicts");
        Err(TransitionError::Conflict {
            booking_id: request.booking_id.clone(),
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn lookup_worker(
        &self,
        request: &TransitionRequest,
    ) -> Result<Option<Worker>, TransitionError> {
        if !needs_worker_lookup(request.action) {
            return Ok(None);
        }
        let Some(worker_id) = request.payload.worker_id.clone() else {
            return Ok(None);
        };
        self.workers
            .get(worker_id)
            .await
            .map_err(directory_unavailable)
    }
}

fn directory_unavailable(err: StoreError) -> TransitionError {
    TransitionError::DependencyUnavailable(format!("worker directory: {err}"))
}

const fn outcome_label(err: &TransitionError) -> &'static str {
    match err {
        TransitionError::NotFound(_) => "not_found",
        TransitionError::TerminalState { .. } => "terminal_state",
        TransitionError::Forbidden { .. } => "forbidden",
        TransitionError::InvalidTransition { .. } => "invalid_transition",
        TransitionError::InvalidPayload(_) => "invalid_payload",
        TransitionError::VersionConflict { .. } => "version_conflict",
        TransitionError::Conflict { .. } => "conflict",
        TransitionError::DependencyUnavailable(_) => "dependency_unavailable",
        TransitionError::Internal(_) => "internal",
    }
}
