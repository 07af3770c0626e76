//! Error taxonomy for booking storage and transitions.

use crate::types::{Action, ActorRole, BookingId, BookingStatus, Version};
use thiserror::Error;

/// Errors raised by booking stores, intent logs and worker directories.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No booking with this id.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// Optimistic concurrency conflict: the stored version moved on.
    ///
    /// The record was left untouched.
    #[error("Version conflict on booking {booking_id}: expected version {expected}, found {actual}")]
    VersionConflict {
        /// Booking the write targeted.
        booking_id: BookingId,
        /// Version the writer read.
        expected: Version,
        /// Version currently stored.
        actual: Version,
    },

    /// A booking with this id already exists.
    #[error("Booking already exists: {0}")]
    AlreadyExists(BookingId),

    /// The update would rewrite history (e.g. drop or reorder logged intents).
    #[error("Invalid update: {0}")]
    InvalidUpdate(String),

    /// The backing database could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored record could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors returned by `request_transition`.
///
/// Everything except [`TransitionError::Conflict`],
/// [`TransitionError::VersionConflict`] and
/// [`TransitionError::DependencyUnavailable`] is deterministic: retrying the
/// same request against the same state yields the same error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    /// Booking absent.
    #[error("Booking not found: {0}")]
    NotFound(BookingId),

    /// Booking is completed, cancelled or rejected.
    #[error("Booking {booking_id} is {status} and can no longer change")]
    TerminalState {
        /// Booking id.
        booking_id: BookingId,
        /// Its terminal status.
        status: BookingStatus,
    },

    /// The actor may not perform this action on this booking.
    #[error("{role} may not {action} this booking: {reason}")]
    Forbidden {
        /// Requested action.
        action: Action,
        /// Role of the requester.
        role: ActorRole,
        /// Which rule refused it.
        reason: String,
    },

    /// No edge for this action out of the current status.
    #[error("Cannot {action} a booking that is {status}")]
    InvalidTransition {
        /// Current status.
        status: BookingStatus,
        /// Requested action.
        action: Action,
    },

    /// The payload is missing data or names an unusable worker.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// The caller's expected version is stale.
    #[error("Booking {booking_id} is at version {actual}, request expected {expected}")]
    VersionConflict {
        /// Booking id.
        booking_id: BookingId,
        /// Version the caller supplied.
        expected: Version,
        /// Version currently stored.
        actual: Version,
    },

    /// Lost the compare-and-swap race on every attempt.
    #[error("Booking {booking_id} kept changing; gave up after {attempts} attempts")]
    Conflict {
        /// Booking id.
        booking_id: BookingId,
        /// How many attempts were made.
        attempts: usize,
    },

    /// Booking store or worker directory unreachable.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Stored data could not be interpreted.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransitionError {
    /// Whether the caller may reasonably retry the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Conflict { .. } | Self::VersionConflict { .. } | Self::DependencyUnavailable(_)
        )
    }

    /// Stable machine-readable code, used by the HTTP layer and metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::TerminalState { .. } => "TERMINAL_STATE",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::VersionConflict { .. } => "VERSION_CONFLICT",
            Self::Conflict { .. } => "CONFLICT",
            Self::DependencyUnavailable(_) => "DEPENDENCY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<StoreError> for TransitionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::VersionConflict {
                booking_id,
                expected,
                actual,
            } => Self::VersionConflict {
                booking_id,
                expected,
                actual,
            },
            StoreError::Unavailable(msg) => Self::DependencyUnavailable(msg),
            StoreError::AlreadyExists(id) => {
                Self::Internal(format!("unexpected duplicate booking {id}"))
            },
            StoreError::InvalidUpdate(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
