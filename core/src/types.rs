//! Domain types for the booking lifecycle.
//!
//! Identifiers, money, the booking record itself and the side-effect intents
//! recorded in its log.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from trusted input.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a booking.
    BookingId
);

impl BookingId {
    /// Generate a fresh random booking id.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("bk-{}", uuid::Uuid::new_v4()))
    }
}

string_id!(
    /// Identifier of the customer who owns a booking.
    CustomerId
);
string_id!(
    /// Identifier of a gig worker.
    WorkerId
);
string_id!(
    /// Identifier of a bookable service (e.g. "deep-cleaning").
    ServiceId
);
string_id!(
    /// Identifier of a side-effect intent. Unique across all bookings.
    IntentId
);

impl IntentId {
    /// Deterministic intent id: the booking, the version the transition
    /// commits, and the position among the intents that transition emitted.
    ///
    /// Only one transition can ever commit a given version, so the id is
    /// globally unique without coordination.
    #[must_use]
    pub fn for_transition(booking_id: &BookingId, committed: Version, index: usize) -> Self {
        Self(format!("{booking_id}/v{}/{index}", committed.value()))
    }
}

// ============================================================================
// Version
// ============================================================================

/// Booking version used for optimistic concurrency control.
///
/// Starts at 0 when a booking is created and increases by exactly one per
/// committed transition.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of a freshly created booking.
    pub const INITIAL: Self = Self(0);

    /// Wrap a raw version number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version a successful compare-and-swap stores.
    ///
    /// # Errors
    ///
    /// `InvalidUpdate` once the counter is exhausted.
    pub fn next(self) -> Result<Self, StoreError> {
        self.0
            .checked_add(1)
            .map(Self)
            .ok_or_else(|| StoreError::InvalidUpdate(format!("version {self} cannot be incremented")))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Money
// ============================================================================

/// Amount in integer minor-currency units (paise, cents).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Create from minor units.
    #[must_use]
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Amount in minor units.
    #[must_use]
    pub const fn minor(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Status, roles, actions
// ============================================================================

/// Error returned when parsing one of the lifecycle enums from a string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Booking lifecycle status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created by the customer, not yet assigned.
    Pending,
    /// An admin assigned a worker; awaiting the worker's answer.
    Assigned,
    /// The assigned worker accepted.
    Accepted,
    /// Work has started.
    InProgress,
    /// Work finished. Terminal.
    Completed,
    /// Cancelled by customer or admin. Terminal.
    Cancelled,
    /// Declined by the assigned worker. Terminal.
    Rejected,
}

impl BookingStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Assigned,
        Self::Accepted,
        Self::InProgress,
        Self::Completed,
        Self::Cancelled,
        Self::Rejected,
    ];

    /// Terminal statuses accept no further actions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Whether a booking in this status must carry a worker.
    #[must_use]
    pub const fn requires_worker(self) -> bool {
        matches!(
            self,
            Self::Assigned | Self::Accepted | Self::InProgress | Self::Completed
        )
    }

    /// Whether a booking in this status counts against its worker's capacity.
    #[must_use]
    pub const fn occupies_worker(self) -> bool {
        matches!(self, Self::Assigned | Self::Accepted | Self::InProgress)
    }

    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "booking status",
                value: s.to_string(),
            })
    }
}

/// Role of the party requesting a transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// The booking's customer.
    Customer,
    /// A gig worker.
    Worker,
    /// Marketplace operator.
    Admin,
}

impl ActorRole {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Worker => "worker",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated party requesting a transition.
///
/// Authentication happens outside this crate; the caller vouches for the id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// A customer, identified.
    Customer(CustomerId),
    /// A worker, identified.
    Worker(WorkerId),
    /// An admin. Admin identity does not affect any transition rule.
    Admin,
}

impl Actor {
    /// The role this actor acts under.
    #[must_use]
    pub const fn role(&self) -> ActorRole {
        match self {
            Self::Customer(_) => ActorRole::Customer,
            Self::Worker(_) => ActorRole::Worker,
            Self::Admin => ActorRole::Admin,
        }
    }
}

/// Transition requested by an actor.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Admin assigns a worker to a pending booking.
    Assign,
    /// Admin moves an assigned booking to another worker.
    Reassign,
    /// Assigned worker accepts.
    Accept,
    /// Assigned worker declines.
    Reject,
    /// Assigned worker starts the job.
    Start,
    /// Job finished.
    Complete,
    /// Booking called off.
    Cancel,
}

impl Action {
    /// Every action.
    pub const ALL: [Self; 7] = [
        Self::Assign,
        Self::Reassign,
        Self::Accept,
        Self::Reject,
        Self::Start,
        Self::Complete,
        Self::Cancel,
    ];

    /// Wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Reassign => "reassign",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "action",
                value: s.to_string(),
            })
    }
}

/// Action-specific data accompanying a transition request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPayload {
    /// Worker to assign (required by `assign` and `reassign`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<WorkerId>,
    /// Free-text reason (used by `cancel` and `reject`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl TransitionPayload {
    /// Payload carrying only a worker id.
    #[must_use]
    pub fn worker(worker_id: impl Into<WorkerId>) -> Self {
        Self {
            worker_id: Some(worker_id.into()),
            reason: None,
        }
    }

    /// Payload carrying only a reason.
    #[must_use]
    pub fn reason(reason: impl Into<String>) -> Self {
        Self {
            worker_id: None,
            reason: Some(reason.into()),
        }
    }
}

// ============================================================================
// Intents
// ============================================================================

/// Who a notification goes to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    /// A customer.
    Customer(CustomerId),
    /// A worker.
    Worker(WorkerId),
    /// The admin desk.
    Admin,
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer(id) => write!(f, "customer:{id}"),
            Self::Worker(id) => write!(f, "worker:{id}"),
            Self::Admin => f.write_str("admin"),
        }
    }
}

/// What a notification is about.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A booking was assigned to the recipient worker.
    BookingAssigned,
    /// The recipient worker was taken off a booking.
    BookingUnassigned,
    /// The worker accepted the recipient's booking.
    BookingAccepted,
    /// The recipient's booking was completed.
    BookingCompleted,
    /// The booking was cancelled.
    BookingCancelled,
    /// The worker declined the recipient's booking.
    BookingRejected,
}

/// Side effect recorded by a transition, applied later by a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentKind {
    /// Deliver a notification.
    Notify {
        /// Target of the notification.
        recipient: Recipient,
        /// What happened.
        event: NotificationEvent,
        /// Optional reason supplied with cancel/reject.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Credit a worker's wallet with the booking price.
    CreditWallet {
        /// Worker to credit.
        worker_id: WorkerId,
        /// Amount to credit.
        amount: Money,
    },
    /// Credit loyalty coins to a customer.
    CreditCoins {
        /// Customer to credit.
        customer_id: CustomerId,
        /// Number of coins.
        coins: u64,
    },
}

impl IntentKind {
    /// Short name used for storage columns and metric labels.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Notify { .. } => "notify",
            Self::CreditWallet { .. } => "credit_wallet",
            Self::CreditCoins { .. } => "credit_coins",
        }
    }
}

/// One entry of a booking's intent log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Unique id; consumers deduplicate on it.
    pub id: IntentId,
    /// Booking whose transition emitted this intent.
    pub booking_id: BookingId,
    /// What to do.
    #[serde(flatten)]
    pub kind: IntentKind,
    /// Names of consumers that have processed this intent.
    #[serde(default)]
    pub applied_by: BTreeSet<String>,
    /// When the emitting transition was planned.
    pub created_at: DateTime<Utc>,
}

impl Intent {
    /// Whether `consumer` has already processed this intent.
    #[must_use]
    pub fn is_applied_by(&self, consumer: &str) -> bool {
        self.applied_by.contains(consumer)
    }
}

// ============================================================================
// Booking
// ============================================================================

/// A booking record as persisted by the booking store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking id.
    pub id: BookingId,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Owner of the booking.
    pub customer_id: CustomerId,
    /// Assigned worker; set iff `status.requires_worker()`.
    pub worker_id: Option<WorkerId>,
    /// Service being booked.
    pub service_id: ServiceId,
    /// Price in minor units.
    pub price: Money,
    /// When the job is scheduled.
    pub scheduled_at: DateTime<Utc>,
    /// Optimistic concurrency version.
    pub version: Version,
    /// Append-only side-effect log.
    #[serde(default)]
    pub intent_log: Vec<Intent>,
}

impl Booking {
    /// A new pending booking at version 0 with an empty log.
    #[must_use]
    pub fn new_pending(
        id: BookingId,
        customer_id: CustomerId,
        service_id: ServiceId,
        price: Money,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: BookingStatus::Pending,
            customer_id,
            worker_id: None,
            service_id,
            price,
            scheduled_at,
            version: Version::INITIAL,
            intent_log: Vec::new(),
        }
    }

    /// Check the worker/status invariant.
    #[must_use]
    pub const fn worker_invariant_holds(&self) -> bool {
        self.status.requires_worker() == self.worker_id.is_some()
    }

    /// Intents the named consumer has not processed yet, in log order.
    pub fn unapplied_by<'a>(&'a self, consumer: &'a str) -> impl Iterator<Item = &'a Intent> + 'a {
        self.intent_log
            .iter()
            .filter(move |intent| !intent.is_applied_by(consumer))
    }
}
