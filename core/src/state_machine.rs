//! Booking state machine.
//!
//! ```text
//! pending     --assign(admin)-------------> assigned
//! pending     --cancel(customer|admin)----> cancelled
//! assigned    --accept(worker)------------> accepted
//! assigned    --reject(worker)------------> rejected
//! assigned    --reassign(admin)-----------> assigned
//! accepted    --start(worker)-------------> in_progress
//! accepted    --cancel(admin)-------------> cancelled
//! in_progress --complete(worker|admin)----> completed
//! in_progress --cancel(admin)-------------> cancelled
//! ```
//!
//! Terminal: `completed`, `cancelled`, `rejected`.
//!
//! Everything in this module is pure. [`plan_transition`] turns the booking
//! the engine read plus the request into the booking to write and the intents
//! to log; the engine then commits that with one compare-and-swap.

use crate::error::TransitionError;
use crate::types::{
    Action, Actor, ActorRole, Booking, BookingStatus, Intent, IntentId, IntentKind, Money,
    NotificationEvent, Recipient, TransitionPayload,
};
use crate::worker::Worker;
use chrono::{DateTime, Utc};
use smallvec::SmallVec;
use std::collections::BTreeSet;

/// Side effect an edge emits, resolved against the booking at plan time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IntentTemplate {
    /// Notify the worker the booking now belongs to.
    NotifyAssignedWorker,
    /// Notify the worker the booking was taken from.
    NotifyPreviousWorker,
    /// Notify the customer of `event`.
    NotifyCustomer(NotificationEvent),
    /// Notify whoever a cancellation affects besides the canceller.
    NotifyCancellation,
    /// Credit the assigned worker's wallet with the price.
    CreditWallet,
    /// Credit loyalty coins to the customer.
    CreditCoins,
}

/// One row of the transition table.
#[derive(Debug)]
pub struct Edge {
    /// Status the edge leaves.
    pub from: BookingStatus,
    /// Action that triggers it.
    pub action: Action,
    /// Status the edge enters.
    pub to: BookingStatus,
    /// Roles allowed to trigger it.
    pub roles: &'static [ActorRole],
    /// Intents emitted, in log order.
    pub intents: &'static [IntentTemplate],
}

impl Edge {
    /// Whether `role` may trigger this edge.
    #[must_use]
    pub fn permits(&self, role: ActorRole) -> bool {
        self.roles.contains(&role)
    }
}

/// The complete transition table.
pub const EDGES: &[Edge] = &[
    Edge {
        from: BookingStatus::Pending,
        action: Action::Assign,
        to: BookingStatus::Assigned,
        roles: &[ActorRole::Admin],
        intents: &[IntentTemplate::NotifyAssignedWorker],
    },
    Edge {
        from: BookingStatus::Pending,
        action: Action::Cancel,
        to: BookingStatus::Cancelled,
        roles: &[ActorRole::Customer, ActorRole::Admin],
        intents: &[IntentTemplate::NotifyCancellation],
    },
    Edge {
        from: BookingStatus::Assigned,
        action: Action::Accept,
        to: BookingStatus::Accepted,
        roles: &[ActorRole::Worker],
        intents: &[IntentTemplate::NotifyCustomer(NotificationEvent::BookingAccepted)],
    },
    Edge {
        from: BookingStatus::Assigned,
        action: Action::Reject,
        to: BookingStatus::Rejected,
        roles: &[ActorRole::Worker],
        intents: &[IntentTemplate::NotifyCustomer(NotificationEvent::BookingRejected)],
    },
    Edge {
        from: BookingStatus::Assigned,
        action: Action::Reassign,
        to: BookingStatus::Assigned,
        roles: &[ActorRole::Admin],
        intents: &[
            IntentTemplate::NotifyAssignedWorker,
            IntentTemplate::NotifyPreviousWorker,
        ],
    },
    Edge {
        from: BookingStatus::Accepted,
        action: Action::Start,
        to: BookingStatus::InProgress,
        roles: &[ActorRole::Worker],
        intents: &[],
    },
    Edge {
        from: BookingStatus::Accepted,
        action: Action::Cancel,
        to: BookingStatus::Cancelled,
        roles: &[ActorRole::Admin],
        intents: &[IntentTemplate::NotifyCancellation],
    },
    Edge {
        from: BookingStatus::InProgress,
        action: Action::Complete,
        to: BookingStatus::Completed,
        roles: &[ActorRole::Worker, ActorRole::Admin],
        intents: &[
            IntentTemplate::CreditWallet,
            IntentTemplate::CreditCoins,
            IntentTemplate::NotifyCustomer(NotificationEvent::BookingCompleted),
        ],
    },
    Edge {
        from: BookingStatus::InProgress,
        action: Action::Cancel,
        to: BookingStatus::Cancelled,
        roles: &[ActorRole::Admin],
        intents: &[IntentTemplate::NotifyCancellation],
    },
];

/// Look up the edge for `action` out of `from`.
#[must_use]
pub fn edge(from: BookingStatus, action: Action) -> Option<&'static Edge> {
    EDGES.iter().find(|e| e.from == from && e.action == action)
}

/// Actions with an edge out of `status`, regardless of role.
#[must_use]
pub fn available_actions(status: BookingStatus) -> Vec<Action> {
    EDGES
        .iter()
        .filter(|e| e.from == status)
        .map(|e| e.action)
        .collect()
}

/// Steps 2–3 of a transition: terminal check, then edge and role lookup.
///
/// # Errors
///
/// `TerminalState`, `InvalidTransition` or `Forbidden`.
pub fn validate_edge(
    booking: &Booking,
    action: Action,
    role: ActorRole,
) -> Result<&'static Edge, TransitionError> {
    if booking.status.is_terminal() {
        return Err(TransitionError::TerminalState {
            booking_id: booking.id.clone(),
            status: booking.status,
        });
    }

    let edge = edge(booking.status, action).ok_or(TransitionError::InvalidTransition {
        status: booking.status,
        action,
    })?;

    if !edge.permits(role) {
        return Err(TransitionError::Forbidden {
            action,
            role,
            reason: format!("only {} may {action} a {} booking", roles_list(edge.roles), booking.status),
        });
    }

    Ok(edge)
}

fn roles_list(roles: &[ActorRole]) -> String {
    roles
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join("|")
}

/// Minor currency units per loyalty coin credited on completion.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CoinRate(u64);

impl CoinRate {
    /// One coin per `minor_units` of price. Zero disables coin accrual.
    #[must_use]
    pub const fn per_minor_units(minor_units: u64) -> Self {
        Self(minor_units)
    }

    /// Coins earned for a booking of `price`.
    #[must_use]
    pub const fn coins_for(self, price: Money) -> u64 {
        match price.minor().checked_div(self.0) {
            Some(coins) => coins,
            None => 0,
        }
    }
}

impl Default for CoinRate {
    fn default() -> Self {
        Self(100)
    }
}

/// Everything [`plan_transition`] needs, gathered by the engine.
#[derive(Debug)]
pub struct TransitionInput<'a> {
    /// Booking as read from the store.
    pub booking: &'a Booking,
    /// Requesting party.
    pub actor: &'a Actor,
    /// Requested action.
    pub action: Action,
    /// Action payload.
    pub payload: &'a TransitionPayload,
    /// Record of `payload.worker_id`, when the action names a worker.
    pub worker: Option<&'a Worker>,
    /// Planning timestamp for emitted intents.
    pub now: DateTime<Utc>,
    /// Coin accrual rate.
    pub coin_rate: CoinRate,
}

/// Result of planning: what to write and what it emits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransitionPlan {
    /// Booking to hand to compare-and-swap. Its `version` is still the
    /// version that was read; the store bumps it on commit.
    pub next: Booking,
    /// Intents appended by this transition, in log order.
    pub emitted: SmallVec<[Intent; 4]>,
}

/// Whether `action` names a worker in its payload.
#[must_use]
pub const fn needs_worker_lookup(action: Action) -> bool {
    matches!(action, Action::Assign | Action::Reassign)
}

/// Validate a request against a booking and compute the resulting write.
///
/// # Errors
///
/// Any deterministic [`TransitionError`]: `TerminalState`,
/// `InvalidTransition`, `Forbidden`, `InvalidPayload`.
pub fn plan_transition(input: &TransitionInput<'_>) -> Result<TransitionPlan, TransitionError> {
    let booking = input.booking;
    let edge = validate_edge(booking, input.action, input.actor.role())?;

    check_identity(booking, input.actor, input.action)?;

    let previous_worker = booking.worker_id.clone();
    let worker_id = match input.action {
        Action::Assign | Action::Reassign => Some(check_assignee(input)?.id.clone()),
        _ if edge.to.requires_worker() => previous_worker.clone(),
        _ => None,
    };

    let mut next = booking.clone();
    next.status = edge.to;
    next.worker_id = worker_id;

    let reason = input.payload.reason.clone();
    let kinds = edge
        .intents
        .iter()
        .flat_map(|template| {
            resolve(*template, booking, &next, previous_worker.as_ref(), input, reason.as_ref())
        })
        .collect::<Vec<_>>();

    let committed = booking.version.next()?;
    let emitted: SmallVec<[Intent; 4]> = kinds
        .into_iter()
        .enumerate()
        .map(|(index, kind)| Intent {
            id: IntentId::for_transition(&booking.id, committed, index),
            booking_id: booking.id.clone(),
            kind,
            applied_by: BTreeSet::new(),
            created_at: input.now,
        })
        .collect();

    next.intent_log.extend(emitted.iter().cloned());

    Ok(TransitionPlan { next, emitted })
}

/// Per-identity rules the edge table cannot express.
fn check_identity(booking: &Booking, actor: &Actor, action: Action) -> Result<(), TransitionError> {
    match actor {
        Actor::Worker(worker_id) if booking.worker_id.as_ref() != Some(worker_id) => {
            Err(TransitionError::Forbidden {
                action,
                role: ActorRole::Worker,
                reason: format!("worker {worker_id} is not assigned to booking {}", booking.id),
            })
        },
        Actor::Customer(customer_id) if *customer_id != booking.customer_id => {
            Err(TransitionError::Forbidden {
                action,
                role: ActorRole::Customer,
                reason: format!("customer {customer_id} does not own booking {}", booking.id),
            })
        },
        _ => Ok(()),
    }
}

/// Validate the worker named by an assign/reassign payload.
fn check_assignee<'a>(input: &TransitionInput<'a>) -> Result<&'a Worker, TransitionError> {
    let requested = input
        .payload
        .worker_id
        .as_ref()
        .ok_or_else(|| TransitionError::InvalidPayload(format!("{} requires a workerId", input.action)))?;

    let worker = input
        .worker
        .filter(|w| &w.id == requested)
        .ok_or_else(|| TransitionError::InvalidPayload(format!("unknown worker {requested}")))?;

    if input.action == Action::Reassign && input.booking.worker_id.as_ref() == Some(requested) {
        return Err(TransitionError::InvalidPayload(format!(
            "booking {} is already assigned to {requested}",
            input.booking.id
        )));
    }

    if !worker.can_serve(&input.booking.service_id) {
        return Err(TransitionError::InvalidPayload(format!(
            "worker {requested} does not offer service {}",
            input.booking.service_id
        )));
    }

    if !worker.is_available() {
        return Err(TransitionError::InvalidPayload(format!(
            "worker {requested} is not available"
        )));
    }

    Ok(worker)
}

fn resolve(
    template: IntentTemplate,
    before: &Booking,
    after: &Booking,
    previous_worker: Option<&crate::types::WorkerId>,
    input: &TransitionInput<'_>,
    reason: Option<&String>,
) -> SmallVec<[IntentKind; 2]> {
    let notify = |recipient: Recipient, event: NotificationEvent| IntentKind::Notify {
        recipient,
        event,
        reason: reason.cloned(),
    };

    let mut kinds = SmallVec::new();
    match template {
        IntentTemplate::NotifyAssignedWorker => {
            if let Some(worker_id) = &after.worker_id {
                kinds.push(notify(
                    Recipient::Worker(worker_id.clone()),
                    NotificationEvent::BookingAssigned,
                ));
            }
        },
        IntentTemplate::NotifyPreviousWorker => {
            if let Some(worker_id) = previous_worker.filter(|w| after.worker_id.as_ref() != Some(*w)) {
                kinds.push(notify(
                    Recipient::Worker(worker_id.clone()),
                    NotificationEvent::BookingUnassigned,
                ));
            }
        },
        IntentTemplate::NotifyCustomer(event) => {
            kinds.push(notify(Recipient::Customer(before.customer_id.clone()), event));
        },
        IntentTemplate::NotifyCancellation => {
            let first = match input.actor {
                Actor::Customer(_) => Recipient::Admin,
                _ => Recipient::Customer(before.customer_id.clone()),
            };
            kinds.push(notify(first, NotificationEvent::BookingCancelled));
            if let Some(worker_id) = previous_worker {
                kinds.push(notify(
                    Recipient::Worker(worker_id.clone()),
                    NotificationEvent::BookingCancelled,
                ));
            }
        },
        IntentTemplate::CreditWallet => {
            if let Some(worker_id) = &after.worker_id {
                kinds.push(IntentKind::CreditWallet {
                    worker_id: worker_id.clone(),
                    amount: before.price,
                });
            }
        },
        IntentTemplate::CreditCoins => {
            kinds.push(IntentKind::CreditCoins {
                customer_id: before.customer_id.clone(),
                coins: input.coin_rate.coins_for(before.price),
            });
        },
    }
    kinds
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BookingId, CustomerId, ServiceId, Version, WorkerId};

    fn booking(status: BookingStatus, worker: Option<&str>) -> Booking {
        let mut b = Booking::new_pending(
            BookingId::new("bk-1"),
            CustomerId::new("c-1"),
            ServiceId::new("plumbing"),
            Money::from_minor(500),
            DateTime::<Utc>::UNIX_EPOCH,
        );
        b.status = status;
        b.worker_id = worker.map(WorkerId::new);
        b.version = Version::new(4);
        b
    }

    fn plumber(id: &str) -> Worker {
        Worker {
            id: WorkerId::new(id),
            services: BTreeSet::from([ServiceId::new("plumbing")]),
            active: true,
            capacity: 3,
            open_bookings: 0,
        }
    }

    fn plan(
        booking: &Booking,
        actor: &Actor,
        action: Action,
        payload: &TransitionPayload,
        worker: Option<&Worker>,
    ) -> Result<TransitionPlan, TransitionError> {
        plan_transition(&TransitionInput {
            booking,
            actor,
            action,
            payload,
            worker,
            now: DateTime::<Utc>::UNIX_EPOCH,
            coin_rate: CoinRate::default(),
        })
    }

    #[test]
    fn no_edge_leaves_a_terminal_status() {
        for edge in EDGES {
            assert!(!edge.from.is_terminal(), "edge out of terminal {:?}", edge.from);
            assert!(!edge.roles.is_empty());
        }
    }

    #[test]
    fn table_has_one_edge_per_status_action() {
        for (i, a) in EDGES.iter().enumerate() {
            for b in &EDGES[i + 1..] {
                assert!(!(a.from == b.from && a.action == b.action));
            }
        }
    }

    #[test]
    fn admin_assign_sets_worker_and_notifies_it() {
        let b = booking(BookingStatus::Pending, None);
        let w = plumber("w-1");
        let result = plan(&b, &Actor::Admin, Action::Assign, &TransitionPayload::worker("w-1"), Some(&w)).unwrap();

        assert_eq!(result.next.status, BookingStatus::Assigned);
        assert_eq!(result.next.worker_id, Some(WorkerId::new("w-1")));
        assert_eq!(result.next.version, Version::new(4));
        assert_eq!(result.emitted.len(), 1);
        assert_eq!(result.emitted[0].id.as_str(), "bk-1/v5/0");
        assert!(matches!(
            &result.emitted[0].kind,
            IntentKind::Notify { recipient: Recipient::Worker(w), event: NotificationEvent::BookingAssigned, .. } if w.as_str() == "w-1"
        ));
        assert_eq!(result.next.intent_log, result.emitted.to_vec());
    }

    #[test]
    fn assign_requires_capable_available_worker() {
        let b = booking(BookingStatus::Pending, None);

        let missing = plan(&b, &Actor::Admin, Action::Assign, &TransitionPayload::default(), None);
        assert!(matches!(missing, Err(TransitionError::InvalidPayload(_))));

        let unknown = plan(&b, &Actor::Admin, Action::Assign, &TransitionPayload::worker("w-9"), None);
        assert!(matches!(unknown, Err(TransitionError::InvalidPayload(_))));

        let mut painter = plumber("w-2");
        painter.services = BTreeSet::from([ServiceId::new("painting")]);
        let incapable = plan(&b, &Actor::Admin, Action::Assign, &TransitionPayload::worker("w-2"), Some(&painter));
        assert!(matches!(incapable, Err(TransitionError::InvalidPayload(_))));

        let mut busy = plumber("w-3");
        busy.open_bookings = busy.capacity;
        let full = plan(&b, &Actor::Admin, Action::Assign, &TransitionPayload::worker("w-3"), Some(&busy));
        assert!(matches!(full, Err(TransitionError::InvalidPayload(_))));
    }

    #[test]
    fn accept_by_other_worker_is_forbidden() {
        let b = booking(BookingStatus::Assigned, Some("w-1"));
        let result = plan(
            &b,
            &Actor::Worker(WorkerId::new("w-2")),
            Action::Accept,
            &TransitionPayload::default(),
            None,
        );
        assert!(matches!(result, Err(TransitionError::Forbidden { .. })));
    }

    #[test]
    fn wrong_role_is_forbidden_missing_edge_is_invalid() {
        let b = booking(BookingStatus::Accepted, Some("w-1"));

        let customer_cancel = plan(
            &b,
            &Actor::Customer(CustomerId::new("c-1")),
            Action::Cancel,
            &TransitionPayload::default(),
            None,
        );
        assert!(matches!(customer_cancel, Err(TransitionError::Forbidden { .. })));

        let complete_early = plan(
            &b,
            &Actor::Worker(WorkerId::new("w-1")),
            Action::Complete,
            &TransitionPayload::default(),
            None,
        );
        assert!(matches!(
            complete_early,
            Err(TransitionError::InvalidTransition { status: BookingStatus::Accepted, action: Action::Complete })
        ));
    }

    #[test]
    fn complete_credits_wallet_and_coins() {
        let b = booking(BookingStatus::InProgress, Some("w-1"));
        let result = plan(
            &b,
            &Actor::Worker(WorkerId::new("w-1")),
            Action::Complete,
            &TransitionPayload::default(),
            None,
        )
        .unwrap();

        assert_eq!(result.next.status, BookingStatus::Completed);
        assert_eq!(result.next.worker_id, Some(WorkerId::new("w-1")));
        let kinds: Vec<_> = result.emitted.iter().map(|i| i.kind.clone()).collect();
        assert_eq!(
            kinds[0],
            IntentKind::CreditWallet { worker_id: WorkerId::new("w-1"), amount: Money::from_minor(500) }
        );
        assert_eq!(
            kinds[1],
            IntentKind::CreditCoins { customer_id: CustomerId::new("c-1"), coins: 5 }
        );
        assert!(matches!(kinds[2], IntentKind::Notify { event: NotificationEvent::BookingCompleted, .. }));
    }

    #[test]
    fn admin_cancel_clears_worker_and_notifies_both_parties() {
        let b = booking(BookingStatus::InProgress, Some("w-1"));
        let result = plan(&b, &Actor::Admin, Action::Cancel, &TransitionPayload::reason("no show"), None).unwrap();

        assert_eq!(result.next.status, BookingStatus::Cancelled);
        assert_eq!(result.next.worker_id, None);
        let recipients: Vec<_> = result
            .emitted
            .iter()
            .filter_map(|i| match &i.kind {
                IntentKind::Notify { recipient, reason, .. } => {
                    assert_eq!(reason.as_deref(), Some("no show"));
                    Some(recipient.clone())
                },
                _ => None,
            })
            .collect();
        assert_eq!(
            recipients,
            vec![Recipient::Customer(CustomerId::new("c-1")), Recipient::Worker(WorkerId::new("w-1"))]
        );
    }

    #[test]
    fn customer_may_only_cancel_own_booking() {
        let b = booking(BookingStatus::Pending, None);
        let stranger = plan(
            &b,
            &Actor::Customer(CustomerId::new("c-2")),
            Action::Cancel,
            &TransitionPayload::default(),
            None,
        );
        assert!(matches!(stranger, Err(TransitionError::Forbidden { .. })));

        let owner = plan(
            &b,
            &Actor::Customer(CustomerId::new("c-1")),
            Action::Cancel,
            &TransitionPayload::default(),
            None,
        )
        .unwrap();
        assert!(matches!(
            &owner.emitted[0].kind,
            IntentKind::Notify { recipient: Recipient::Admin, .. }
        ));
    }

    #[test]
    fn reassign_to_same_worker_is_rejected() {
        let b = booking(BookingStatus::Assigned, Some("w-1"));
        let w = plumber("w-1");
        let result = plan(&b, &Actor::Admin, Action::Reassign, &TransitionPayload::worker("w-1"), Some(&w));
        assert!(matches!(result, Err(TransitionError::InvalidPayload(_))));
    }

    #[test]
    fn reassign_notifies_new_and_previous_worker() {
        let b = booking(BookingStatus::Assigned, Some("w-1"));
        let w = plumber("w-2");
        let result = plan(&b, &Actor::Admin, Action::Reassign, &TransitionPayload::worker("w-2"), Some(&w)).unwrap();

        assert_eq!(result.next.status, BookingStatus::Assigned);
        assert_eq!(result.next.worker_id, Some(WorkerId::new("w-2")));
        assert_eq!(result.emitted.len(), 2);
        assert!(matches!(
            &result.emitted[1].kind,
            IntentKind::Notify { recipient: Recipient::Worker(w), event: NotificationEvent::BookingUnassigned, .. } if w.as_str() == "w-1"
        ));
    }

    #[test]
    fn terminal_bookings_refuse_everything() {
        for status in [BookingStatus::Completed, BookingStatus::Cancelled, BookingStatus::Rejected] {
            let b = booking(status, status.requires_worker().then_some("w-1"));
            for action in Action::ALL {
                let result = plan(&b, &Actor::Admin, action, &TransitionPayload::default(), None);
                assert!(matches!(result, Err(TransitionError::TerminalState { .. })));
            }
        }
    }

    #[test]
    fn coin_rate_handles_zero() {
        assert_eq!(CoinRate::per_minor_units(0).coins_for(Money::from_minor(900)), 0);
        assert_eq!(CoinRate::per_minor_units(100).coins_for(Money::from_minor(950)), 9);
    }
}
