//! Notification delivery abstraction.
//!
//! Delivery transports (push, socket, SMS) live outside this workspace; they
//! plug in by implementing [`NotificationSender`].

use crate::types::{BookingId, Intent, IntentId, IntentKind, NotificationEvent, Recipient};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by notification senders.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Worth retrying (timeouts, 5xx, throttling).
    #[error("Transient delivery failure: {0}")]
    Transient(String),

    /// Retrying will not help (unknown device, recipient opted out).
    #[error("Permanent delivery failure: {0}")]
    Permanent(String),
}

impl NotifyError {
    /// Whether a retry could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A notification ready to deliver.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Intent that requested it; transports may use it as a dedupe key.
    pub intent_id: IntentId,
    /// Booking concerned.
    pub booking_id: BookingId,
    /// Who to notify.
    pub recipient: Recipient,
    /// What happened.
    pub event: NotificationEvent,
    /// Reason given for a cancellation or rejection.
    pub reason: Option<String>,
}

impl Notification {
    /// Build the notification a `notify` intent asks for. `None` for other
    /// intent kinds.
    #[must_use]
    pub fn from_intent(intent: &Intent) -> Option<Self> {
        match &intent.kind {
            IntentKind::Notify {
                recipient,
                event,
                reason,
            } => Some(Self {
                intent_id: intent.id.clone(),
                booking_id: intent.booking_id.clone(),
                recipient: recipient.clone(),
                event: *event,
                reason: reason.clone(),
            }),
            IntentKind::CreditWallet { .. } | IntentKind::CreditCoins { .. } => None,
        }
    }
}

/// Delivers notifications over some transport.
pub trait NotificationSender: Send + Sync {
    /// Deliver one notification.
    ///
    /// # Errors
    ///
    /// [`NotifyError::Transient`] when a retry may succeed,
    /// [`NotifyError::Permanent`] otherwise.
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>>;
}
