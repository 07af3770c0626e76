//! Delivers `notify` intents through a [`NotificationSender`].
//!
//! Delivery is best-effort: transient failures are retried with backoff,
//! permanent ones are logged and the intent is dropped. Either way the
//! booking itself is never touched.

use crate::drain::{ApplyOutcome, ConsumeFuture, ConsumerError, IntentConsumer};
use crate::retry::{RetryPolicy, retry_with_predicate};
use booking_core::notification::{Notification, NotificationSender, NotifyError};
use booking_core::{Intent, IntentId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Name the notifier records in `applied_by`.
pub const NOTIFIER_CONSUMER: &str = "notifier";

const DELIVERED_CAPACITY: usize = 10_000;

/// Recently delivered intent ids.
///
/// Covers the window where a notification went out but marking the intent
/// failed; the durable dedupe key is the `applied_by` entry itself.
#[derive(Debug, Default)]
struct Delivered {
    order: VecDeque<IntentId>,
    ids: HashSet<IntentId>,
}

impl Delivered {
    fn contains(&self, id: &IntentId) -> bool {
        self.ids.contains(id)
    }

    fn insert(&mut self, id: IntentId) {
        if !self.ids.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        let overflow = self.order.len().saturating_sub(DELIVERED_CAPACITY);
        for oldest in self.order.drain(..overflow) {
            self.ids.remove(&oldest);
        }
    }
}

/// Notification consumer.
pub struct Notifier {
    sender: Arc<dyn NotificationSender>,
    policy: RetryPolicy,
    delivered: Mutex<Delivered>,
}

impl Notifier {
    /// Create a notifier retrying transient failures per `policy`.
    #[must_use]
    pub fn new(sender: Arc<dyn NotificationSender>, policy: RetryPolicy) -> Self {
        Self {
            sender,
            policy,
            delivered: Mutex::new(Delivered::default()),
        }
    }

    /// Deliver the notification an intent describes.
    ///
    /// # Errors
    ///
    /// A transient [`NotifyError`] once retries are spent; the intent stays
    /// pending and is offered again on a later round. Permanent failures are
    /// not errors: they yield [`ApplyOutcome::Dropped`].
    pub async fn apply_intent(&self, intent: &Intent) -> Result<ApplyOutcome, NotifyError> {
        let Some(notification) = Notification::from_intent(intent) else {
            return Ok(ApplyOutcome::Skipped);
        };

        if self.delivered.lock().await.contains(&intent.id) {
            return Ok(ApplyOutcome::Duplicate);
        }

        let sent = retry_with_predicate(
            self.policy.clone(),
            || self.sender.send(notification.clone()),
            NotifyError::is_transient,
        )
        .await;

        match sent {
            Ok(()) => {
                self.delivered.lock().await.insert(intent.id.clone());
                tracing::info!(
                    intent_id = %intent.id,
                    recipient = %notification.recipient,
                    "Notification delivered"
                );
                Ok(ApplyOutcome::Applied)
            },
            Err(NotifyError::Permanent(reason)) => {
                tracing::warn!(
                    intent_id = %intent.id,
                    recipient = %notification.recipient,
                    %reason,
                    "Notification dropped"
                );
                Ok(ApplyOutcome::Dropped)
            },
            Err(err) => Err(err),
        }
    }
}

impl IntentConsumer for Notifier {
    fn name(&self) -> &'static str {
        NOTIFIER_CONSUMER
    }

    fn consume<'a>(&'a self, intent: &'a Intent) -> ConsumeFuture<'a> {
        Box::pin(async move { self.apply_intent(intent).await.map_err(ConsumerError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivered_set_evicts_oldest() {
        let mut delivered = Delivered::default();
        for i in 0..=DELIVERED_CAPACITY {
            delivered.insert(IntentId::new(format!("bk/v1/{i}")));
        }
        assert!(!delivered.contains(&IntentId::new("bk/v1/0")));
        assert!(delivered.contains(&IntentId::new("bk/v1/1")));
        assert_eq!(delivered.order.len(), DELIVERED_CAPACITY);
    }

    #[test]
    fn reinserting_does_not_grow() {
        let mut delivered = Delivered::default();
        delivered.insert(IntentId::new("a"));
        delivered.insert(IntentId::new("a"));
        assert_eq!(delivered.order.len(), 1);
    }
}
