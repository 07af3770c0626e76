//! Notification transport used when no push provider is configured.

use booking_core::notification::{Notification, NotificationSender, NotifyError};
use std::future::Future;
use std::pin::Pin;

/// Delivers notifications by logging them.
///
/// Never fails, so every `notify` intent is marked applied on its first
/// attempt. Swap in a real transport by implementing [`NotificationSender`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotificationSender;

impl NotificationSender for LogNotificationSender {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                intent_id = %notification.intent_id,
                booking_id = %notification.booking_id,
                recipient = %notification.recipient,
                event = ?notification.event,
                reason = notification.reason.as_deref(),
                "Notification delivered"
            );
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use booking_core::{BookingId, IntentId, NotificationEvent, Recipient};

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let notification = Notification {
            intent_id: IntentId::new("bk-1/v1/0"),
            booking_id: BookingId::new("bk-1"),
            recipient: Recipient::Admin,
            event: NotificationEvent::BookingCancelled,
            reason: Some("duplicate".into()),
        };

        assert_eq!(LogNotificationSender.send(notification).await, Ok(()));
    }
}
