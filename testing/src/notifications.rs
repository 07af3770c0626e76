//! Notification sender that records instead of delivering.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)]

use booking_core::notification::{Notification, NotificationSender, NotifyError};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Records every delivered notification.
///
/// Failures can be scripted with [`Self::fail_next`]: each queued error is
/// returned by one `send` call, in order, before sends succeed again.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotificationSender {
    sent: Arc<Mutex<Vec<Notification>>>,
    script: Arc<Mutex<VecDeque<NotifyError>>>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingNotificationSender {
    /// Create a sender that succeeds until told otherwise.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for an upcoming `send`.
    pub fn fail_next(&self, error: NotifyError) {
        self.script.lock().unwrap().push_back(error);
    }

    /// Notifications delivered so far.
    #[must_use]
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    /// `send` calls so far, failed ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl NotificationSender for RecordingNotificationSender {
    fn send(
        &self,
        notification: Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + '_>> {
        Box::pin(async move {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(error) = self.script.lock().unwrap().pop_front() {
                return Err(error);
            }
            self.sent.lock().unwrap().push(notification);
            Ok(())
        })
    }
}
