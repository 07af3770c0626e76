//! Tests for the in-memory collaborators.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use booking_core::ledger::{LedgerStore, RecordOutcome, WalletEntry};
use booking_core::notification::{Notification, NotificationSender, NotifyError};
use booking_core::store::{BookingStore, IntentLog};
use booking_core::worker::WorkerDirectory;
use booking_core::{
    BookingId, BookingStatus, Intent, IntentId, IntentKind, Money, NotificationEvent, Recipient,
    ServiceId, StoreError, Version, WorkerId,
};
use booking_testing::{
    BookingBuilder, InMemoryBookingStore, InMemoryLedgerStore, InMemoryWorkerDirectory,
    RecordingNotificationSender, test_clock, worker,
};
use booking_core::environment::Clock;
use std::collections::BTreeSet;

fn notify_intent(booking: &str, version: u64, index: usize) -> Intent {
    let booking_id = BookingId::new(booking);
    Intent {
        id: IntentId::for_transition(&booking_id, Version::new(version), index),
        booking_id,
        kind: IntentKind::Notify {
            recipient: Recipient::Admin,
            event: NotificationEvent::BookingCancelled,
            reason: None,
        },
        applied_by: BTreeSet::new(),
        created_at: test_clock().now(),
    }
}

#[tokio::test]
async fn swap_bumps_version_and_rejects_stale_writers() {
    let store = InMemoryBookingStore::with_bookings([BookingBuilder::new("bk-1").build()]);
    let read = store.get(BookingId::new("bk-1")).await.unwrap();

    let mut next = read.clone();
    next.status = BookingStatus::Cancelled;
    let stored = store
        .compare_and_swap(read.id.clone(), read.version, next.clone())
        .await
        .unwrap();
    assert_eq!(stored.version, Version::new(1));

    let stale = store.compare_and_swap(read.id.clone(), read.version, next).await;
    assert_eq!(
        stale,
        Err(StoreError::VersionConflict {
            booking_id: read.id.clone(),
            expected: Version::new(0),
            actual: Version::new(1),
        })
    );
    assert_eq!(store.swap_count(), 1);
}

#[tokio::test]
async fn swap_refuses_to_rewrite_the_log() {
    let mut booking = BookingBuilder::new("bk-1").build();
    booking.intent_log.push(notify_intent("bk-1", 1, 0));
    let store = InMemoryBookingStore::with_bookings([booking.clone()]);

    let mut next = booking.clone();
    next.intent_log.clear();
    let result = store.compare_and_swap(booking.id.clone(), booking.version, next).await;
    assert!(matches!(result, Err(StoreError::InvalidUpdate(_))));
}

#[tokio::test]
async fn create_rejects_duplicates() {
    let store = InMemoryBookingStore::new();
    let booking = BookingBuilder::new("bk-1").build();
    store.create(booking.clone()).await.unwrap();
    assert_eq!(
        store.create(booking).await,
        Err(StoreError::AlreadyExists(BookingId::new("bk-1")))
    );
}

#[tokio::test]
async fn intent_log_respects_limit_and_marks() {
    let mut first = BookingBuilder::new("bk-a").build();
    first.intent_log = vec![notify_intent("bk-a", 1, 0), notify_intent("bk-a", 1, 1)];
    let mut second = BookingBuilder::new("bk-b").build();
    second.intent_log = vec![notify_intent("bk-b", 1, 0)];
    let store = InMemoryBookingStore::with_bookings([first, second]);

    let pending = store.unapplied("ledger", None, 2).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].intents.len(), 2);

    store
        .mark_applied(BookingId::new("bk-a"), pending[0].intents[0].id.clone(), "ledger")
        .await
        .unwrap();

    let pending = store.unapplied("ledger", None, 10).await.unwrap();
    let counts: Vec<_> = pending.iter().map(|p| (p.booking_id.as_str().to_string(), p.intents.len())).collect();
    assert_eq!(counts, vec![("bk-a".to_string(), 1), ("bk-b".to_string(), 1)]);

    // Another consumer still sees everything, and versions are untouched.
    assert_eq!(store.unapplied("notifier", None, 10).await.unwrap().len(), 2);
    assert_eq!(store.snapshot(&BookingId::new("bk-a")).unwrap().version, Version::new(0));
}

#[tokio::test]
async fn intent_log_resumes_after_a_booking() {
    let bookings = ["bk-a", "bk-b", "bk-c"].map(|id| {
        let mut booking = BookingBuilder::new(id).build();
        booking.intent_log = vec![notify_intent(id, 1, 0)];
        booking
    });
    let store = InMemoryBookingStore::with_bookings(bookings);

    let after_a = store.unapplied("notifier", Some(BookingId::new("bk-a")), 10).await.unwrap();
    let ids: Vec<_> = after_a.iter().map(|p| p.booking_id.as_str()).collect();
    assert_eq!(ids, ["bk-b", "bk-c"]);

    // The cursor need not name a stored booking.
    let after_bb = store.unapplied("notifier", Some(BookingId::new("bk-bb")), 10).await.unwrap();
    assert_eq!(after_bb.len(), 1);
    assert_eq!(after_bb[0].booking_id, BookingId::new("bk-c"));

    assert!(store.unapplied("notifier", Some(BookingId::new("bk-c")), 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn injected_faults_surface_as_store_errors() {
    let store = InMemoryBookingStore::with_bookings([BookingBuilder::new("bk-1").build()]);
    store.set_unavailable(true);
    assert!(matches!(
        store.get(BookingId::new("bk-1")).await,
        Err(StoreError::Unavailable(_))
    ));
    store.set_unavailable(false);

    store.force_conflicts(1);
    let booking = store.get(BookingId::new("bk-1")).await.unwrap();
    let conflicted = store
        .compare_and_swap(booking.id.clone(), booking.version, booking.clone())
        .await;
    assert!(matches!(conflicted, Err(StoreError::VersionConflict { .. })));
    assert!(store
        .compare_and_swap(booking.id.clone(), booking.version, booking)
        .await
        .is_ok());
}

#[tokio::test]
async fn directory_filters_candidates_by_service() {
    let directory = InMemoryWorkerDirectory::new([
        worker("w-1", &["cleaning"]),
        worker("w-2", &["plumbing"]),
    ]);
    let candidates = directory.candidates(ServiceId::new("plumbing")).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].id, WorkerId::new("w-2"));
    assert!(directory.get(WorkerId::new("w-9")).await.unwrap().is_none());
}

#[tokio::test]
async fn ledger_ignores_repeated_source_intents() {
    let ledger = InMemoryLedgerStore::new();
    let entry = WalletEntry {
        id: uuid_like(),
        worker_id: WorkerId::new("w-1"),
        amount: Money::from_minor(500),
        reason: "test".into(),
        source_intent_id: IntentId::new("bk-1/v4/0"),
        created_at: test_clock().now(),
    };

    assert_eq!(ledger.record_wallet_entry(entry.clone()).await.unwrap(), RecordOutcome::Recorded);
    assert_eq!(ledger.record_wallet_entry(entry).await.unwrap(), RecordOutcome::Duplicate);
    assert_eq!(
        ledger.wallet_balance(WorkerId::new("w-1")).await.unwrap(),
        Money::from_minor(500)
    );
}

#[tokio::test]
async fn recording_sender_plays_script_then_succeeds() {
    let sender = RecordingNotificationSender::new();
    sender.fail_next(NotifyError::Transient("timeout".into()));
    let notification = Notification::from_intent(&notify_intent("bk-1", 1, 0)).unwrap();

    assert!(sender.send(notification.clone()).await.is_err());
    assert!(sender.send(notification).await.is_ok());
    assert_eq!(sender.attempts(), 2);
    assert_eq!(sender.sent().len(), 1);
}

fn uuid_like() -> uuid::Uuid {
    uuid::Uuid::nil()
}
