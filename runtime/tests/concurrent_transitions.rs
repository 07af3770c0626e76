//! Many requests against one booking, concurrently and in random order.
//!
//! Whatever interleaving happens, every committed transition must own a
//! distinct version, and replaying the committed transitions in version
//! order must walk a valid path through the edge table.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use booking_core::state_machine::EDGES;
use booking_core::{BookingId, BookingStatus, TransitionError, Version};
use booking_runtime::{EngineConfig, TransitionEngine, TransitionRequest, TransitionResult};
use booking_testing::properties::{WORKERS, arb_requests};
use booking_testing::{
    BookingBuilder, InMemoryBookingStore, InMemoryWorkerDirectory, assert_invariants, test_clock,
    worker,
};
use proptest::prelude::*;
use proptest::strategy::ValueTree;
use std::collections::BTreeSet;
use std::sync::Arc;

fn engine_with_store() -> (Arc<TransitionEngine>, InMemoryBookingStore) {
    let store = InMemoryBookingStore::with_bookings([BookingBuilder::new("bk-1").build()]);
    let directory = InMemoryWorkerDirectory::new(WORKERS.iter().map(|id| worker(id, &["cleaning"])));
    let engine = TransitionEngine::new(
        Arc::new(store.clone()),
        Arc::new(directory),
        Arc::new(test_clock()),
        EngineConfig::default(),
    );
    (Arc::new(engine), store)
}

fn assert_valid_history(mut committed: Vec<TransitionResult>, final_version: Version) {
    committed.sort_by_key(|r| r.version);

    let versions: BTreeSet<_> = committed.iter().map(|r| r.version).collect();
    assert_eq!(versions.len(), committed.len(), "two commits share a version");
    assert_eq!(final_version, Version::new(committed.len() as u64));

    let mut status = BookingStatus::Pending;
    for (n, result) in committed.iter().enumerate() {
        assert_eq!(result.version, Version::new(n as u64 + 1), "version gap");
        assert!(
            EDGES.iter().any(|e| e.from == status && e.to == result.status),
            "no edge {status} -> {}",
            result.status
        );
        status = result.status;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_commit_a_single_valid_path() {
    let (engine, store) = engine_with_store();
    let mut runner = proptest::test_runner::TestRunner::deterministic();
    let requests = arb_requests(40).new_tree(&mut runner).unwrap().current();

    let handles: Vec<_> = requests
        .into_iter()
        .map(|(actor, action, payload)| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .request_transition(
                        TransitionRequest::new(BookingId::new("bk-1"), actor, action).with_payload(payload),
                    )
                    .await
            })
        })
        .collect();

    let mut committed = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(result) => committed.push(result),
            Err(err) => assert!(
                !matches!(err, TransitionError::Internal(_) | TransitionError::DependencyUnavailable(_)),
                "unexpected {err}"
            ),
        }
    }

    let stored = store.snapshot(&BookingId::new("bk-1")).unwrap();
    assert_invariants(&stored);
    assert_valid_history(committed, stored.version);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn sequential_requests_keep_invariants(requests in arb_requests(30)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let (engine, store) = engine_with_store();
            let mut committed = Vec::new();

            for (actor, action, payload) in requests {
                let before = store.snapshot(&BookingId::new("bk-1")).unwrap();
                let result = engine
                    .request_transition(
                        TransitionRequest::new(BookingId::new("bk-1"), actor, action).with_payload(payload),
                    )
                    .await;
                let after = store.snapshot(&BookingId::new("bk-1")).unwrap();

                match result {
                    Ok(result) => committed.push(result),
                    Err(err) => {
                        assert_eq!(before, after, "refused request {err} changed the booking");
                        if before.status.is_terminal() {
                            assert!(matches!(err, TransitionError::TerminalState { .. }));
                        }
                    },
                }
                assert_invariants(&after);
            }

            let stored = store.snapshot(&BookingId::new("bk-1")).unwrap();
            assert_valid_history(committed, stored.version);
        });
    }
}
