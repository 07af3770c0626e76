//! HTTP status and body mapping, end to end through the router.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use axum::http::{HeaderValue, StatusCode};
use axum_test::TestServer;
use booking_core::Booking;
use booking_runtime::{EngineConfig, TransitionEngine, metrics::detached_handle};
use booking_testing::{
    BookingBuilder, InMemoryBookingStore, InMemoryWorkerDirectory, test_clock, worker,
};
use booking_web::{AppState, CORRELATION_ID_HEADER, router};
use serde_json::{Value, json};
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

fn server_with(bookings: impl IntoIterator<Item = Booking>) -> (TestServer, InMemoryBookingStore) {
    let store = InMemoryBookingStore::with_bookings(bookings);
    let directory = InMemoryWorkerDirectory::new([
        worker("w-1", &["cleaning"]),
        worker("w-2", &["cleaning"]),
    ]);
    let engine = TransitionEngine::new(
        Arc::new(store.clone()),
        Arc::new(directory),
        Arc::new(test_clock()),
        EngineConfig::default(),
    );
    let state = AppState::new(
        Arc::new(engine),
        Arc::new(store.clone()),
        Arc::new(test_clock()),
        detached_handle().unwrap(),
    );
    (TestServer::new(router(state)).unwrap(), store)
}

fn assign(worker_id: &str) -> Value {
    json!({"action": "assign", "actorRole": "admin", "payload": {"workerId": worker_id}})
}

// ============================================================================
// Transitions
// ============================================================================

#[tokio::test]
async fn assign_returns_new_state_and_intents() {
    let (server, _) = server_with([BookingBuilder::new("bk-1").build()]);

    let response = server.post("/bookings/bk-1/transition").json(&assign("w-1")).await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["version"], 1);
    assert_eq!(body["workerId"], "w-1");
    assert_eq!(body["intents"].as_array().unwrap().len(), 1);
    assert_eq!(body["intents"][0]["kind"], "notify");
}

#[tokio::test]
async fn errors_carry_status_and_code() {
    let (server, _) = server_with([
        BookingBuilder::new("bk-assigned").assigned("w-1").build(),
        BookingBuilder::new("bk-done").completed("w-1").build(),
        BookingBuilder::new("bk-pending").build(),
    ]);

    let cases = [
        (
            "/bookings/bk-assigned/transition",
            json!({"action": "accept", "actorRole": "worker", "actorId": "w-2"}),
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
        ),
        (
            "/bookings/bk-done/transition",
            json!({"action": "cancel", "actorRole": "admin"}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "TERMINAL_STATE",
        ),
        (
            "/bookings/bk-pending/transition",
            json!({"action": "start", "actorRole": "worker", "actorId": "w-1"}),
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_TRANSITION",
        ),
        (
            "/bookings/bk-pending/transition",
            assign("w-9"),
            StatusCode::UNPROCESSABLE_ENTITY,
            "INVALID_PAYLOAD",
        ),
        (
            "/bookings/bk-missing/transition",
            assign("w-1"),
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
        ),
        (
            "/bookings/bk-pending/transition",
            json!({"action": "assign", "actorRole": "admin", "payload": {"workerId": "w-1"}, "expectedVersion": 3}),
            StatusCode::CONFLICT,
            "VERSION_CONFLICT",
        ),
    ];

    for (path, body, status, code) in cases {
        let response = server.post(path).json(&body).await;
        response.assert_status(status);
        let error: Value = response.json();
        assert_eq!(error["code"], code, "{path} {body}");
        assert!(error["message"].as_str().is_some_and(|m| !m.is_empty()));
    }
}

#[tokio::test]
async fn refused_transition_leaves_booking_untouched() {
    let (server, store) = server_with([BookingBuilder::new("bk-1").completed("w-1").build()]);
    let before = store.snapshot(&"bk-1".into()).unwrap();

    server
        .post("/bookings/bk-1/transition")
        .json(&json!({"action": "cancel", "actorRole": "customer", "actorId": "c-1"}))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(store.snapshot(&"bk-1".into()).unwrap(), before);
}

#[tokio::test]
async fn malformed_requests_are_bad_requests() {
    let (server, _) = server_with([BookingBuilder::new("bk-1").build()]);

    let unknown_action = server
        .post("/bookings/bk-1/transition")
        .json(&json!({"action": "teleport", "actorRole": "admin"}))
        .await;
    unknown_action.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(unknown_action.json::<Value>()["code"], "BAD_REQUEST");

    server
        .post("/bookings/bk-1/transition")
        .json(&json!({"action": "cancel", "actorRole": "customer"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn store_outage_is_service_unavailable() {
    let (server, store) = server_with([BookingBuilder::new("bk-1").build()]);
    store.set_unavailable(true);

    let response = server.post("/bookings/bk-1/transition").json(&assign("w-1")).await;

    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["code"], "DEPENDENCY_UNAVAILABLE");
}

#[tokio::test]
async fn auto_assign_picks_a_worker() {
    let (server, _) = server_with([BookingBuilder::new("bk-1").build()]);

    let response = server.post("/bookings/bk-1/auto-assign").await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["status"], "assigned");
    assert_eq!(body["workerId"], "w-1");
}

// ============================================================================
// Booking creation and reads
// ============================================================================

#[tokio::test]
async fn created_booking_can_be_read_back() {
    let (server, _) = server_with([]);
    let request = json!({
        "id": "bk-new",
        "customerId": "c-7",
        "serviceId": "cleaning",
        "price": 2500,
        "scheduledAt": "2025-06-01T10:00:00Z"
    });

    let created = server.post("/bookings").json(&request).await;
    created.assert_status(StatusCode::CREATED);
    let created: Value = created.json();
    assert_eq!(created["status"], "pending");
    assert_eq!(created["version"], 0);
    assert_eq!(created["workerId"], Value::Null);

    let fetched: Value = server.get("/bookings/bk-new").await.json();
    assert_eq!(fetched, created);

    server
        .post("/bookings")
        .json(&request)
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn creation_validates_price_and_schedule() {
    let (server, _) = server_with([]);

    let past = server
        .post("/bookings")
        .json(&json!({
            "customerId": "c-7",
            "serviceId": "cleaning",
            "price": 2500,
            "scheduledAt": "2024-06-01T10:00:00Z"
        }))
        .await;
    past.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(past.json::<Value>()["code"], "INVALID_PAYLOAD");

    server
        .post("/bookings")
        .json(&json!({
            "customerId": "c-7",
            "serviceId": "cleaning",
            "price": 0,
            "scheduledAt": "2025-06-01T10:00:00Z"
        }))
        .await
        .assert_status(StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn reading_shows_the_intent_log() {
    let (server, _) = server_with([BookingBuilder::new("bk-1").build()]);
    server.post("/bookings/bk-1/transition").json(&assign("w-2")).await;

    let booking: Value = server.get("/bookings/bk-1").await.json();

    assert_eq!(booking["workerId"], "w-2");
    assert_eq!(booking["intentLog"][0]["id"], "bk-1/v1/0");
    server.get("/bookings/nope").await.assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Operational endpoints
// ============================================================================

#[tokio::test]
async fn health_reflects_store_reachability() {
    let (server, store) = server_with([]);

    let healthy = server.get("/health").await;
    healthy.assert_status(StatusCode::OK);
    assert_eq!(healthy.json::<Value>()["status"], "healthy");

    store.set_unavailable(true);
    let down = server.get("/health").await;
    down.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(down.json::<Value>()["status"], "unhealthy");
}

#[tokio::test]
async fn metrics_and_correlation_headers_are_served() {
    let (server, _) = server_with([]);

    let metrics = server.get("/metrics").await;
    metrics.assert_status(StatusCode::OK);
    assert!(
        metrics
            .header("content-type")
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );

    let traced = server
        .get("/health")
        .add_header(CORRELATION_ID_HEADER.clone(), HeaderValue::from_static("req-123"))
        .await;
    assert_eq!(traced.header(CORRELATION_ID_HEADER.clone()), "req-123");
}
