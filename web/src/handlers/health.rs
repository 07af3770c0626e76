//! Operational endpoints: health and metrics.

use crate::state::AppState;
use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use booking_runtime::health::{HealthReport, check_booking_store};

/// `GET /health`.
///
/// Probes the booking store. `200` while healthy or degraded, `503` when
/// unhealthy, so load balancers can take the instance out of rotation.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthReport::new(vec![check_booking_store(state.bookings.as_ref()).await]);

    let status = if report.status.is_unhealthy() {
        tracing::warn!(status = %report.status, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report))
}

/// `GET /metrics` in the Prometheus text format.
#[allow(clippy::unused_async)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
