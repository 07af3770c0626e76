//! HTTP surface for the booking lifecycle engine.
//!
//! The handlers are a thin shell: parse the request, hand it to the
//! [`booking_runtime::TransitionEngine`] or the booking store, and map the
//! outcome to a status code. All rules live in `booking-core`.
//!
//! # Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | `POST` | `/bookings` | create a pending booking |
//! | `GET` | `/bookings/:id` | read a booking |
//! | `POST` | `/bookings/:id/transition` | request a transition |
//! | `POST` | `/bookings/:id/auto-assign` | auto-assign a worker |
//! | `GET` | `/health` | store reachability |
//! | `GET` | `/metrics` | Prometheus exposition |
//!
//! # Example
//!
//! ```ignore
//! let state = AppState::new(engine, bookings, clock, metrics_handle);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, booking_web::router(state)).await?;
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use error::AppError;
pub use middleware::{CORRELATION_ID_HEADER, CorrelationId};
pub use state::AppState;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/bookings", post(handlers::create_booking))
        .route("/bookings/:id", get(handlers::get_booking))
        .route("/bookings/:id/transition", post(handlers::transition))
        .route("/bookings/:id/auto-assign", post(handlers::auto_assign))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(middleware::correlation_id))
        .with_state(state)
}
