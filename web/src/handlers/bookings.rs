//! Booking endpoints.
//!
//! ```text
//! POST /bookings                    create a pending booking
//! GET  /bookings/:id                read a booking with its intent log
//! POST /bookings/:id/transition     request a transition
//! POST /bookings/:id/auto-assign    assign to the least-loaded capable worker
//! ```

use crate::WebResult;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use booking_core::{
    Action, Actor, ActorRole, Booking, BookingId, BookingStatus, CustomerId, Intent, Money,
    ServiceId, TransitionPayload, Version, WorkerId,
};
use booking_runtime::{TransitionRequest, TransitionResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /bookings/:id/transition`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionBody {
    /// Requested action.
    pub action: Action,
    /// Role the caller acts under.
    pub actor_role: ActorRole,
    /// Customer or worker id; ignored for admins.
    #[serde(default)]
    pub actor_id: Option<String>,
    /// Action-specific data.
    #[serde(default)]
    pub payload: TransitionPayload,
    /// Version the caller last saw.
    #[serde(default)]
    pub expected_version: Option<Version>,
}

impl TransitionBody {
    /// The acting party.
    ///
    /// # Errors
    ///
    /// `BAD_REQUEST` when a customer or worker role comes without an id.
    pub fn actor(&self) -> Result<Actor, AppError> {
        let id = || {
            self.actor_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| AppError::bad_request(format!("actorId is required for role {}", self.actor_role)))
        };
        Ok(match self.actor_role {
            ActorRole::Customer => Actor::Customer(CustomerId::new(id()?)),
            ActorRole::Worker => Actor::Worker(WorkerId::new(id()?)),
            ActorRole::Admin => Actor::Admin,
        })
    }
}

/// Body of `POST /bookings`.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingBody {
    /// Client-chosen id; generated when absent.
    #[serde(default)]
    pub id: Option<BookingId>,
    /// Owner.
    pub customer_id: CustomerId,
    /// Service booked.
    pub service_id: ServiceId,
    /// Price in minor units.
    pub price: Money,
    /// When the job should happen.
    pub scheduled_at: DateTime<Utc>,
}

/// A booking as returned by the API.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    /// Booking id.
    pub id: BookingId,
    /// Lifecycle status.
    pub status: BookingStatus,
    /// Owner.
    pub customer_id: CustomerId,
    /// Assigned worker, if any.
    pub worker_id: Option<WorkerId>,
    /// Service booked.
    pub service_id: ServiceId,
    /// Price in minor units.
    pub price: Money,
    /// Scheduled time.
    pub scheduled_at: DateTime<Utc>,
    /// Current version; send it back as `expectedVersion` to pin a request.
    pub version: Version,
    /// Side-effect log, oldest first.
    pub intent_log: Vec<Intent>,
}

impl From<Booking> for BookingView {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id,
            status: booking.status,
            customer_id: booking.customer_id,
            worker_id: booking.worker_id,
            service_id: booking.service_id,
            price: booking.price,
            scheduled_at: booking.scheduled_at,
            version: booking.version,
            intent_log: booking.intent_log,
        }
    }
}

/// `POST /bookings/:id/transition`.
///
/// # Errors
///
/// Every [`booking_core::TransitionError`] maps to its documented status;
/// malformed bodies are `400`.
pub async fn transition(
    State(state): State<AppState>,
    Path(booking_id): Path<BookingId>,
    body: Result<Json<TransitionBody>, JsonRejection>,
) -> WebResult<Json<TransitionResult>> {
    let Json(body) = body?;
    let mut request = TransitionRequest::new(booking_id, body.actor()?, body.action)
        .with_payload(body.payload);
    if let Some(version) = body.expected_version {
        request = request.expecting(version);
    }

    let result = state.engine.request_transition(request).await?;
    Ok(Json(result))
}

/// `POST /bookings/:id/auto-assign`.
///
/// # Errors
///
/// As [`transition`]; `422 INVALID_PAYLOAD` when no worker is available.
pub async fn auto_assign(
    State(state): State<AppState>,
    Path(booking_id): Path<BookingId>,
) -> WebResult<Json<TransitionResult>> {
    let result = state.engine.auto_assign(booking_id).await?;
    Ok(Json(result))
}

/// `POST /bookings`.
///
/// # Errors
///
/// `422 INVALID_PAYLOAD` for a zero price or a schedule in the past,
/// `409 ALREADY_EXISTS` for a taken id, `503` when the store is down.
pub async fn create_booking(
    State(state): State<AppState>,
    body: Result<Json<CreateBookingBody>, JsonRejection>,
) -> WebResult<(StatusCode, Json<BookingView>)> {
    let Json(body) = body?;

    if body.price == Money::default() {
        return Err(invalid_payload("price must be positive"));
    }
    if body.scheduled_at <= state.clock.now() {
        return Err(invalid_payload("scheduledAt must be in the future"));
    }

    let booking = Booking::new_pending(
        body.id.unwrap_or_else(BookingId::generate),
        body.customer_id,
        body.service_id,
        body.price,
        body.scheduled_at,
    );
    let created = state.bookings.create(booking).await?;
    tracing::info!(booking_id = %created.id, customer_id = %created.customer_id, "Booking created");

    Ok((StatusCode::CREATED, Json(created.into())))
}

/// `GET /bookings/:id`.
///
/// # Errors
///
/// `404` for an unknown id, `503` when the store is down.
pub async fn get_booking(
    State(state): State<AppState>,
    Path(booking_id): Path<BookingId>,
) -> WebResult<Json<BookingView>> {
    let booking = state.bookings.get(booking_id).await?;
    Ok(Json(booking.into()))
}

fn invalid_payload(message: &str) -> AppError {
    AppError::new(StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PAYLOAD", message)
}
