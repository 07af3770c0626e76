//! HTTP error responses.
//!
//! Every failure leaves the service as `{"code": ..., "message": ...}` with a
//! status chosen from the error's kind. Codes are the stable strings from
//! [`TransitionError::code`], so clients branch on them rather than on
//! messages.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use booking_core::{StoreError, TransitionError};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Booking>, AppError> {
///     let booking = state.bookings.get(id).await?;
///     Ok(Json(booking))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    /// Logged for server errors, never sent to the client.
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create an error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 400: the request could not be parsed.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// 500.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// HTTP status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Status for each transition outcome.
const fn transition_status(err: &TransitionError) -> StatusCode {
    match err {
        TransitionError::NotFound(_) => StatusCode::NOT_FOUND,
        TransitionError::Forbidden { .. } => StatusCode::FORBIDDEN,
        TransitionError::VersionConflict { .. } | TransitionError::Conflict { .. } => StatusCode::CONFLICT,
        TransitionError::TerminalState { .. }
        | TransitionError::InvalidTransition { .. }
        | TransitionError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TransitionError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        TransitionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        let error = Self::new(transition_status(&err), err.code(), err.to_string());
        if error.status.is_server_error() {
            error.with_source(err)
        } else {
            error
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
            StoreError::AlreadyExists(_) => {
                Self::new(StatusCode::CONFLICT, "ALREADY_EXISTS", err.to_string())
            },
            StoreError::VersionConflict { .. } => {
                Self::new(StatusCode::CONFLICT, "VERSION_CONFLICT", err.to_string())
            },
            StoreError::Unavailable(_) => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "DEPENDENCY_UNAVAILABLE",
                "booking store unavailable",
            )
            .with_source(err),
            StoreError::InvalidUpdate(_) | StoreError::Serialization(_) => {
                Self::internal("stored booking could not be processed").with_source(err)
            },
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
