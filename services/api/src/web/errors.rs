//! services/api/src/web/errors.rs
//!
//! Maps core errors to HTTP responses. Every failure carries an [`ErrorBody`].

use axum::{http::StatusCode, Json};
use speakfree_core::ports::PortError;
use speakfree_core::IntakeError;
use tracing::error;

use super::protocol::ErrorBody;

pub type HttpError = (StatusCode, Json<ErrorBody>);

pub fn http_error(status: StatusCode, error: &str, message: impl Into<String>) -> HttpError {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
            message: message.into(),
            retryable: status == StatusCode::SERVICE_UNAVAILABLE,
        }),
    )
}

pub fn bad_request(message: impl Into<String>) -> HttpError {
    http_error(StatusCode::BAD_REQUEST, "invalid_request", message)
}

pub fn from_intake(e: IntakeError) -> HttpError {
    match e {
        IntakeError::SessionNotFound(_) => http_error(
            StatusCode::NOT_FOUND,
            "session_not_found",
            "This conversation does not exist. Please start a new one.",
        ),
        IntakeError::SessionEnded(_) => http_error(
            StatusCode::GONE,
            "session_ended",
            "This conversation has ended. Please start a new one.",
        ),
        IntakeError::InvalidRequest(message) => bad_request(message),
        IntakeError::Unavailable { reply, cause } => {
            error!("Intake collaborator unavailable: {}", cause);
            http_error(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", reply)
        }
    }
}

pub fn from_port(e: PortError) -> HttpError {
    match e {
        PortError::NotFound(message) => http_error(StatusCode::NOT_FOUND, "not_found", message),
        PortError::Invalid(message) => bad_request(message),
        PortError::Conflict(message) => http_error(StatusCode::CONFLICT, "conflict", message),
        PortError::Unexpected(message) => {
            error!("Unexpected port error: {}", message);
            http_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Something went wrong on our side.",
            )
        }
    }
}
