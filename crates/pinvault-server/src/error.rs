//! HTTP error types for the `PinVault` server.
//!
//! Maps domain errors from `pinvault-core` into HTTP responses. Every error
//! variant produces a JSON body with a machine-readable `error` field and a
//! human-readable `message`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use pinvault_core::error::{GateError, RecoveryError, StoreError, StrengthError};

/// Application-level error returned from HTTP handlers.
#[derive(Debug)]
pub enum AppError {
    /// The session is not granted.
    Locked,
    /// A PIN or security answer was wrong.
    Unauthorized(String),
    /// Requested resource not found.
    NotFound(String),
    /// Client sent invalid input or an action the gate does not allow now.
    BadRequest(String),
    /// Stored state changed underneath the request.
    Conflict(String),
    /// Internal server error.
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            Self::Locked => (
                StatusCode::UNAUTHORIZED,
                "locked",
                "vault is locked".to_owned(),
            ),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            Self::Internal(msg) => {
                error!(message = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_type,
            message,
        };

        (status, axum::Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation { .. } => Self::BadRequest(err.to_string()),
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::Conflict => Self::Conflict(err.to_string()),
            StoreError::Serialization { .. } | StoreError::Storage(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<RecoveryError> for AppError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::MissingEmail | RecoveryError::InvalidQuestions { .. } => {
                Self::BadRequest(err.to_string())
            }
            RecoveryError::AnswersRejected => Self::Unauthorized(err.to_string()),
            RecoveryError::Cancelled => Self::Conflict(err.to_string()),
        }
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Locked => Self::Locked,
            GateError::IncorrectPin => Self::Unauthorized(err.to_string()),
            GateError::InvalidPin { .. }
            | GateError::PinMismatch
            | GateError::InvalidTransition { .. } => Self::BadRequest(err.to_string()),
            GateError::Recovery(inner) => inner.into(),
            GateError::Serialization { .. } | GateError::Storage(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl From<StrengthError> for AppError {
    fn from(err: StrengthError) -> Self {
        Self::BadRequest(err.to_string())
    }
}
