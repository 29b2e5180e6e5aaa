use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::{rating_api::RatingApiError, storage::StorageError},
    services::formatter::FormatError,
    state::state_machine::{ApplyError, TransitionError},
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Caller is known but not allowed to perform the operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Concurrent writers kept winning the revision check.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Token exchange with the rating service failed; nothing was attempted.
    #[error("rating service unavailable")]
    RatingServiceUnavailable(#[source] RatingApiError),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { .. } | StorageError::AlreadyExists { .. } => {
                ServiceError::Conflict(err.to_string())
            }
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<TransitionError> for ServiceError {
    fn from(err: TransitionError) -> Self {
        match err {
            TransitionError::NotParticipant { .. }
            | TransitionError::NotOrganizer { .. }
            | TransitionError::SameSide => ServiceError::Forbidden(err.to_string()),
            TransitionError::InvalidTransition { .. }
            | TransitionError::Cancelled
            | TransitionError::NoProposal { .. } => ServiceError::InvalidState(err.to_string()),
            TransitionError::ReasonRequired { .. }
            | TransitionError::OverrideRequired { .. }
            | TransitionError::InvalidGame { .. }
            | TransitionError::TooManyGames { .. }
            | TransitionError::InvalidMatch(_) => ServiceError::InvalidInput(err.to_string()),
        }
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        ServiceError::Conflict(err.to_string())
    }
}

impl From<FormatError> for ServiceError {
    fn from(err: FormatError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Unauthorized access attempt.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated caller lacking permission.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Conflict(message) => AppError::Conflict(message),
            ServiceError::RatingServiceUnavailable(source) => {
                AppError::ServiceUnavailable(format!("rating service: {source}"))
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_errors_map_to_statuses() {
        let forbidden: AppError =
            ServiceError::from(TransitionError::NotOrganizer { command: "finalize" }).into();
        assert_eq!(forbidden.into_response().status(), StatusCode::FORBIDDEN);

        let invalid: AppError = ServiceError::from(TransitionError::ReasonRequired {
            command: "dispute",
        })
        .into();
        assert_eq!(invalid.into_response().status(), StatusCode::BAD_REQUEST);

        let conflict: AppError = ServiceError::from(StorageError::Conflict {
            entity: "match",
            id: "m1".into(),
            expected: 2,
        })
        .into();
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);
    }
}
