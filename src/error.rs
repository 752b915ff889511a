use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::delivery::DeliveryStatus;

/// Failures of the pure lifecycle and matching operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LifecycleError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },

    #[error("rider {0} is not available")]
    RiderUnavailable(String),

    #[error("no riders available")]
    NoRiderAvailable,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("concurrent modification of {id}: expected version {expected}, found {found}")]
    ConcurrentModification {
        id: String,
        expected: u64,
        found: u64,
    },
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Lifecycle(LifecycleError::InvalidTransition { .. }) => {
                (StatusCode::CONFLICT, "invalid_transition")
            }
            AppError::Lifecycle(LifecycleError::RiderUnavailable(_)) => {
                (StatusCode::CONFLICT, "rider_unavailable")
            }
            AppError::Lifecycle(LifecycleError::NoRiderAvailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no_rider_available")
            }
            AppError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Store(StoreError::AlreadyExists(_)) => {
                (StatusCode::CONFLICT, "already_exists")
            }
            AppError::Store(StoreError::ConcurrentModification { .. }) => {
                (StatusCode::CONFLICT, "concurrent_modification")
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}
