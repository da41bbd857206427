use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::PricingError;
use crate::orchestration::{CatalogError, PurchaseError};
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    /// Expected business outcome the client should render specifically.
    #[error("{message}")]
    Rejected {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
    /// Transient failure; the request can be retried.
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout | StoreError::Unavailable(_) => {
                AppError::Unavailable(err.to_string())
            }
            StoreError::Conflict(_) | StoreError::Corrupt(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<PricingError> for AppError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::NotFound(_) => AppError::NotFound(err.to_string()),
            PricingError::InvariantViolation { .. } => AppError::Internal(err.to_string()),
            PricingError::Store(e) => e.into(),
        }
    }
}

impl From<PurchaseError> for AppError {
    fn from(err: PurchaseError) -> Self {
        let message = err.to_string();
        match err {
            PurchaseError::NotFound(_) => AppError::NotFound(message),
            PurchaseError::AlreadySold(_) => AppError::Rejected {
                status: StatusCode::CONFLICT,
                code: "already_sold",
                message,
            },
            PurchaseError::SelfPurchase(_) => AppError::Rejected {
                status: StatusCode::BAD_REQUEST,
                code: "self_purchase",
                message,
            },
            PurchaseError::Busy(_) | PurchaseError::StoreUnavailable(_) => {
                AppError::Unavailable(message)
            }
            PurchaseError::InvariantViolation { .. } => AppError::Internal(message),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::Validation(e) => AppError::BadRequest(e.to_string()),
            CatalogError::Store(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": msg }),
                )
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Rejected {
                status,
                code,
                message,
            } => (status, json!({ "error": message, "code": code })),
            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "error": msg, "retryable": true }),
            ),
        };

        (status, Json(body)).into_response()
    }
}
