use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::orders::lifecycle::LifecycleError;
use crate::orders::payment::PaymentError;

/// Error types for order operations
#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Order not found")]
    NotFound,

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("{0}")]
    CloseBlocked(String),

    #[error("{0}")]
    PaymentLocked(String),

    #[error("最多只能上傳 {0} 張照片")]
    PhotoLimit(usize),
}

impl From<sqlx::Error> for OrderError {
    fn from(err: sqlx::Error) -> Self {
        OrderError::DatabaseError(err.to_string())
    }
}

impl From<LifecycleError> for OrderError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::IllegalTransition { from, event } => OrderError::InvalidTransition(
                format!("cannot {} from {}", event, from),
            ),
            LifecycleError::Validation(msg) => OrderError::ValidationError(msg),
            LifecycleError::Blocked(block) => OrderError::CloseBlocked(block.reason()),
        }
    }
}

impl From<PaymentError> for OrderError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Locked => OrderError::PaymentLocked(err.to_string()),
            PaymentError::Validation(msg) => OrderError::ValidationError(msg),
        }
    }
}

impl IntoResponse for OrderError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            OrderError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            OrderError::NotFound => (StatusCode::NOT_FOUND, "Order not found".to_string()),
            OrderError::InvalidTransition(msg) => (StatusCode::BAD_REQUEST, msg),
            OrderError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            OrderError::CloseBlocked(msg) => (StatusCode::BAD_REQUEST, msg),
            OrderError::PaymentLocked(msg) => (StatusCode::CONFLICT, msg),
            OrderError::PhotoLimit(max) => (
                StatusCode::BAD_REQUEST,
                format!("最多只能上傳 {} 張照片", max),
            ),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
