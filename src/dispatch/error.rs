use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error types for dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Technician not found")]
    TechnicianNotFound,

    #[error("Order not found")]
    OrderNotFound,

    #[error("{0}")]
    ValidationError(String),
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        DispatchError::DatabaseError(err.to_string())
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            DispatchError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            DispatchError::TechnicianNotFound => {
                (StatusCode::NOT_FOUND, "Technician not found".to_string())
            }
            DispatchError::OrderNotFound => (StatusCode::NOT_FOUND, "Order not found".to_string()),
            DispatchError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
