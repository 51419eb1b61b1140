// In-app notifications
//
// Simple broadcast rows with a per-user read marker. Pushes arrive either
// directly from handlers or through the outbox worker.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use crate::auth::middleware::AuthenticatedUser;

/// Who a notification is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationTarget {
    All,
    Member,
    Support,
    Tech,
    User,
    Subset,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Notification {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub level: String,
    pub target: NotificationTarget,
    pub target_user_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A notification paired with the requesting user's read state.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserNotification {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub level: String,
    pub target: NotificationTarget,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

/// Request DTO for pushing a notification
#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_level")]
    pub level: String,
    pub target: NotificationTarget,
    pub target_user_email: Option<String>,
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl From<sqlx::Error> for NotificationError {
    fn from(err: sqlx::Error) -> Self {
        NotificationError::DatabaseError(err.to_string())
    }
}

impl axum::response::IntoResponse for NotificationError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            NotificationError::DatabaseError(msg) => {
                tracing::error!("Database error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            NotificationError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, msg),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Service for pushing and reading notifications
#[derive(Clone)]
pub struct NotificationService {
    pool: PgPool,
}

impl NotificationService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn push(&self, request: &PushRequest) -> Result<Notification, NotificationError> {
        if request.target == NotificationTarget::User && request.target_user_email.is_none() {
            return Err(NotificationError::InvalidPayload(
                "target 'user' requires target_user_email".to_string(),
            ));
        }

        let notification = sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (title, body, level, target, target_user_email)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, title, body, level, target, target_user_email, created_at
            "#,
        )
        .bind(&request.title)
        .bind(&request.body)
        .bind(&request.level)
        .bind(request.target)
        .bind(request.target_user_email.as_deref())
        .fetch_one(&self.pool)
        .await?;
        Ok(notification)
    }

    /// Notifications visible to a user: broadcasts, their role's channel,
    /// and anything addressed to them directly.
    pub async fn list_for_user(
        &self,
        email: &str,
        role_target: NotificationTarget,
    ) -> Result<Vec<UserNotification>, NotificationError> {
        let notifications = sqlx::query_as::<_, UserNotification>(
            r#"
            SELECT n.id, n.title, n.body, n.level, n.target, n.created_at,
                   (r.notification_id IS NOT NULL) AS read
            FROM notifications n
            LEFT JOIN notification_reads r
                ON r.notification_id = n.id AND r.user_email = $1
            WHERE n.target = 'all'
               OR n.target = $2
               OR (n.target = 'user' AND n.target_user_email = $1)
            ORDER BY n.id DESC
            LIMIT 100
            "#,
        )
        .bind(email)
        .bind(role_target)
        .fetch_all(&self.pool)
        .await?;
        Ok(notifications)
    }

    pub async fn mark_read(&self, email: &str, id: i32) -> Result<(), NotificationError> {
        sqlx::query(
            r#"
            INSERT INTO notification_reads (user_email, notification_id)
            VALUES ($1, $2)
            ON CONFLICT (user_email, notification_id) DO NOTHING
            "#,
        )
        .bind(email)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Outbox adapter: deserialize a queued push intent and deliver it.
    pub async fn push_from_payload(
        &self,
        payload: &serde_json::Value,
    ) -> Result<(), NotificationError> {
        let request: PushRequest = serde_json::from_value(payload.clone())
            .map_err(|e| NotificationError::InvalidPayload(e.to_string()))?;
        self.push(&request).await?;
        Ok(())
    }
}

/// Handler for POST /api/notifications
pub async fn push_handler(
    State(state): State<crate::AppState>,
    _user: AuthenticatedUser,
    Json(request): Json<PushRequest>,
) -> Result<(StatusCode, Json<Notification>), NotificationError> {
    let notification = state.notification_service.push(&request).await?;
    Ok((StatusCode::CREATED, Json(notification)))
}

/// Handler for GET /api/notifications
pub async fn list_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<UserNotification>>, NotificationError> {
    let role_target = match user.role {
        crate::auth::models::Role::Admin | crate::auth::models::Role::Support => {
            NotificationTarget::Support
        }
        crate::auth::models::Role::Tech => NotificationTarget::Tech,
    };
    let notifications = state
        .notification_service
        .list_for_user(&user.email, role_target)
        .await?;
    Ok(Json(notifications))
}

/// Handler for POST /api/notifications/{id}/read
pub async fn mark_read_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i32>,
) -> Result<StatusCode, NotificationError> {
    state.notification_service.mark_read(&user.email, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_payload_round_trip() {
        let payload = serde_json::json!({
            "target": "support",
            "title": "訂單已確認",
            "body": "訂單 SO2506010001 已確認",
        });
        let request: PushRequest = serde_json::from_value(payload).unwrap();
        assert_eq!(request.target, NotificationTarget::Support);
        assert_eq!(request.level, "info");
    }

    #[test]
    fn test_user_target_requires_email() {
        let payload = serde_json::json!({
            "target": "user",
            "title": "hi",
        });
        let request: PushRequest = serde_json::from_value(payload).unwrap();
        assert!(request.target_user_email.is_none());
    }
}
