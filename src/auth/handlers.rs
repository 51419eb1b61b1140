// HTTP handlers for authentication endpoints

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{AuthResponse, LoginRequest, RegisterRequest, Role, UserResponse},
};

/// Handler for POST /api/auth/login
pub async fn login_handler(
    State(state): State<crate::AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    request
        .validate()
        .map_err(|e| AuthError::ValidationError(e.to_string()))?;

    let response = state
        .auth_service
        .login(&request.email, &request.password)
        .await?;
    Ok(Json(response))
}

/// Handler for POST /api/auth/register
/// Admin-only staff account creation.
pub async fn register_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    user.require_role(Role::Admin)?;
    request
        .validate()
        .map_err(|e| AuthError::ValidationError(e.to_string()))?;

    let response = state.auth_service.register(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for GET /api/auth/me
pub async fn me_handler(
    State(state): State<crate::AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, AuthError> {
    let response = state.auth_service.get_current_user(user.user_id).await?;
    Ok(Json(response))
}
