// Authentication middleware for protected routes

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use std::sync::Arc;
use tracing::warn;

use crate::auth::{error::AuthError, models::Role, service::AuthService};

/// Authenticated user extractor for protected routes
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: i32,
    pub email: String,
    pub role: Role,
}

impl AuthenticatedUser {
    /// Admin-only operations call this explicitly.
    pub fn require_role(&self, required: Role) -> Result<(), AuthError> {
        if self.role == Role::Admin || self.role == required {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions {
                required,
                actual: self.role,
            })
        }
    }
}

// Validation goes through the state's auth service so tokens are checked
// against the same secret that minted them.
#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::InvalidToken)?;

        let auth_service = Arc::<AuthService>::from_ref(state);
        let claims = auth_service.validate_token(token).map_err(|e| {
            warn!("Token validation failed for {}", parts.uri.path());
            e
        })?;

        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}
