// Authentication business logic

use crate::auth::{
    error::AuthError,
    models::{AuthResponse, RegisterRequest, UserResponse},
    password::PasswordService,
    repository::UserRepository,
    token::{Claims, TokenService},
};

/// Authentication service coordinating login and account creation
pub struct AuthService {
    users: UserRepository,
    tokens: TokenService,
}

impl AuthService {
    pub fn new(users: UserRepository, tokens: TokenService) -> Self {
        Self { users, tokens }
    }

    /// Create a staff account. Only admins reach this path.
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        let password_hash = PasswordService::hash_password(&request.password)?;
        let user = self
            .users
            .create(&request.email, &password_hash, &request.display_name, request.role)
            .await?;
        let access_token = self
            .tokens
            .generate_access_token(user.id, &user.email, user.role)?;
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, AuthError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !PasswordService::verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self
            .tokens
            .generate_access_token(user.id, &user.email, user.role)?;
        Ok(AuthResponse {
            access_token,
            user: user.into(),
        })
    }

    /// Validate a bearer token against the secret this service signs with.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        self.tokens.validate_access_token(token)
    }

    pub async fn get_current_user(&self, user_id: i32) -> Result<UserResponse, AuthError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        Ok(user.into())
    }
}
