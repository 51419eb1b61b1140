// Authentication module
// JWT-based staff authentication with role-aware access control

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

pub use error::AuthError;
pub use handlers::{login_handler, me_handler, register_handler};
pub use middleware::AuthenticatedUser;
pub use models::{AuthResponse, LoginRequest, RegisterRequest, Role, User, UserResponse};
pub use repository::UserRepository;
pub use service::AuthService;
pub use token::TokenService;
