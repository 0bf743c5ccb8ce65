//! Authentication module for GrantScout

pub mod jwt;
pub mod middleware;
pub mod service;

pub use jwt::{Claims, JwtError, JwtManager};
pub use middleware::{require_auth, AuthState, AuthUser};
pub use service::{require_service_secret, ServiceAuthState, SERVICE_SECRET_HEADER};
