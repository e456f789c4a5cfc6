//! Middleware components
//!
//! This module contains middleware for:
//! - Authentication (session JWT)
//! - Authorization (role gates)
//! - Rate limiting
//! - Security and cache headers

pub mod auth;
pub mod rate_limit;
pub mod rbac;
pub mod security_headers;

pub use auth::{auth_middleware, clear_session_middleware, AuthUser};
pub use rate_limit::{rate_limit_middleware, RateLimitState};
pub use rbac::require_user_admin;
pub use security_headers::{
    api_cache_control_middleware, hsts_middleware, security_headers_middleware,
};
