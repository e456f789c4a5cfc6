//! RBAC (Role-Based Access Control) Middleware
//!
//! Route-level gates built on the role predicates in `services::rbac`.
//! Field-level checks happen inside the shipment editor.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::{models::UserRole, services::rbac, utils::AppError};

use super::auth::AuthUser;

/// Fail with 403 unless `allowed` holds for the user's role
pub fn check_role(
    auth_user: &AuthUser,
    allowed: fn(UserRole) -> bool,
    action: &str,
) -> Result<(), AppError> {
    if allowed(auth_user.role) {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "role {} may not {}",
            auth_user.role, action
        )))
    }
}

/// Gate for worker account management (IT only)
///
/// Must run inside `auth_middleware`.
pub async fn require_user_admin(request: Request, next: Next) -> Response {
    let Some(user) = request.extensions().get::<AuthUser>() else {
        return AppError::unauthorized("authentication required").into_response();
    };

    if let Err(e) = check_role(user, rbac::can_manage_users, "manage users") {
        return e.into_response();
    }

    next.run(request).await
}
