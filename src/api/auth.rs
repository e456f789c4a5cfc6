//! Authentication API endpoints
//!
//! Login, logout, the current profile and password changes. The session
//! token travels both in the response body and in the `jwt` cookie.

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::CookieJar;
use tracing::{info, warn};

use crate::{
    middleware::AuthUser,
    models::{ChangePasswordRequest, LoginRequest, LoginResponse, User, UserPublic},
    utils::{validation::non_blank, ApiResponse, AppError, AppResult},
    AppState,
};

/// Create public routes for authentication endpoints (no auth required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
}

/// Create protected routes for authentication endpoints (auth required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/change-password", post(change_password))
        .route("/me", get(get_current_user))
}

/// Token, cookie and body for a freshly authenticated user
fn session_response(state: &AppState, user: &User) -> AppResult<impl IntoResponse> {
    let token = state.sessions.issue(user)?;
    let jar = CookieJar::new().add(state.sessions.session_cookie(&token));

    Ok((
        jar,
        Json(LoginResponse {
            ok: true,
            token,
            force_password_change: user.force_password_change,
            role: user.role,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        }),
    ))
}

/// Login handler
///
/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let mut missing = Vec::new();
    if non_blank(Some(&payload.email)).is_none() {
        missing.push("email".to_string());
    }
    if payload.password.is_empty() {
        missing.push("password".to_string());
    }
    if !missing.is_empty() {
        return Err(AppError::invalid_fields("email and password required", missing));
    }

    let user = state
        .auth
        .authenticate(&payload.email, &payload.password)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    if let Err(e) = state.auth.touch_last_seen(&user.id).await {
        warn!(user = %user.email, error = %format!("{:#}", e), "Failed to record last seen");
    }

    info!(user = %user.email, role = %user.role, "User logged in");
    session_response(&state, &user)
}

/// Logout handler; clears the session cookie
///
/// POST /api/auth/logout
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    (
        jar.add(state.sessions.removal_cookie()),
        ApiResponse::<()>::message("logged out"),
    )
}

/// GET /api/auth/me
async fn get_current_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> AppResult<ApiResponse<UserPublic>> {
    let user = state
        .auth
        .get_user_by_id(&auth_user.id)
        .await?
        .filter(|u| u.active)
        .ok_or_else(|| AppError::unauthorized("account no longer active"))?;

    Ok(ApiResponse::data(user.into()))
}

/// Change password (and optionally the display name); reissues the session
///
/// POST /api/auth/change-password
async fn change_password(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let min = state.config.auth.password_min_length;
    if payload.new_password.chars().count() < min {
        return Err(AppError::invalid_fields(
            format!("password must be at least {} characters", min),
            vec!["newPassword".to_string()],
        ));
    }

    let user = state
        .auth
        .change_password(
            &auth_user.id,
            &payload.new_password,
            payload.display_name.as_deref(),
        )
        .await?
        .ok_or_else(|| AppError::unauthorized("account no longer exists"))?;

    info!(user = %user.email, "Password changed");
    session_response(&state, &user)
}
