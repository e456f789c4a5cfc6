//! Worker account management (IT only)

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing::info;
use validator::Validate;

use crate::{
    middleware::AuthUser,
    models::{InviteRequest, UserPublic, UserRole},
    services::mailer::{self, OutboundEmail},
    utils::{validation::non_blank, ApiResponse, AppError, AppResult},
    AppState,
};

/// Create routes for user management; callers wrap them in the IT-only gate
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users))
        .route("/invite", post(invite_user))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    pub email: String,
    pub role: UserRole,
    pub created: bool,
}

fn welcome_email(email: &str, temporary_password: &str) -> OutboundEmail {
    OutboundEmail::new(
        email,
        "Welcome to Tretize Worker Portal",
        format!(
            "You are now registered.\nEmail: {}\nTemporary password: {}\n\
             Please log in and change your password.",
            email, temporary_password
        ),
    )
}

fn reinvite_email(email: &str) -> OutboundEmail {
    OutboundEmail::new(
        email,
        "Tretize Worker Portal: password change required",
        format!(
            "Your account {} was re-invited.\n\
             Please log in with your current password and choose a new one.",
            email
        ),
    )
}

/// GET /api/users
async fn list_users(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<UserPublic>>> {
    let users = state.auth.list_users().await?;
    Ok(ApiResponse::data(users.into_iter().map(UserPublic::from).collect()))
}

/// POST /api/users/invite
async fn invite_user(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<InviteRequest>,
) -> AppResult<ApiResponse<InviteResponse>> {
    let Some(email) = non_blank(payload.email.as_deref()).map(str::to_string) else {
        return Err(AppError::invalid_fields("email required", vec!["email".to_string()]));
    };
    payload.validate()?;

    let temporary_password = &state.config.auth.default_worker_password;
    let outcome = state
        .auth
        .invite(
            &email,
            payload.role.unwrap_or_default(),
            payload.display_name.as_deref().unwrap_or_default(),
            temporary_password,
        )
        .await?;
    let user = outcome.user;

    info!(
        invited = %user.email,
        role = %user.role,
        created = outcome.created,
        by = %auth_user.email,
        "Worker invited"
    );

    let email = if outcome.created {
        welcome_email(&user.email, temporary_password)
    } else {
        reinvite_email(&user.email)
    };
    mailer::dispatch(state.mailer.clone(), email, "invite");

    Ok(ApiResponse::data(InviteResponse {
        email: user.email,
        role: user.role,
        created: outcome.created,
    }))
}
