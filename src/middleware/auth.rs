//! JWT Authentication Middleware
//!
//! Reads the session token from `Authorization: Bearer` or the `jwt` cookie,
//! injects the [`AuthUser`] into request extensions and refreshes the cookie
//! when the token is close to expiry.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        request::Parts,
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    models::{Actor, UserRole},
    services::session::{Claims, SessionError, SESSION_COOKIE},
    utils::{error::ClearSession, AppError},
    AppState,
};

/// Authenticated user information extracted from the session token
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub role: UserRole,
    pub display_name: String,
}

impl TryFrom<&Claims> for AuthUser {
    type Error = SessionError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            id: claims.user_id()?,
            email: claims.email.clone(),
            role: claims.role,
            display_name: claims.name.clone(),
        })
    }
}

impl AuthUser {
    /// The acting identity handed to the services
    pub fn actor(&self) -> Actor {
        Actor {
            id: self.id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
        }
    }
}

/// Extractor for AuthUser from request extensions
///
/// This allows using AuthUser as a handler parameter after auth middleware has run.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized("authentication required"))
    }
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Session token from the request; the bearer header wins over the cookie
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    bearer.or_else(|| {
        CookieJar::from_headers(headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .filter(|v| !v.is_empty())
    })
}

fn session_error_message(err: &SessionError) -> &'static str {
    match err {
        SessionError::Missing => "missing authentication token",
        SessionError::Expired => "session expired",
        SessionError::Invalid | SessionError::Signing(_) => "invalid authentication token",
    }
}

/// Authentication middleware
///
/// Rejects the request with 401 (clearing the cookie) when no valid token is
/// present. A token inside the renewal window is replaced by a fresh cookie
/// on the way out.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = extract_token(request.headers()).unwrap_or_default();

    let claims = match state.sessions.verify(&token) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(reason = %e, "Rejected session token");
            return AppError::unauthorized(session_error_message(&e)).into_response();
        }
    };

    let user = match AuthUser::try_from(&claims) {
        Ok(user) => user,
        Err(e) => return AppError::unauthorized(session_error_message(&e)).into_response(),
    };

    request.extensions_mut().insert(user);
    let mut response = next.run(request).await;

    // A handler that set its own session cookie (login, change-password) wins
    if response.headers().contains_key(SET_COOKIE) {
        return response;
    }

    match state.sessions.maybe_renew(&claims) {
        Ok(Some(fresh)) => match HeaderValue::from_str(
            &state.sessions.session_cookie(&fresh).to_string(),
        ) {
            Ok(cookie) => {
                debug!(user = %claims.email, "Session renewed");
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(e) => warn!(error = %e, "Renewed session cookie is not a valid header"),
        },
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Failed to renew session"),
    }

    response
}

/// Turn a rejected session into a removal cookie
///
/// Any 401 coming back through this layer deletes the `jwt` cookie with the
/// same attributes the session was issued with.
pub async fn clear_session_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if response.extensions_mut().remove::<ClearSession>().is_none() {
        return response;
    }

    let removal = state.sessions.removal_cookie().to_string();
    match HeaderValue::from_str(&removal) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(e) => warn!(error = %e, "Session removal cookie is not a valid header"),
    }
    response
}
