//! API routes and handlers
//!
//! This module defines all API endpoints and assembles the application router.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, CorsLayer},
    services::{ServeDir, ServeFile},
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use crate::{
    middleware::{
        self, auth_middleware, rate_limit::spawn_rate_limit_cleanup, RateLimitState,
    },
    AppState,
};

mod auth;
mod health;
mod quote;
mod track;
mod users;

pub use health::*;

/// Public API routes (no authentication required)
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness))
        .nest("/track", track::public_routes())
}

/// Public routes that take user input worth throttling harder
/// (credential guessing, form spam, nudge spam)
pub fn strict_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::public_routes())
        .nest("/quote", quote::routes())
        .nest("/track", track::nudge_routes())
}

/// Protected API routes (authentication required)
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        // Protected auth endpoints (change-password, me)
        .nest("/auth", auth::protected_routes())
        .nest("/track", track::protected_routes())
        .nest(
            "/users",
            users::routes().route_layer(from_fn(middleware::require_user_admin)),
        )
}

/// Create the API router mounted under `/api`
///
/// Authentication is layered onto the protected routes only, otherwise
/// login and the public lookup would be unreachable.
pub fn routes(state: &AppState) -> Router<AppState> {
    let settings = &state.config.rate_limit;

    let mut public = public_routes();
    let mut strict = strict_routes();
    let mut protected =
        protected_routes().route_layer(from_fn_with_state(state.clone(), auth_middleware));

    if settings.enabled {
        let strict_limit = RateLimitState::strict(settings);
        let standard_limit = RateLimitState::standard(settings);
        spawn_rate_limit_cleanup(vec![strict_limit.clone(), standard_limit.clone()]);

        strict = strict.route_layer(from_fn_with_state(
            strict_limit,
            middleware::rate_limit_middleware,
        ));
        public = public.route_layer(from_fn_with_state(
            standard_limit.clone(),
            middleware::rate_limit_middleware,
        ));
        protected = protected.route_layer(from_fn_with_state(
            standard_limit,
            middleware::rate_limit_middleware,
        ));
    } else {
        info!("Rate limiting disabled by configuration");
    }

    public
        .merge(strict)
        .merge(protected)
        .layer(from_fn_with_state(
            state.clone(),
            middleware::clear_session_middleware,
        ))
        .layer(from_fn(middleware::api_cache_control_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build the complete application: `/api`, `/healthz`, optional static
/// front-end and the global middleware stack
///
/// Must be called inside a Tokio runtime when rate limiting is enabled.
pub fn build_router(state: AppState) -> Router {
    let config = state.config.clone();

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let mut router = Router::new()
        .route("/healthz", get(health::healthz))
        .nest("/api", routes(&state))
        .with_state(state);

    match config.server.static_dir.as_ref() {
        Some(dir) if dir.is_dir() => {
            info!("Serving front-end from {:?}", dir);
            let index = dir.join("index.html");
            router = if index.is_file() {
                router.fallback_service(ServeDir::new(dir).not_found_service(ServeFile::new(index)))
            } else {
                router.fallback_service(ServeDir::new(dir))
            };
        }
        Some(dir) => warn!("Static directory {:?} does not exist, front-end not served", dir),
        None => info!("No static directory configured, front-end not served"),
    }

    if config.server.tls.is_some() {
        router = router.layer(from_fn(middleware::hsts_middleware));
    }

    if !config.server.cors_origins.is_empty() {
        router = router.layer(cors_layer(&config.server.cors_origins));
    }

    // Global layers, innermost first
    router
        .layer(from_fn(middleware::security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(trace_layer)
}
