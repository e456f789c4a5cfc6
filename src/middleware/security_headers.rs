//! Security headers middleware
//!
//! Hardening headers on every response, and no-cache headers on API responses
//! so tracking data and session details never sit in shared caches.

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    (
        "permissions-policy",
        "camera=(), geolocation=(), microphone=(), payment=(), usb=()",
    ),
    (
        "content-security-policy",
        "default-src 'self'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; \
         img-src 'self' data: blob:; font-src 'self' data:; connect-src 'self'; \
         frame-ancestors 'self'; base-uri 'self'; form-action 'self'",
    ),
    ("cross-origin-opener-policy", "same-origin"),
];

const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("cache-control", "no-store, no-cache, must-revalidate, private"),
    ("pragma", "no-cache"),
    ("expires", "0"),
];

fn insert_all(response: &mut Response, headers: &[(&'static str, &'static str)]) {
    let target = response.headers_mut();
    for (name, value) in headers {
        target.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// Middleware that adds security headers to all responses
pub async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    insert_all(&mut response, &SECURITY_HEADERS);
    response
}

/// Strict-Transport-Security, only added when the server terminates TLS itself
pub async fn hsts_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    insert_all(
        &mut response,
        &[("strict-transport-security", "max-age=31536000; includeSubDomains")],
    );
    response
}

/// Middleware for API routes that adds cache control headers
pub async fn api_cache_control_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    insert_all(&mut response, &NO_CACHE_HEADERS);
    response
}
