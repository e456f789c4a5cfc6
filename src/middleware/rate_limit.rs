//! Rate limiting middleware
//!
//! IP-based rate limiting for the public surface. Uses a governor keyed rate
//! limiter: a strict quota for login, quote and nudge, a lenient one for
//! everything else.

use axum::{
    body::Body,
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use tracing::{debug, warn};

use crate::config::RateLimitSettings;
use crate::utils::AppError;

/// Keyed per-IP limiter with a per-minute quota
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    name: &'static str,
}

impl RateLimitState {
    pub fn new(name: &'static str, per_minute: u32, burst: u32) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN))
            .allow_burst(NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
            name,
        }
    }

    /// Limiter for login, quote and nudge
    pub fn strict(settings: &RateLimitSettings) -> Self {
        Self::new("strict", settings.strict_per_minute, settings.strict_burst)
    }

    /// Limiter for the rest of the API
    pub fn standard(settings: &RateLimitSettings) -> Self {
        Self::new("standard", settings.standard_per_minute, settings.standard_burst)
    }

    pub fn check(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Forget addresses whose quota has fully replenished
    pub fn cleanup(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        debug!(
            limiter = self.name,
            "Rate limiter cleanup: {} -> {} entries",
            before,
            self.limiter.len()
        );
    }
}

/// Peer address, or the first `X-Forwarded-For` hop when no peer info is attached
fn client_ip(connect_info: Option<&ConnectInfo<SocketAddr>>, headers: &HeaderMap) -> IpAddr {
    if let Some(ConnectInfo(addr)) = connect_info {
        return addr.ip();
    }

    headers
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Rate limiting middleware for Axum
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = client_ip(
        request.extensions().get::<ConnectInfo<SocketAddr>>(),
        request.headers(),
    );

    if rate_limit.check(ip) {
        next.run(request).await
    } else {
        warn!(ip = %ip, limiter = rate_limit.name, "Rate limit exceeded");
        let mut response =
            AppError::TooManyRequests("too many requests, please try again later".to_string())
                .into_response();
        response
            .headers_mut()
            .insert("retry-after", axum::http::HeaderValue::from_static("60"));
        response
    }
}

/// Spawn a background task to periodically clean up rate limiters
pub fn spawn_rate_limit_cleanup(states: Vec<RateLimitState>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600)); // Every hour
        loop {
            interval.tick().await;
            for state in &states {
                state.cleanup();
            }
        }
    });
}
