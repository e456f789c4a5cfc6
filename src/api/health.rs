//! Health check endpoints
//!
//! Liveness for load balancers, readiness that actually touches the database.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::{db::migrations, AppState};

/// Basic health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub status: String,
    pub version: String,
}

/// Readiness response with the database state
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub ok: bool,
    pub database: ComponentStatus,
}

/// Status of a single component
#[derive(Serialize)]
pub struct ComponentStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            message: None,
        }
    }

    fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            message: Some(message.into()),
        }
    }
}

/// Simple health check endpoint (for load balancers)
///
/// Returns 200 OK if the service is running.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Plain-text probe mounted at the server root
pub async fn healthz() -> &'static str {
    "ok"
}

/// Readiness probe
///
/// 200 when the database answers and every required table exists, 503 otherwise.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match migrations::ping(&state.db).await {
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "Database ping failed");
            ComponentStatus::unhealthy("database unreachable")
        }
        Ok(()) => match migrations::missing_tables(&state.db).await {
            Ok(missing) if missing.is_empty() => ComponentStatus::healthy(),
            Ok(missing) => ComponentStatus::unhealthy(format!("missing tables: {}", missing.join(", "))),
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "Schema check failed");
                ComponentStatus::unhealthy("schema check failed")
            }
        },
    };

    let ok = database.status == "healthy";
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(ReadinessResponse { ok, database }))
}
