//! Error types and handling
//!
//! Every handler error is converted into the `{ ok: false, error, message, details? }`
//! JSON body. Server-side failures are logged in full and answered with a
//! generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::services::session::SessionError;

/// Message returned to clients for any 500
pub const GENERIC_SERVER_ERROR: &str = "internal server error";

/// Response extension set on every 401; the session layer turns it into a
/// removal cookie
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSession;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// Authentication missing or rejected (401); the session cookie is cleared
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not permitted (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request, optionally naming the offending fields (400)
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        fields: Vec<String>,
    },

    /// Resource already exists or state conflict (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Too many requests (429)
    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        AppError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        AppError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn invalid_fields(message: impl Into<String>, fields: Vec<String>) -> Self {
        AppError::InvalidInput {
            message: message.into(),
            fields,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AppError::Internal(message.into())
    }

    /// HTTP status and stable error type identifier
    pub fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::InvalidInput { .. } => (StatusCode::BAD_REQUEST, "invalid_input"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::TooManyRequests(_) => (StatusCode::TOO_MANY_REQUESTS, "too_many_requests"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
        }
    }

    /// Message safe to show to a client
    fn client_message(&self) -> String {
        match self {
            AppError::Unauthorized(m)
            | AppError::Forbidden(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::TooManyRequests(m) => m.clone(),
            AppError::InvalidInput { message, .. } => message.clone(),
            AppError::Internal(_) | AppError::Database(_) => GENERIC_SERVER_ERROR.to_string(),
        }
    }
}

/// Error response body
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub ok: bool,
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();

        if status.is_server_error() {
            error!(error = %self, error_type = error_type, "Request failed");
        }

        let mut body = ErrorResponse::new(error_type, self.client_message());
        if let AppError::InvalidInput { fields, .. } = &self {
            if !fields.is_empty() {
                body = body.with_details(serde_json::json!({ "fields": fields }));
            }
        }

        let mut response = (status, Json(body)).into_response();
        if matches!(self, AppError::Unauthorized(_)) {
            response.extensions_mut().insert(ClearSession);
        }
        response
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{:#}", err))
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Signing(e) => AppError::Internal(format!("failed to sign token: {}", e)),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.message().contains("UNIQUE constraint failed") {
                    AppError::Conflict("Resource already exists".to_string())
                } else {
                    AppError::Database(db_err.to_string())
                }
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = err.field_errors().keys().map(|k| k.to_string()).collect();
        fields.sort();
        AppError::InvalidInput {
            message: "validation failed".to_string(),
            fields,
        }
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
