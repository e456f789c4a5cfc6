//! Test application setup utilities
//!
//! Provides utilities for setting up test instances of the application
//! on a throwaway SQLite file with a recording mailer.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use tower::ServiceExt;
use uuid::Uuid;

use tretize_portal::{
    api,
    config::{AppConfig, DatabaseConfig, MailConfig, RateLimitSettings},
    db,
    services::Mailer,
    AppState,
};

use super::mocks::RecordingMailer;

pub const MAIN_INBOX: &str = "office@tretize.test";
pub const WORKERS_INBOX: &str = "crew@tretize.test";

/// Test application wrapper for integration testing
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub mailer: RecordingMailer,
}

impl TestApp {
    /// Create a new test application with a fresh database
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    /// Create a new test application with custom configuration
    pub async fn with_config(config: AppConfig) -> Self {
        let mailer = RecordingMailer::new();
        Self::build(config, Arc::new(mailer.clone()), mailer).await
    }

    /// Create a test application whose outbound mail goes to `mailer`
    pub async fn with_mailer(mailer: Arc<dyn Mailer>) -> Self {
        Self::build(test_config(), mailer, RecordingMailer::new()).await
    }

    async fn build(config: AppConfig, outbound: Arc<dyn Mailer>, mailer: RecordingMailer) -> Self {
        let db = db::init_pool(&config.database)
            .await
            .expect("Failed to initialize test database");

        let state = AppState::new(config, db, outbound).expect("Failed to build application state");
        let router = api::build_router(state.clone());

        Self {
            router,
            state,
            mailer,
        }
    }

    /// Make a GET request to the test application
    pub async fn get(&self, uri: &str) -> TestResponse {
        self.request(Self::builder("GET", uri).body(Body::empty()).unwrap())
            .await
    }

    /// Make an authenticated GET request
    pub async fn get_as(&self, uri: &str, token: &str) -> TestResponse {
        self.request_with_auth(Self::builder("GET", uri).body(Body::empty()).unwrap(), token)
            .await
    }

    /// Make a POST request with JSON body
    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        self.request(Self::json_request("POST", uri, body)).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json_as(&self, uri: &str, body: serde_json::Value, token: &str) -> TestResponse {
        self.request_with_auth(Self::json_request("POST", uri, body), token)
            .await
    }

    /// Make an authenticated PUT request with JSON body
    pub async fn put_json_as(&self, uri: &str, body: serde_json::Value, token: &str) -> TestResponse {
        self.request_with_auth(Self::json_request("PUT", uri, body), token)
            .await
    }

    /// GET carrying the session in the `jwt` cookie instead of a bearer header
    pub async fn get_with_cookie(&self, uri: &str, token: &str) -> TestResponse {
        let request = Self::builder("GET", uri)
            .header(header::COOKIE, format!("jwt={}", token))
            .body(Body::empty())
            .unwrap();
        self.request(request).await
    }

    /// Make a request with authentication
    pub async fn request_with_auth(&self, request: Request<Body>, token: &str) -> TestResponse {
        let (mut parts, body) = request.into_parts();
        parts.headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", token).parse().unwrap(),
        );
        self.request(Request::from_parts(parts, body)).await
    }

    /// Make an arbitrary request
    pub async fn request(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body");

        TestResponse {
            status,
            headers,
            body,
        }
    }

    fn builder(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Self::builder(method, uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Parse the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to parse response as JSON")
    }

    /// The `Set-Cookie` value for the session cookie, if any
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("jwt="))
            .map(str::to_string)
    }

    /// Whether the response deletes the session cookie
    pub fn clears_session(&self) -> bool {
        self.session_cookie()
            .map(|c| c.starts_with("jwt=;") && c.contains("Max-Age=0"))
            .unwrap_or(false)
    }

    /// Assert the response status
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {}, got {}. Body: {}",
            expected,
            self.status,
            self.text()
        );
        self
    }

    /// Assert the response status is OK (200)
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Assert the response status is Bad Request (400)
    pub fn assert_bad_request(&self) -> &Self {
        self.assert_status(StatusCode::BAD_REQUEST)
    }

    /// Assert the response status is Unauthorized (401)
    pub fn assert_unauthorized(&self) -> &Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    /// Assert the response status is Forbidden (403)
    pub fn assert_forbidden(&self) -> &Self {
        self.assert_status(StatusCode::FORBIDDEN)
    }

    /// Assert the response status is Not Found (404)
    pub fn assert_not_found(&self) -> &Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }
}

/// Create a test configuration with temporary SQLite database
pub fn test_config() -> AppConfig {
    // Use a unique temp file for each test to avoid conflicts
    let db_path = std::env::temp_dir().join(format!(
        "tretize_test_{}.db",
        Uuid::new_v4().simple()
    ));

    let mut config = AppConfig::default();
    config.database = DatabaseConfig {
        url: format!("sqlite://{}?mode=rwc", db_path.display()),
        max_connections: 4,
        min_connections: 1,
        connect_timeout_secs: 30,
        busy_timeout_secs: 5,
    };
    config.auth.jwt_secret = "test_secret_key_that_is_at_least_32_bytes_long".to_string();
    config.mail = MailConfig {
        main_inbox: Some(MAIN_INBOX.to_string()),
        workers_inbox: Some(WORKERS_INBOX.to_string()),
        ..MailConfig::default()
    };
    // Every test request comes from the same address
    config.rate_limit = RateLimitSettings {
        enabled: false,
        ..RateLimitSettings::default()
    };
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = TestApp::new().await;
        let response = app.get("/api/health").await;
        response.assert_ok();
        let json: serde_json::Value = response.json();
        assert_eq!(json["status"], "healthy");
    }
}
