//! Authentication and session integration tests

use axum::{
    body::Body,
    http::{header, Request},
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use tretize_portal::{models::UserRole, services::session::SessionIdentity};

use crate::common::{test_config, TestApp, WORKER_PASSWORD};

#[tokio::test]
async fn test_login_sets_session_cookie() {
    let app = TestApp::new().await;
    app.seed_worker(UserRole::Ops).await;

    let response = app
        .post_json(
            "/api/auth/login",
            json!({"email": " OPS@Tretize.test ", "password": WORKER_PASSWORD}),
        )
        .await;
    response.assert_ok();

    let json: Value = response.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["role"], "ops");
    assert_eq!(json["email"], "ops@tretize.test");
    assert_eq!(json["forcePasswordChange"], true);

    let token = json["token"].as_str().unwrap();
    let cookie = response.session_cookie().expect("session cookie set");
    assert!(cookie.starts_with(&format!("jwt={};", token)));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));

    app.get_as("/api/auth/me", token).await.assert_ok();
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = TestApp::new().await;
    app.seed_worker(UserRole::Ops).await;

    let response = app
        .post_json(
            "/api/auth/login",
            json!({"email": "ops@tretize.test", "password": "wrong-password"}),
        )
        .await;
    response.assert_unauthorized();
    let json: Value = response.json();
    assert_eq!(json["ok"], false);
    assert_eq!(json["message"], "invalid credentials");

    let response = app
        .post_json(
            "/api/auth/login",
            json!({"email": "nobody@tretize.test", "password": WORKER_PASSWORD}),
        )
        .await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn test_login_requires_both_fields() {
    let app = TestApp::new().await;

    let response = app.post_json("/api/auth/login", json!({})).await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert_eq!(json["details"]["fields"], json!(["email", "password"]));
}

#[tokio::test]
async fn test_session_cookie_authenticates() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let response = app.get_with_cookie("/api/auth/me", &ops.token).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["data"]["email"], "ops@tretize.test");
    assert!(json["data"].get("passwordHash").is_none());
}

#[tokio::test]
async fn test_bearer_header_wins_over_cookie() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let request = Request::builder()
        .uri("/api/auth/me")
        .header(header::AUTHORIZATION, format!("Bearer {}", ops.token))
        .header(header::COOKIE, "jwt=garbage")
        .body(Body::empty())
        .unwrap();
    app.request(request).await.assert_ok();
}

#[tokio::test]
async fn test_expired_session_is_cleared() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let sessions = &app.state.sessions;
    let issued = Utc::now() - sessions.ttl() - Duration::minutes(1);
    let token = sessions
        .issue_at(&SessionIdentity::from(&ops.user), issued)
        .unwrap();

    let response = app.get_as("/api/auth/me", &token).await;
    response.assert_unauthorized();
    assert!(response.clears_session());
}

#[tokio::test]
async fn test_session_renewed_near_expiry() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let sessions = &app.state.sessions;
    let issued = Utc::now() - (sessions.ttl() - Duration::minutes(5));
    let token = sessions
        .issue_at(&SessionIdentity::from(&ops.user), issued)
        .unwrap();

    let response = app.get_as("/api/auth/me", &token).await;
    response.assert_ok();
    let cookie = response.session_cookie().expect("renewed cookie");
    assert!(!response.clears_session());
    assert!(!cookie.starts_with(&format!("jwt={};", token)));

    // A fresh session is left alone
    let response = app.get_as("/api/auth/me", &ops.token).await;
    response.assert_ok();
    assert!(response.session_cookie().is_none());
}

#[tokio::test]
async fn test_change_password_clears_force_flag() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let response = app
        .post_json_as(
            "/api/auth/change-password",
            json!({"newPassword": "short"}),
            &ops.token,
        )
        .await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert_eq!(json["details"]["fields"], json!(["newPassword"]));

    let response = app
        .post_json_as(
            "/api/auth/change-password",
            json!({"newPassword": "a-much-longer-secret", "displayName": "Olu"}),
            &ops.token,
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["forcePasswordChange"], false);
    assert_eq!(json["displayName"], "Olu");
    assert!(response.session_cookie().is_some());

    app.post_json(
        "/api/auth/login",
        json!({"email": "ops@tretize.test", "password": WORKER_PASSWORD}),
    )
    .await
    .assert_unauthorized();
    app.post_json(
        "/api/auth/login",
        json!({"email": "ops@tretize.test", "password": "a-much-longer-secret"}),
    )
    .await
    .assert_ok();
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let app = TestApp::new().await;

    let response = app.post_json("/api/auth/logout", json!({})).await;
    response.assert_ok();
    assert!(response.clears_session());
    let json: Value = response.json();
    assert_eq!(json["message"], "logged out");
}

#[tokio::test]
async fn test_secure_cookies_on_every_clear() {
    let mut config = test_config();
    config.auth.secure_cookies = true;
    let app = TestApp::with_config(config).await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let response = app.get("/api/track").await;
    response.assert_unauthorized();
    assert!(response.clears_session());
    let rejected = response.session_cookie().unwrap();
    assert!(rejected.contains("Secure"), "{}", rejected);

    let response = app.post_json("/api/auth/logout", json!({})).await;
    assert!(response.clears_session());
    let logged_out = response.session_cookie().unwrap();
    assert!(logged_out.contains("Secure"), "{}", logged_out);

    let response = app
        .post_json(
            "/api/auth/login",
            json!({"email": ops.user.email, "password": WORKER_PASSWORD}),
        )
        .await;
    response.assert_ok();
    let issued = response.session_cookie().unwrap();
    assert!(issued.contains("Secure"), "{}", issued);
    assert!(issued.contains("HttpOnly"), "{}", issued);
}
