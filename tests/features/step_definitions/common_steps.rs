//! Common step definitions used across features

use cucumber::{given, then};

use crate::common::TestApp;
use crate::features::support::TestWorld;

#[given("a fresh portal")]
async fn fresh_portal(world: &mut TestWorld) {
    world.app = Some(TestApp::new().await);
}

#[given(expr = "I am signed in as {string}")]
async fn signed_in_as(world: &mut TestWorld, role: String) {
    world.sign_in(&role).await;
}

#[given("I am not signed in")]
async fn not_signed_in(world: &mut TestWorld) {
    world.auth_token = None;
}

#[then(expr = "the response status should be {int}")]
async fn response_status(world: &mut TestWorld, status: u16) {
    if let Some(response) = &world.last_response {
        assert_eq!(response.status.as_u16(), status, "body: {}", response.text());
    } else {
        panic!("No response available");
    }
}

#[then("the response should contain an error")]
async fn response_contains_error(world: &mut TestWorld) {
    let json = world.last_json();
    assert_eq!(json["ok"], false);
    assert!(json.get("error").is_some());
}
