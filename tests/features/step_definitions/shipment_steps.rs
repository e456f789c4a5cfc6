//! Shipment step definitions

use cucumber::{given, then, when};
use serde_json::{json, Value};

use crate::features::support::TestWorld;

#[given("a shipment exists")]
async fn shipment_exists(world: &mut TestWorld) {
    world.create_shipment().await;
}

#[when(expr = "I change {string} to {string}")]
async fn change_field(world: &mut TestWorld, field: String, value: String) {
    let uri = format!("/api/track/{}", world.tracking_id());
    let response = world
        .app()
        .put_json_as(&uri, json!({ field: value }), world.token())
        .await;
    world.last_response = Some(response);
}

#[when(expr = "I change {string} to {string} and {string} to {string}")]
async fn change_two_fields(
    world: &mut TestWorld,
    first: String,
    first_value: String,
    second: String,
    second_value: String,
) {
    let uri = format!("/api/track/{}", world.tracking_id());
    let response = world
        .app()
        .put_json_as(
            &uri,
            json!({ first: first_value, second: second_value }),
            world.token(),
        )
        .await;
    world.last_response = Some(response);
}

#[when(expr = "I post a {string} checkpoint at {string}")]
async fn post_checkpoint(world: &mut TestWorld, status: String, location: String) {
    let uri = format!("/api/track/{}/checkpoints", world.tracking_id());
    let response = world
        .app()
        .post_json_as(&uri, json!({"status": status, "location": location}), world.token())
        .await;
    world.last_response = Some(response);
}

#[when("a customer looks up the shipment")]
async fn customer_lookup(world: &mut TestWorld) {
    let uri = format!("/api/track/{}", world.tracking_id());
    let response = world.app().get(&uri).await;
    world.last_response = Some(response);
}

#[when("a customer asks for an update")]
async fn customer_nudge(world: &mut TestWorld) {
    let uri = format!("/api/track/{}/nudge", world.tracking_id());
    let response = world.app().post_json(&uri, json!({})).await;
    world.last_response = Some(response);
}

#[when("I list shipments")]
async fn list_shipments(world: &mut TestWorld) {
    let response = match world.auth_token.as_deref() {
        Some(token) => world.app().get_as("/api/track", token).await,
        None => world.app().get("/api/track").await,
    };
    world.last_response = Some(response);
}

#[then(expr = "only {string} is recorded as changed")]
async fn only_field_changed(world: &mut TestWorld, field: String) {
    let json = world.last_json();
    let changes = json["data"]["changes"].as_array().expect("changes array");
    let fields: Vec<&str> = changes.iter().filter_map(|c| c["field"].as_str()).collect();
    assert_eq!(fields, vec![field.as_str()]);
}

#[then(expr = "the audit trail has {int} update entry/entries")]
async fn audit_update_entries(world: &mut TestWorld, count: usize) {
    let uri = format!("/api/track/{}/audit", world.tracking_id());
    let json: Value = world.app().get_as(&uri, world.token()).await.json();
    let updates = json["data"]
        .as_array()
        .expect("audit entries")
        .iter()
        .filter(|e| e["kind"] == "tracking_update")
        .count();
    assert_eq!(updates, count);
}

#[then(expr = "the latest status is {string}")]
async fn latest_status(world: &mut TestWorld, status: String) {
    let json = world.last_json();
    let checkpoints = json["data"]["checkpoints"].as_array().expect("checkpoints");
    let last = checkpoints.last().expect("at least one checkpoint");
    assert_eq!(last["status"], status.as_str());
}

#[then(expr = "the nudge is refused with {string}")]
async fn nudge_refused(world: &mut TestWorld, reason: String) {
    let json = world.last_json();
    assert_eq!(json["ok"], false);
    assert_eq!(json["reason"], reason.as_str());
}
