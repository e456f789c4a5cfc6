//! Shipment API integration tests
//!
//! Creation, lookup, role-scoped edits, checkpoints, audit trail,
//! admin notes, nudges and the CSV export.

use chrono::{Duration, Utc};
use serde_json::{json, Value};

use tretize_portal::{models::UserRole, utils::validation::is_canonical_tracking_id};

use crate::common::{TestApp, WORKERS_INBOX};

#[tokio::test]
async fn test_create_then_public_lookup() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let id = app.create_shipment(&ops.token).await;
    assert!(is_canonical_tracking_id(&id), "unexpected id {}", id);

    let response = app.get(&format!("/api/track/{}", id)).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["data"]["trackingId"], id.as_str());
    assert_eq!(json["data"]["count"], 3);
    assert_eq!(json["data"]["shipmentType"], "standard");
    assert_eq!(json["data"]["stale"], false);

    let checkpoints = json["data"]["checkpoints"].as_array().unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0]["status"], "label");
    assert_eq!(checkpoints[0]["text"], "Label created");
}

#[tokio::test]
async fn test_lookup_ignores_case_and_whitespace() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app
        .get(&format!("/api/track/%20{}%20", id.to_lowercase()))
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["data"]["trackingId"], id.as_str());
}

#[tokio::test]
async fn test_lookup_unknown_id_is_not_found() {
    let app = TestApp::new().await;

    let response = app.get("/api/track/TRZ-20261016-ZZZZZZ").await;
    response.assert_not_found();
    let json: Value = response.json();
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"], "not_found");
}

#[tokio::test]
async fn test_aged_shipment_is_stale() {
    let app = TestApp::new().await;
    app.insert_aged_shipment("TRZ-20261013-OLD001", 48).await;

    let response = app.get("/api/track/TRZ-20261013-OLD001").await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["data"]["stale"], true);
}

#[tokio::test]
async fn test_finance_cannot_create() {
    let app = TestApp::new().await;
    let finance = app.seed_worker(UserRole::Finance).await;

    let response = app
        .post_json_as("/api/track", crate::common::sample_draft(), &finance.token)
        .await;
    response.assert_forbidden();
}

#[tokio::test]
async fn test_create_rejects_bad_count() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;

    let response = app
        .post_json_as("/api/track", json!({"origin": "Sofia", "count": 0}), &ops.token)
        .await;
    response.assert_bad_request();
}

#[tokio::test]
async fn test_worker_routes_require_session() {
    let app = TestApp::new().await;

    let response = app.get("/api/track").await;
    response.assert_unauthorized();
    assert!(response.clears_session());

    let response = app.get_as("/api/track", "not-a-token").await;
    response.assert_unauthorized();
}

#[tokio::test]
async fn test_ops_update_only_touches_permitted_fields() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app
        .put_json_as(
            &format!("/api/track/{}", id),
            json!({"driver": "Petar", "cargo": "Glass"}),
            &ops.token,
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();

    let changes = json["data"]["changes"].as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["field"], "driver");
    assert_eq!(changes[0]["before"], "Ivan");
    assert_eq!(changes[0]["after"], "Petar");
    assert_eq!(json["data"]["shipment"]["driver"], "Petar");
    assert_eq!(json["data"]["shipment"]["cargo"], "Ceramic tiles");

    let audit: Value = app
        .get_as(&format!("/api/track/{}/audit", id), &ops.token)
        .await
        .json();
    let entries = audit["data"].as_array().unwrap();
    assert_eq!(entries[0]["kind"], "tracking_update");
    assert_eq!(entries[0]["actor"]["email"], "ops@tretize.test");
    assert_eq!(entries[0]["changes"].as_array().unwrap().len(), 1);
    assert!(entries.iter().any(|e| e["kind"] == "tracking_create"));
}

#[tokio::test]
async fn test_unchanged_update_writes_no_audit() {
    let app = TestApp::new().await;
    let admin = app.seed_worker(UserRole::Admin).await;
    let id = app.create_shipment(&admin.token).await;

    let response = app
        .put_json_as(
            &format!("/api/track/{}", id),
            json!({"driver": "Ivan", "count": 3}),
            &admin.token,
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert!(json["data"]["changes"].as_array().unwrap().is_empty());

    let audit: Value = app
        .get_as(&format!("/api/track/{}/audit", id), &admin.token)
        .await
        .json();
    assert!(audit["data"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["kind"] != "tracking_update"));
}

/// Kinds of the audit entries recorded for `id`, newest first
async fn audit_kinds(app: &TestApp, id: &str, token: &str) -> Vec<String> {
    let audit: Value = app
        .get_as(&format!("/api/track/{}/audit", id), token)
        .await
        .json();
    audit["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|e| e["kind"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn test_repeated_update_is_recorded_once() {
    let app = TestApp::new().await;
    let admin = app.seed_worker(UserRole::Admin).await;
    let id = app.create_shipment(&admin.token).await;
    let uri = format!("/api/track/{}", id);
    let patch = json!({"driver": "Petar", "vehicle": "PB 7777 KK"});

    let json: Value = app.put_json_as(&uri, patch.clone(), &admin.token).await.json();
    assert_eq!(json["ok"], true);
    assert_eq!(json["data"]["changes"].as_array().unwrap().len(), 2);
    let updates = |kinds: &[String]| kinds.iter().filter(|k| *k == "tracking_update").count();
    assert_eq!(updates(&audit_kinds(&app, &id, &admin.token).await), 1);

    let json: Value = app.put_json_as(&uri, patch, &admin.token).await.json();
    assert_eq!(json["ok"], true);
    assert!(json["data"]["changes"].as_array().unwrap().is_empty());
    assert_eq!(json["data"]["shipment"]["driver"], "Petar");
    assert_eq!(updates(&audit_kinds(&app, &id, &admin.token).await), 1);
}

#[tokio::test]
async fn test_update_survives_audit_failure() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    sqlx::query(
        "CREATE TRIGGER audit_log_offline BEFORE INSERT ON audit_log \
         BEGIN SELECT RAISE(ABORT, 'audit store offline'); END",
    )
    .execute(&app.state.db)
    .await
    .unwrap();

    let response = app
        .put_json_as(&format!("/api/track/{}", id), json!({"driver": "Petar"}), &ops.token)
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["data"]["changes"][0]["field"], "driver");

    let json: Value = app.get(&format!("/api/track/{}", id)).await.json();
    assert_eq!(json["data"]["driver"], "Petar");
    assert!(!audit_kinds(&app, &id, &ops.token)
        .await
        .iter()
        .any(|k| k == "tracking_update"));
}

#[tokio::test]
async fn test_update_rejects_non_positive_count() {
    let app = TestApp::new().await;
    let admin = app.seed_worker(UserRole::Admin).await;
    let id = app.create_shipment(&admin.token).await;
    let uri = format!("/api/track/{}", id);

    for count in [json!(0), json!(-2), json!("0")] {
        let response = app.put_json_as(&uri, json!({ "count": count }), &admin.token).await;
        response.assert_bad_request();
        let json: Value = response.json();
        assert_eq!(json["details"]["fields"], json!(["count"]));
    }

    let json: Value = app.get(&uri).await.json();
    assert_eq!(json["data"]["count"], 3);
}

#[tokio::test]
async fn test_update_response_lists_checkpoints_by_time() {
    let app = TestApp::new().await;
    let admin = app.seed_worker(UserRole::Admin).await;
    let id = app.create_shipment(&admin.token).await;

    let backdated = (Utc::now() - Duration::hours(2)).to_rfc3339();
    app.post_json_as(
        &format!("/api/track/{}/checkpoints", id),
        json!({"status": "pickup", "note": "Collected at dawn", "at": backdated}),
        &admin.token,
    )
    .await
    .assert_ok();

    let response = app
        .put_json_as(&format!("/api/track/{}", id), json!({"driver": "Petar"}), &admin.token)
        .await;
    response.assert_ok();
    let json: Value = response.json();
    let checkpoints = json["data"]["shipment"]["checkpoints"].as_array().unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[0]["text"], "Collected at dawn");
    assert_eq!(checkpoints[1]["status"], "label");
}

#[tokio::test]
async fn test_driver_role_cannot_edit() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let driver = app.seed_worker(UserRole::Driver).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app
        .put_json_as(&format!("/api/track/{}", id), json!({"driver": "Me"}), &driver.token)
        .await;
    response.assert_forbidden();
}

#[tokio::test]
async fn test_update_unknown_shipment() {
    let app = TestApp::new().await;
    let admin = app.seed_worker(UserRole::Admin).await;

    let response = app
        .put_json_as("/api/track/TRZ-20261016-NOPE00", json!({"driver": "X"}), &admin.token)
        .await;
    response.assert_not_found();
}

#[tokio::test]
async fn test_append_checkpoint() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app
        .post_json_as(
            &format!("/api/track/{}/checkpoints", id),
            json!({"status": "transit", "note": "Left depot", "location": "Plovdiv"}),
            &ops.token,
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    let checkpoints = json["data"]["checkpoints"].as_array().unwrap();
    assert_eq!(checkpoints.len(), 2);
    assert_eq!(checkpoints[1]["status"], "transit");
    assert_eq!(checkpoints[1]["text"], "Left depot - Plovdiv");

    let listed: Value = app
        .get_as("/api/track?status=transit", &ops.token)
        .await
        .json();
    let rows = listed["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["trackingId"], id.as_str());
    assert_eq!(rows[0]["lastStatus"], "transit");
}

#[tokio::test]
async fn test_appends_never_rewrite_earlier_checkpoints() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;
    let uri = format!("/api/track/{}/checkpoints", id);

    let first: Value = app.get(&format!("/api/track/{}", id)).await.json();
    let mut previous = first["data"]["checkpoints"].as_array().unwrap().clone();

    for (status, note) in [("pickup", "Loaded"), ("transit", "On the road"), ("out", "Last mile")] {
        let json: Value = app
            .post_json_as(&uri, json!({"status": status, "note": note}), &ops.token)
            .await
            .json();
        let current = json["data"]["checkpoints"].as_array().unwrap().clone();
        assert_eq!(current.len(), previous.len() + 1);
        assert_eq!(&current[..previous.len()], &previous[..]);
        assert_eq!(current[previous.len()]["text"], note);
        previous = current;
    }
    assert_eq!(previous.len(), 4);
}

#[tokio::test]
async fn test_append_checkpoint_requires_status() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;
    let uri = format!("/api/track/{}/checkpoints", id);

    for body in [json!({}), json!({"note": "x"})] {
        let response = app.post_json_as(&uri, body, &ops.token).await;
        response.assert_bad_request();
        let json: Value = response.json();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"], "invalid_input");
        assert_eq!(json["message"], "invalid status");
    }

    let json: Value = app.get(&format!("/api/track/{}", id)).await.json();
    assert_eq!(json["data"]["checkpoints"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_append_checkpoint_rejects_unknown_status() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app
        .post_json_as(
            &format!("/api/track/{}/checkpoints", id),
            json!({"status": "lost"}),
            &ops.token,
        )
        .await;
    response.assert_bad_request();

    let json: Value = app.get(&format!("/api/track/{}", id)).await.json();
    assert_eq!(json["data"]["checkpoints"].as_array().unwrap().len(), 1);

    let response = app
        .post_json_as(
            "/api/track/TRZ-20261016-NOPE00/checkpoints",
            json!({"status": "pickup"}),
            &ops.token,
        )
        .await;
    response.assert_not_found();
}

#[tokio::test]
async fn test_list_search_and_invalid_status() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;
    app.insert_aged_shipment("TRZ-20261001-OTHER1", 300).await;

    let json: Value = app.get_as("/api/track?q=varna", &ops.token).await.json();
    assert_eq!(json["data"].as_array().unwrap().len(), 2);

    let json: Value = app
        .get_as(&format!("/api/track?q={}", &id[4..12]), &ops.token)
        .await
        .json();
    let rows = json["data"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["stale"], false);

    let json: Value = app.get_as("/api/track?q=%25", &ops.token).await.json();
    assert!(json["data"].as_array().unwrap().is_empty());

    let response = app.get_as("/api/track?status=lost", &ops.token).await;
    response.assert_bad_request();
    let json: Value = response.json();
    assert_eq!(json["details"]["fields"], json!(["status"]));
}

#[tokio::test]
async fn test_admin_note_permissions_and_mail() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let admin = app.seed_worker(UserRole::Admin).await;
    let id = app.create_shipment(&ops.token).await;
    let uri = format!("/api/track/{}/admin-note", id);

    let response = app
        .post_json_as(&uri, json!({"note": "Wrong weight"}), &ops.token)
        .await;
    response.assert_forbidden();

    let response = app.post_json_as(&uri, json!({"note": "  "}), &admin.token).await;
    response.assert_bad_request();

    let response = app
        .post_json_as(
            &uri,
            json!({"note": "Weight is 1100kg", "toEmail": "client@example.com"}),
            &admin.token,
        )
        .await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json["data"]["kind"], "admin_note");
    assert_eq!(json["data"]["note"], "Weight is 1100kg");

    let sent = app.mailer.wait_for(1).await;
    let mail = sent
        .iter()
        .find(|m| m.subject == format!("Correction on {}", id))
        .expect("correction mail sent");
    assert_eq!(mail.to, vec!["client@example.com"]);
    assert_eq!(mail.body, "Weight is 1100kg");
}

#[tokio::test]
async fn test_nudge_on_fresh_shipment_is_too_soon() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app.post_json(&format!("/api/track/{}/nudge", id), json!({})).await;
    response.assert_ok();
    let json: Value = response.json();
    assert_eq!(json, json!({"ok": false, "reason": "too_soon"}));
}

#[tokio::test]
async fn test_nudge_on_quiet_shipment_mails_workers_once() {
    let app = TestApp::new().await;
    app.insert_aged_shipment("TRZ-20261014-QUIET1", 30).await;
    let uri = "/api/track/TRZ-20261014-QUIET1/nudge";

    let json: Value = app.post_json(uri, json!({})).await.json();
    assert_eq!(json, json!({"ok": true}));

    let sent = app.mailer.wait_for(1).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, vec![WORKERS_INBOX]);
    assert_eq!(
        sent[0].subject,
        "Client ping on TRZ-20261014-QUIET1 - update requested"
    );
    assert!(sent[0].body.contains("Route: Sofia -> Varna"));

    let json: Value = app.post_json(uri, json!({})).await.json();
    assert_eq!(json, json!({"ok": false, "reason": "recent_ping"}));

    let response = app
        .post_json("/api/track/TRZ-20261014-MISSIN/nudge", json!({}))
        .await;
    response.assert_not_found();
}

#[tokio::test]
async fn test_csv_export() {
    let app = TestApp::new().await;
    let ops = app.seed_worker(UserRole::Ops).await;
    let id = app.create_shipment(&ops.token).await;

    let response = app.get_as("/api/track/export", &ops.token).await;
    response.assert_ok();
    assert!(response.headers["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    assert!(response.headers["content-disposition"]
        .to_str()
        .unwrap()
        .contains("attachment"));

    let text = response.text();
    let mut lines = text.lines();
    assert!(lines.next().unwrap().starts_with("trackingId,"));
    let row = lines.next().unwrap();
    assert!(row.starts_with(&id));
    assert!(row.contains("Ceramic tiles"));
    assert!(lines.next().is_none());
}
