//! Automation flow definitions.

mod common;

use common::{parse_uuid, TestApp};
use reqwest::StatusCode;
use serde_json::{json, Value};

fn reminder_steps() -> Value {
    json!([
        { "type": "trigger", "event": "invoice_overdue" },
        { "type": "condition", "field": "total_amount", "operator": "greater_than", "value": 100 },
        { "type": "delay", "minutes": 60 },
        { "type": "action", "channel": "email", "template": "Invoice {{invoice_number}} is overdue" },
    ])
}

#[tokio::test]
async fn flow_round_trips_its_steps() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .post(
            tenant,
            "/flows",
            json!({ "name": "Overdue reminder", "active": true, "steps": reminder_steps() }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let flow: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(flow["steps"], reminder_steps());
    let flow_id = parse_uuid(&flow["flow_id"]);

    let response = app
        .put(
            tenant,
            &format!("/flows/{}", flow_id),
            json!({ "active": false }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(updated["active"], false);
    assert_eq!(updated["steps"], reminder_steps());

    let response = app.get(tenant, "/flows").await;
    let flows: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(flows.as_array().map(Vec::len), Some(1));

    let response = app.delete(tenant, &format!("/flows/{}", flow_id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get(tenant, &format!("/flows/{}", flow_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn flow_must_start_with_a_trigger() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .post(
            tenant,
            "/flows",
            json!({
                "name": "Broken",
                "steps": [
                    { "type": "action", "channel": "whatsapp", "template": "Hi" },
                ],
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_step_type_is_unprocessable() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .post(
            tenant,
            "/flows",
            json!({
                "name": "Broken",
                "steps": [{ "type": "teleport", "destination": "mars" }],
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn flows_of_other_companies_are_not_found() {
    let app = TestApp::spawn().await;
    let acme = app.signup("owner@acme.test").await;
    let globex = app.signup("owner@globex.test").await;

    let response = app
        .post(
            acme,
            "/flows",
            json!({ "name": "Overdue reminder", "steps": reminder_steps() }),
        )
        .await;
    let flow: Value = response.json().await.expect("Failed to parse JSON");

    let response = app
        .get(
            globex,
            &format!("/flows/{}", flow["flow_id"].as_str().unwrap_or_default()),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
