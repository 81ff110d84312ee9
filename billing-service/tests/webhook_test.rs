//! Payment-gateway webhook.

mod common;

use billing_service::config::BillingConfig;
use billing_service::services::gateway::{compute_signature, SIGNATURE_HEADER};
use common::{TestApp, Tenant};
use reqwest::StatusCode;
use secrecy::Secret;
use serde_json::{json, Value};

const WEBHOOK: &str = "/webhooks/payment-gateway";

async fn plan_payment(app: &TestApp, tenant: Tenant) -> String {
    let response = app
        .post(
            tenant,
            "/company/gateway-payments",
            json!({ "amount": "29.00", "currency": "usd" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["currency"], "USD");
    assert_eq!(body["status"], "pending");
    body["order_id"].as_str().unwrap_or_default().to_string()
}

async fn deliver(app: &TestApp, body: String) -> reqwest::Response {
    app.client
        .post(app.url(WEBHOOK))
        .header("content-type", "application/json")
        .body(body)
        .send()
        .await
        .expect("Failed to execute request")
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::spawn().await;

    let response = deliver(
        &app,
        json!({ "order": { "id": "X" }, "result": "SUCCESS" }).to_string(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "Payment record not found");
}

#[tokio::test]
async fn missing_order_id_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = deliver(&app, json!({ "result": "SUCCESS" }).to_string()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = deliver(&app, "not json".to_string()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn preflight_is_answered_and_other_methods_are_refused() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .request(reqwest::Method::OPTIONS, app.url(WEBHOOK))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key("access-control-allow-methods"));

    let response = app
        .client
        .get(app.url(WEBHOOK))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn successful_payment_activates_the_company() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let order_id = plan_payment(&app, tenant).await;

    let response = deliver(
        &app,
        json!({
            "order": { "id": order_id, "amount": 29.0, "currency": "USD" },
            "transaction": [{ "id": "txn_1" }],
            "result": "SUCCESS",
        })
        .to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["company_activated"], true);

    let response = app.get(tenant, "/company").await;
    let company: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(company["status"], "active");
    assert!(company["trial_ends_utc"].is_null());

    let response = app.get(tenant, "/company/gateway-payments").await;
    let payments: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(payments[0]["gateway_payload"]["transaction"][0]["id"], "txn_1");
}

#[tokio::test]
async fn failed_payment_leaves_the_trial_running() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let order_id = plan_payment(&app, tenant).await;

    let response = deliver(
        &app,
        json!({ "order": { "id": order_id }, "result": "FAILURE" }).to_string(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "failed");
    assert_eq!(body["company_activated"], false);

    let response = app.get(tenant, "/company").await;
    let company: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(company["status"], "trial");
    assert!(company["trial_ends_utc"].is_string());
}

#[tokio::test]
async fn repeated_callback_does_not_change_a_settled_payment() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let order_id = plan_payment(&app, tenant).await;

    deliver(
        &app,
        json!({ "order": { "id": order_id }, "result": "SUCCESS" }).to_string(),
    )
    .await;
    let response = deliver(
        &app,
        json!({ "order": { "id": order_id }, "result": "FAILURE" }).to_string(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn signature_is_enforced_when_a_secret_is_configured() {
    let mut config = BillingConfig::for_tests();
    config.gateway.webhook_secret = Some(Secret::new("whsec_test".to_string()));
    let app = TestApp::spawn_with(config).await;
    let tenant = app.signup("owner@acme.test").await;
    let order_id = plan_payment(&app, tenant).await;

    let payload = json!({ "order": { "id": order_id }, "result": "SUCCESS" }).to_string();

    let response = deliver(&app, payload.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .client
        .post(app.url(WEBHOOK))
        .header(SIGNATURE_HEADER, "deadbeef")
        .body(payload.clone())
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let signature = compute_signature("whsec_test", payload.as_bytes())
        .expect("Failed to sign payload");
    let response = app
        .client
        .post(app.url(WEBHOOK))
        .header(SIGNATURE_HEADER, signature)
        .body(payload)
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
}
