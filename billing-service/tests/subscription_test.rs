//! Subscriptions and per-subscription billing runs.

mod common;

use common::{d, dec, parse_uuid, TestApp, Tenant};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

async fn create_service(app: &TestApp, tenant: Tenant, cycle: &str, active: bool) -> Uuid {
    let response = app
        .post(
            tenant,
            "/services",
            json!({
                "name": format!("Hosting ({})", cycle),
                "price": "100.00",
                "billing_cycle": cycle,
                "active": active,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    parse_uuid(&body["service_id"])
}

async fn subscribe(app: &TestApp, tenant: Tenant, client_id: Uuid, service_id: Uuid) -> Value {
    let response = app
        .post(
            tenant,
            "/subscriptions",
            json!({
                "client_id": client_id,
                "service_id": service_id,
                "start_date": "2026-10-01",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse JSON")
}

#[tokio::test]
async fn next_billing_date_defaults_to_start_date() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let service_id = create_service(&app, tenant, "monthly", true).await;

    let subscription = subscribe(&app, tenant, client_id, service_id).await;

    assert_eq!(subscription["status"], "active");
    assert_eq!(subscription["next_billing_date"], "2026-10-01");
}

#[tokio::test]
async fn billing_raises_an_invoice_and_advances_the_cycle() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let service_id = create_service(&app, tenant, "quarterly", true).await;
    let subscription = subscribe(&app, tenant, client_id, service_id).await;
    let subscription_id = parse_uuid(&subscription["subscription_id"]);

    let response = app
        .post(
            tenant,
            &format!("/subscriptions/{}/invoice", subscription_id),
            json!({ "tax_rate_id": vat }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse JSON");

    assert_eq!(body["invoice"]["invoice_number"], "INV-1000");
    assert_eq!(body["invoice"]["subscription_id"], json!(subscription_id));
    assert_eq!(dec(&body["invoice"]["total_amount"]), d("116"));
    assert_eq!(body["subscription"]["next_billing_date"], "2027-01-01");
    assert_eq!(body["subscription"]["status"], "active");
}

#[tokio::test]
async fn one_time_service_expires_after_billing() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let service_id = create_service(&app, tenant, "one_time", true).await;
    let subscription = subscribe(&app, tenant, client_id, service_id).await;
    let path = format!(
        "/subscriptions/{}/invoice",
        subscription["subscription_id"].as_str().unwrap_or_default()
    );

    let response = app.post(tenant, &path, json!({ "tax_rate_id": vat })).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["subscription"]["status"], "expired");
    assert!(body["subscription"]["next_billing_date"].is_null());

    let response = app.post(tenant, &path, json!({ "tax_rate_id": vat })).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn cancelled_subscription_cannot_be_billed() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let service_id = create_service(&app, tenant, "monthly", true).await;
    let subscription = subscribe(&app, tenant, client_id, service_id).await;
    let subscription_id = parse_uuid(&subscription["subscription_id"]);

    let response = app
        .post(
            tenant,
            &format!("/subscriptions/{}/cancel", subscription_id),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cancelled: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(cancelled["status"], "cancelled");
    assert!(cancelled["next_billing_date"].is_null());

    let response = app
        .post(
            tenant,
            &format!("/subscriptions/{}/invoice", subscription_id),
            json!({ "tax_rate_id": vat }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn inactive_service_cannot_be_subscribed_to() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let service_id = create_service(&app, tenant, "monthly", false).await;

    let response = app
        .post(
            tenant,
            "/subscriptions",
            json!({
                "client_id": client_id,
                "service_id": service_id,
                "start_date": "2026-10-01",
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn subscribed_service_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let service_id = create_service(&app, tenant, "monthly", true).await;
    subscribe(&app, tenant, client_id, service_id).await;

    let response = app
        .delete(tenant, &format!("/services/{}", service_id))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}
