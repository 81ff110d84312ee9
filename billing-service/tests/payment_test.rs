//! Manual payments against invoices.

mod common;

use common::{parse_uuid, TestApp, Tenant};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

async fn pending_payment(app: &TestApp, tenant: Tenant) -> (Uuid, Uuid) {
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let invoice = app.create_invoice(tenant, client_id, "5000", vat).await;
    let invoice_id = parse_uuid(&invoice["invoice_id"]);

    let response = app
        .post(
            tenant,
            "/payments",
            json!({
                "invoice_id": invoice_id,
                "amount": invoice["total_amount"],
                "method": "bank_transfer",
                "reference": "TX-42",
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let payment: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(payment["status"], "pending");

    (invoice_id, parse_uuid(&payment["payment_id"]))
}

#[tokio::test]
async fn completing_a_payment_marks_the_invoice_paid() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let (invoice_id, payment_id) = pending_payment(&app, tenant).await;

    let response = app
        .post(tenant, &format!("/payments/{}/complete", payment_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["already_completed"], false);
    assert_eq!(body["payment"]["status"], "completed");
    assert_eq!(body["invoice"]["status"], "paid");
    assert_eq!(body["invoice"]["payment_method"], "bank_transfer");

    let response = app.get(tenant, &format!("/invoices/{}", invoice_id)).await;
    let invoice: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(invoice["status"], "paid");
    assert!(invoice["paid_date"].is_string());
}

#[tokio::test]
async fn completing_twice_is_idempotent() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let (_, payment_id) = pending_payment(&app, tenant).await;
    let path = format!("/payments/{}/complete", payment_id);

    let first: Value = app
        .post(tenant, &path, json!({}))
        .await
        .json()
        .await
        .expect("Failed to parse JSON");
    let response = app.post(tenant, &path, json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let second: Value = response.json().await.expect("Failed to parse JSON");

    assert_eq!(second["already_completed"], true);
    assert_eq!(second["invoice"]["paid_date"], first["invoice"]["paid_date"]);
    assert_eq!(
        second["payment"]["completed_utc"],
        first["payment"]["completed_utc"]
    );
}

#[tokio::test]
async fn partial_payment_is_rejected() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let invoice = app.create_invoice(tenant, client_id, "5000", vat).await;

    let response = app
        .post(
            tenant,
            "/payments",
            json!({
                "invoice_id": invoice["invoice_id"],
                "amount": "1000.00",
                "method": "cash",
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_payment_cannot_be_completed() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let (invoice_id, payment_id) = pending_payment(&app, tenant).await;

    let response = app
        .post(tenant, &format!("/payments/{}/fail", payment_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(tenant, &format!("/payments/{}/complete", payment_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.get(tenant, &format!("/invoices/{}", invoice_id)).await;
    let invoice: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(invoice["status"], "pending");
}

#[tokio::test]
async fn paid_invoice_cannot_be_deleted_or_cancelled() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let (invoice_id, payment_id) = pending_payment(&app, tenant).await;
    app.post(tenant, &format!("/payments/{}/complete", payment_id), json!({}))
        .await;

    let response = app.delete(tenant, &format!("/invoices/{}", invoice_id)).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post(tenant, &format!("/invoices/{}/cancel", invoice_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn payments_of_other_companies_are_not_found() {
    let app = TestApp::spawn().await;
    let acme = app.signup("owner@acme.test").await;
    let globex = app.signup("owner@globex.test").await;
    let (_, payment_id) = pending_payment(&app, acme).await;

    let response = app
        .post(globex, &format!("/payments/{}/complete", payment_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn payment_for_an_outdated_total_cannot_complete() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let (invoice_id, payment_id) = pending_payment(&app, tenant).await;

    let response = app
        .put(
            tenant,
            &format!("/invoices/{}", invoice_id),
            json!({ "base_amount": "10000" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(tenant, &format!("/payments/{}/complete", payment_id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.get(tenant, &format!("/invoices/{}", invoice_id)).await;
    let invoice: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(invoice["status"], "pending");
    assert!(invoice["paid_date"].is_null());
}

#[tokio::test]
async fn zero_amount_payment_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;
    let client_id = app.create_client(tenant, "Wayne Enterprises").await;
    let vat = app.create_tax_rate(tenant, "VAT", "16").await;
    let invoice = app.create_invoice(tenant, client_id, "0", vat).await;

    let response = app
        .post(
            tenant,
            "/payments",
            json!({
                "invoice_id": invoice["invoice_id"],
                "amount": "0",
                "method": "cash",
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
