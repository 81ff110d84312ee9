//! HTTP surface with both channels on their mock providers.

mod common;

use common::TestApp;
use reqwest::StatusCode;
use serde_json::{json, Value};

#[tokio::test]
async fn health_reports_active_providers() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "notification-service-test");
    assert_eq!(body["providers"]["email"], "mock");
    assert_eq!(body["providers"]["whatsapp"], "mock");
}

#[tokio::test]
async fn email_is_accepted_with_a_receipt() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/notifications/email",
            json!({
                "to": "bruce@wayne.test",
                "subject": "Invoice {{invoice_number}}",
                "body_text": "Hi {{name}}, {{total}} is due.",
                "variables": { "invoice_number": "INV-1000", "name": "Bruce", "total": "5800.00" },
            }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let receipt: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(receipt["channel"], "email");
    assert_eq!(receipt["provider"], "mock");
    assert_eq!(receipt["attempts"], 1);
    assert_eq!(receipt["replayed"], false);
    assert!(receipt["notification_id"].is_string());
}

#[tokio::test]
async fn email_needs_a_body_and_a_valid_address() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/notifications/email",
            json!({ "to": "bruce@wayne.test", "subject": "Empty" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            "/notifications/email",
            json!({ "to": "not-an-address", "subject": "Hi", "body_text": "x" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn repeated_idempotency_key_replays_the_receipt() {
    let app = TestApp::spawn().await;
    let body = json!({ "phone_number": "+1 555 0100", "text": "Payment received, thanks!" });

    let first = app
        .post_with_key("/notifications/whatsapp", "receipt-inv-1000", body.clone())
        .await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);
    let first: Value = first.json().await.expect("Failed to parse JSON");

    let second = app
        .post_with_key("/notifications/whatsapp", "receipt-inv-1000", body.clone())
        .await;
    assert_eq!(second.status(), StatusCode::ACCEPTED);
    let second: Value = second.json().await.expect("Failed to parse JSON");

    assert_eq!(first["notification_id"], second["notification_id"]);
    assert_eq!(first["replayed"], false);
    assert_eq!(second["replayed"], true);

    let third = app
        .post_with_key("/notifications/whatsapp", "receipt-inv-1001", body)
        .await;
    let third: Value = third.json().await.expect("Failed to parse JSON");
    assert_ne!(first["notification_id"], third["notification_id"]);
}

#[tokio::test]
async fn whatsapp_number_without_digits_is_a_bad_request() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/notifications/whatsapp",
            json!({ "phone_number": "unknown", "text": "Hello" }),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_endpoints_report_success_as_a_boolean() {
    let app = TestApp::spawn().await;

    // No body: falls back to EMAIL_TEST_RECIPIENT.
    let response = app
        .client
        .post(app.url("/notifications/email/test"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body, json!({ "success": true }));

    let response = app
        .post("/notifications/whatsapp/test", json!({ "to": "no digits here" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body, json!({ "success": false }));
}

#[tokio::test]
async fn test_endpoint_without_any_recipient_is_a_bad_request() {
    let mut config = notification_service::config::NotificationConfig::for_tests();
    config.whatsapp.test_number = None;
    let app = TestApp::spawn_with(config).await;

    let response = app
        .client
        .post(app.url("/notifications/whatsapp/test"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_expose_dispatch_counters() {
    let app = TestApp::spawn().await;
    app.post(
        "/notifications/email",
        json!({ "to": "bruce@wayne.test", "subject": "Hi", "body_text": "Hello" }),
    )
    .await;

    let response = app
        .client
        .get(app.url("/metrics"))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);
    let text = response.text().await.expect("Failed to read body");
    assert!(text.contains("notification_dispatch_attempts_total"));
    assert!(text.contains("notification_dispatch_outcomes_total"));
}
