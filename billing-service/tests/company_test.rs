//! Company profile, status lifecycle, users and settings.

mod common;

use billing_service::models::CreateCompany;
use billing_service::services::BillingStore;
use common::{parse_uuid, TestApp, Tenant};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde_json::{json, Value};

#[tokio::test]
async fn signup_starts_a_trial_with_default_settings() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app.get(tenant, "/company").await;
    assert_eq!(response.status(), StatusCode::OK);
    let company: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(company["status"], "trial");
    assert!(company["trial_ends_utc"].is_string());

    let response = app.get(tenant, "/settings").await;
    assert_eq!(response.status(), StatusCode::OK);
    let settings: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(settings["reminder_days_before_due"], 3);
    assert_eq!(settings["email_enabled"], false);
}

#[tokio::test]
async fn missing_settings_row_is_not_found() {
    let app = TestApp::spawn().await;
    let company = app
        .store
        .create_company(&CreateCompany {
            name: "Bare Co".to_string(),
            email: "bare@bare.test".to_string(),
            phone: None,
            address: None,
            plan: "starter".to_string(),
            monthly_payment: Decimal::ZERO,
            trial_ends_utc: None,
        })
        .await
        .expect("Failed to create company");
    let tenant = Tenant {
        company_id: company.company_id,
        user_id: uuid::Uuid::new_v4(),
    };

    let response = app.get(tenant, "/settings").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["error"], "settings not found");
}

#[tokio::test]
async fn settings_are_upserted() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .put(
            tenant,
            "/settings",
            json!({
                "sender_name": "Acme Billing",
                "sender_email": "billing@acme.test",
                "email_enabled": true,
                "reminder_days_before_due": 7,
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(tenant, "/settings").await;
    let settings: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(settings["sender_name"], "Acme Billing");
    assert_eq!(settings["email_enabled"], true);
    assert_eq!(settings["reminder_days_before_due"], 7);
}

#[tokio::test]
async fn status_transitions_follow_the_lifecycle() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .post(tenant, "/company/status", json!({ "status": "active" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let company: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(company["status"], "active");

    // Re-applying the current status is accepted.
    let response = app
        .post(tenant, "/company/status", json!({ "status": "active" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(tenant, "/company/status", json!({ "status": "trial" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .post(tenant, "/company/status", json!({ "status": "cancelled" }))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .post(tenant, "/company/status", json!({ "status": "active" }))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn owners_manage_users_but_cannot_remove_themselves() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .post(
            tenant,
            "/users",
            json!({ "email": "staff@acme.test", "full_name": "Staff", "role": "staff" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let staff: Value = response.json().await.expect("Failed to parse JSON");
    let staff_id = parse_uuid(&staff["user_id"]);

    let response = app.get(tenant, "/users").await;
    let users: Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(users.as_array().map(Vec::len), Some(2));

    let response = app
        .delete(tenant, &format!("/users/{}", tenant.user_id))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app.delete(tenant, &format!("/users/{}", staff_id)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn admins_cannot_create_owners() {
    let app = TestApp::spawn().await;
    let tenant = app.signup("owner@acme.test").await;

    let response = app
        .as_role(app.client.post(app.url("/users")), tenant, "admin")
        .json(&json!({ "email": "boss@acme.test", "full_name": "Boss", "role": "owner" }))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
