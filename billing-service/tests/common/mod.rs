//! Test helper module for billing-service integration tests.
//!
//! Every `TestApp` runs on a random port over its own in-memory store.

#![allow(dead_code)]

use billing_service::config::BillingConfig;
use billing_service::services::{BillingStore, MemoryStore};
use billing_service::startup::Application;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A signed-up company and its owner, used as the caller in requests.
#[derive(Debug, Clone, Copy)]
pub struct Tenant {
    pub company_id: Uuid,
    pub user_id: Uuid,
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub store: Arc<dyn BillingStore>,
    pub client: Client,
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        Self::spawn_with(BillingConfig::for_tests()).await
    }

    pub async fn spawn_with(config: BillingConfig) -> Self {
        let store: Arc<dyn BillingStore> = Arc::new(MemoryStore::new());
        let app = Application::build_with_store(config, store.clone())
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        let client = Client::new();
        let health_url = format!("{}/health", http_address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            http_address,
            http_port,
            store,
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    /// Attach the company context headers for `tenant` acting as `role`.
    pub fn as_role(&self, builder: RequestBuilder, tenant: Tenant, role: &str) -> RequestBuilder {
        builder
            .header("X-Company-ID", tenant.company_id.to_string())
            .header("X-User-ID", tenant.user_id.to_string())
            .header("X-User-Role", role)
    }

    pub async fn get(&self, tenant: Tenant, path: &str) -> Response {
        self.as_role(self.client.get(self.url(path)), tenant, "owner")
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post(&self, tenant: Tenant, path: &str, body: Value) -> Response {
        self.as_role(self.client.post(self.url(path)), tenant, "owner")
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn put(&self, tenant: Tenant, path: &str, body: Value) -> Response {
        self.as_role(self.client.put(self.url(path)), tenant, "owner")
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn delete(&self, tenant: Tenant, path: &str) -> Response {
        self.as_role(self.client.delete(self.url(path)), tenant, "owner")
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Sign up a company and return its owner as the calling tenant.
    pub async fn signup(&self, email: &str) -> Tenant {
        let response = self
            .client
            .post(self.url("/signup"))
            .json(&json!({
                "company_name": format!("Company of {}", email),
                "email": email,
                "full_name": "Test Owner",
                "plan": "starter",
                "monthly_payment": "29.00",
            }))
            .send()
            .await
            .expect("Failed to execute request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: Value = response.json().await.expect("Failed to parse JSON");
        Tenant {
            company_id: parse_uuid(&body["company"]["company_id"]),
            user_id: parse_uuid(&body["owner"]["user_id"]),
        }
    }

    pub async fn create_client(&self, tenant: Tenant, name: &str) -> Uuid {
        let response = self
            .post(tenant, "/clients", json!({ "name": name }))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        parse_uuid(&body["client_id"])
    }

    pub async fn create_tax_rate(&self, tenant: Tenant, name: &str, rate: &str) -> Uuid {
        let response = self
            .post(
                tenant,
                "/tax-rates",
                json!({ "name": name, "rate": rate, "effective_from": "2020-01-01" }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = response.json().await.expect("Failed to parse JSON");
        parse_uuid(&body["tax_rate_id"])
    }

    /// Create a pending invoice and return its JSON body.
    pub async fn create_invoice(
        &self,
        tenant: Tenant,
        client_id: Uuid,
        base_amount: &str,
        tax_rate_id: Uuid,
    ) -> Value {
        let response = self
            .post(
                tenant,
                "/invoices",
                json!({
                    "client_id": client_id,
                    "base_amount": base_amount,
                    "tax_rate_id": tax_rate_id,
                    "issue_date": "2026-10-01",
                    "due_date": "2099-10-31",
                }),
            )
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        response.json().await.expect("Failed to parse JSON")
    }
}

pub fn parse_uuid(value: &Value) -> Uuid {
    Uuid::parse_str(value.as_str().expect("expected a string id")).expect("expected a uuid")
}

/// Decimal fields are serialized as strings.
pub fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).expect("expected a decimal string"),
        Value::Number(n) => Decimal::from_str(&n.to_string()).expect("expected a decimal"),
        other => panic!("expected a decimal, got {other}"),
    }
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).expect("invalid decimal literal")
}
