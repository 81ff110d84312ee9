//! Test helper module for notification-service integration tests.

#![allow(dead_code)]

use notification_service::config::NotificationConfig;
use notification_service::startup::Application;
use serde_json::Value;

pub struct TestApp {
    pub http_address: String,
    pub http_port: u16,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Both channels mocked.
    pub async fn spawn() -> Self {
        Self::spawn_with(NotificationConfig::for_tests()).await
    }

    pub async fn spawn_with(config: NotificationConfig) -> Self {
        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let http_port = app.http_port();
        let http_address = format!("http://127.0.0.1:{}", http_port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
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
            client,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.http_address, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn post_with_key(&self, path: &str, key: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header("Idempotency-Key", key)
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}

/// Test configuration with the email channel pointed at `api_url`.
pub fn with_mailjet(api_url: &str) -> NotificationConfig {
    let mut config = NotificationConfig::for_tests();
    config.email.enabled = true;
    config.email.api_url = api_url.to_string();
    config
}

/// Test configuration with the WhatsApp channel pointed at `api_url`.
pub fn with_whatsapp(api_url: &str) -> NotificationConfig {
    let mut config = NotificationConfig::for_tests();
    config.whatsapp.enabled = true;
    config.whatsapp.api_url = api_url.to_string();
    config
}
