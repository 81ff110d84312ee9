use super::{MessagingProvider, ProviderError, ProviderResponse, WhatsAppMessage};
use crate::config::WhatsAppConfig;
use async_trait::async_trait;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "messageId")]
    id: Option<String>,
}

/// Strip everything but ASCII digits; the gateway wants bare international numbers.
pub fn digits_only(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// WhatsApp messages over a bearer-token HTTP gateway.
pub struct WhatsAppProvider {
    config: WhatsAppConfig,
    client: Client,
}

impl WhatsAppProvider {
    pub fn new(config: WhatsAppConfig, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl MessagingProvider for WhatsAppProvider {
    #[tracing::instrument(skip(self, message), fields(provider = "whatsapp"))]
    async fn send(&self, message: &WhatsAppMessage) -> Result<ProviderResponse, ProviderError> {
        let phone = digits_only(&message.phone_number);
        if phone.is_empty() {
            return Err(ProviderError::InvalidRecipient(format!(
                "Phone number has no digits: {}",
                message.phone_number
            )));
        }

        let url = format!(
            "{}/sendMessage?phonenumber={}&text={}",
            self.config.api_url.trim_end_matches('/'),
            phone,
            urlencoding::encode(&message.text)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.config.api_key.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "WhatsApp gateway returned an error status");
            return Err(ProviderError::http(status.as_u16(), &body));
        }

        let parsed: GatewayResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::Rejected(format!("Unreadable WhatsApp gateway response: {}", e))
        })?;

        if !parsed.success {
            return Err(ProviderError::Rejected(
                parsed
                    .message
                    .unwrap_or_else(|| "WhatsApp gateway reported failure".to_string()),
            ));
        }

        tracing::info!(provider_id = ?parsed.id, "Message accepted by WhatsApp gateway");

        Ok(ProviderResponse::success("whatsapp", parsed.id))
    }

    fn name(&self) -> &'static str {
        "whatsapp"
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }
}

/// Stand-in used while the WhatsApp channel is disabled.
#[derive(Default)]
pub struct MockMessagingProvider {
    send_count: AtomicU64,
}

impl MockMessagingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_count(&self) -> u64 {
        self.send_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessagingProvider for MockMessagingProvider {
    async fn send(&self, message: &WhatsAppMessage) -> Result<ProviderResponse, ProviderError> {
        if digits_only(&message.phone_number).is_empty() {
            return Err(ProviderError::InvalidRecipient(format!(
                "Phone number has no digits: {}",
                message.phone_number
            )));
        }

        let count = self.send_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            to = %message.phone_number,
            "[MOCK] WhatsApp message would be sent"
        );

        Ok(ProviderResponse::success(
            "mock",
            Some(format!("mock-whatsapp-{}", count)),
        ))
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> WhatsAppProvider {
        let config = WhatsAppConfig {
            api_url: server.uri(),
            api_key: Secret::new("wa-token".to_string()),
            test_number: None,
            enabled: true,
        };
        WhatsAppProvider::new(config, Duration::from_secs(5)).unwrap()
    }

    fn reminder() -> WhatsAppMessage {
        WhatsAppMessage {
            phone_number: "+1 (555) 010-0200".to_string(),
            text: "Invoice INV-1000 is due & unpaid".to_string(),
        }
    }

    #[test]
    fn digits_only_strips_formatting() {
        assert_eq!(digits_only("+1 (555) 010-0200"), "15550100200");
        assert_eq!(digits_only("call me"), "");
    }

    #[tokio::test]
    async fn sends_bearer_token_with_digits_and_encoded_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sendMessage"))
            .and(header("authorization", "Bearer wa-token"))
            .and(query_param("phonenumber", "15550100200"))
            .and(query_param("text", "Invoice INV-1000 is due & unpaid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "id": "wamid.1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider(&server).send(&reminder()).await.unwrap();

        assert_eq!(response.provider, "whatsapp");
        assert_eq!(response.provider_id.as_deref(), Some("wamid.1"));
    }

    #[tokio::test]
    async fn success_false_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "number not on WhatsApp"
            })))
            .mount(&server)
            .await;

        let err = provider(&server).send(&reminder()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Rejected(ref m) if m == "number not on WhatsApp"));
    }

    #[tokio::test]
    async fn non_success_status_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/sendMessage"))
            .respond_with(ResponseTemplate::new(403).set_body_string("token revoked"))
            .mount(&server)
            .await;

        let err = provider(&server).send(&reminder()).await.unwrap_err();

        assert!(matches!(err, ProviderError::Http { status: 403, ref body } if body == "token revoked"));
    }

    #[tokio::test]
    async fn number_without_digits_is_refused_before_sending() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let message = WhatsAppMessage {
            phone_number: "n/a".to_string(),
            text: "Hi".to_string(),
        };
        let err = provider(&server).send(&message).await.unwrap_err();

        assert!(matches!(err, ProviderError::InvalidRecipient(_)));
    }
}
