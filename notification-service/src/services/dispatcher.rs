//! Sends notifications through the configured providers with retry and
//! idempotency.

use super::idempotency::IdempotencyStore;
use super::metrics;
use super::providers::{
    EmailMessage, EmailProvider, MessagingProvider, ProviderError, ProviderResponse,
    WhatsAppMessage,
};
use crate::models::{Channel, DispatchReceipt};
use chrono::Utc;
use service_core::retry::{retry_call, RetryConfig};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

pub const TEST_EMAIL_SUBJECT: &str = "Test email";
pub const TEST_EMAIL_TEXT: &str = "This is a test email confirming that your email settings work.";
pub const TEST_WHATSAPP_TEXT: &str =
    "This is a test message confirming that your WhatsApp settings work.";

#[derive(Clone)]
pub struct Dispatcher {
    email: Arc<dyn EmailProvider>,
    whatsapp: Arc<dyn MessagingProvider>,
    retry: RetryConfig,
    idempotency: IdempotencyStore,
}

impl Dispatcher {
    pub fn new(
        email: Arc<dyn EmailProvider>,
        whatsapp: Arc<dyn MessagingProvider>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            email,
            whatsapp,
            retry,
            idempotency: IdempotencyStore::new(),
        }
    }

    pub fn email_provider(&self) -> &'static str {
        self.email.name()
    }

    pub fn whatsapp_provider(&self) -> &'static str {
        self.whatsapp.name()
    }

    pub async fn send_email(
        &self,
        message: EmailMessage,
        idempotency_key: Option<&str>,
    ) -> Result<DispatchReceipt, ProviderError> {
        let provider = self.email.clone();
        self.dispatch(Channel::Email, idempotency_key, || {
            let provider = provider.clone();
            let message = message.clone();
            async move { provider.send(&message).await }
        })
        .await
    }

    pub async fn send_whatsapp(
        &self,
        message: WhatsAppMessage,
        idempotency_key: Option<&str>,
    ) -> Result<DispatchReceipt, ProviderError> {
        let provider = self.whatsapp.clone();
        self.dispatch(Channel::WhatsApp, idempotency_key, || {
            let provider = provider.clone();
            let message = message.clone();
            async move { provider.send(&message).await }
        })
        .await
    }

    /// Send the canned test email. Any failure is logged and reported as `false`.
    pub async fn test_email(&self, recipient: &str) -> bool {
        let message = EmailMessage {
            to: recipient.to_string(),
            to_name: None,
            subject: TEST_EMAIL_SUBJECT.to_string(),
            body_text: Some(TEST_EMAIL_TEXT.to_string()),
            body_html: Some(format!("<p>{}</p>", TEST_EMAIL_TEXT)),
        };

        match self.send_email(message, None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Email connection test failed");
                false
            }
        }
    }

    /// Send the canned test WhatsApp message. Any failure is logged and reported as `false`.
    pub async fn test_whatsapp(&self, phone_number: &str) -> bool {
        let message = WhatsAppMessage {
            phone_number: phone_number.to_string(),
            text: TEST_WHATSAPP_TEXT.to_string(),
        };

        match self.send_whatsapp(message, None).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "WhatsApp connection test failed");
                false
            }
        }
    }

    async fn dispatch<F, Fut>(
        &self,
        channel: Channel,
        idempotency_key: Option<&str>,
        send: F,
    ) -> Result<DispatchReceipt, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<ProviderResponse, ProviderError>>,
    {
        let Some(key) = idempotency_key else {
            return self.send_with_retry(channel, &send).await;
        };

        let slot = self.idempotency.slot(channel, key);
        let mut stored = slot.lock().await;

        if let Some(mut receipt) = IdempotencyStore::fresh(&stored) {
            tracing::info!(
                channel = %channel,
                idempotency_key = key,
                notification_id = %receipt.notification_id,
                "Replaying receipt for repeated idempotency key"
            );
            metrics::record_outcome(channel.as_str(), "replayed");
            receipt.replayed = true;
            return Ok(receipt);
        }

        let receipt = self.send_with_retry(channel, &send).await?;
        *stored = Some(receipt.clone());
        Ok(receipt)
    }

    async fn send_with_retry<F, Fut>(
        &self,
        channel: Channel,
        send: &F,
    ) -> Result<DispatchReceipt, ProviderError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<ProviderResponse, ProviderError>>,
    {
        let attempts = AtomicU32::new(0);
        let operation = format!("send_{}", channel);

        let result = retry_call(&self.retry, &operation, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            metrics::record_attempt(channel.as_str());
            let started = Instant::now();
            let call = send();
            async move {
                let result = call.await;
                metrics::observe_provider_call(channel.as_str(), started.elapsed().as_secs_f64());
                result
            }
        })
        .await;

        let attempts = attempts.load(Ordering::SeqCst);

        match result {
            Ok(response) => {
                metrics::record_outcome(channel.as_str(), "sent");
                let receipt = DispatchReceipt {
                    notification_id: Uuid::new_v4(),
                    channel,
                    provider: response.provider.to_string(),
                    provider_id: response.provider_id,
                    attempts,
                    sent_utc: Utc::now(),
                    replayed: false,
                };
                tracing::info!(
                    channel = %channel,
                    notification_id = %receipt.notification_id,
                    provider = %receipt.provider,
                    attempts,
                    "Notification dispatched"
                );
                Ok(receipt)
            }
            Err(e) => {
                metrics::record_outcome(channel.as_str(), e.kind());
                tracing::error!(channel = %channel, attempts, error = %e, "Notification dispatch failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::{MockEmailProvider, MockMessagingProvider};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails with each queued error in turn, then succeeds.
    struct FlakyEmailProvider {
        failures: Mutex<Vec<ProviderError>>,
        calls: AtomicU32,
    }

    impl FlakyEmailProvider {
        fn new(mut failures: Vec<ProviderError>) -> Self {
            failures.reverse();
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl EmailProvider for FlakyEmailProvider {
        async fn send(&self, _email: &EmailMessage) -> Result<ProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.failures.lock().unwrap().pop() {
                Some(err) => Err(err),
                None => Ok(ProviderResponse::success("flaky", Some("ok".to_string()))),
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }

        fn is_enabled(&self) -> bool {
            true
        }
    }

    fn dispatcher(email: Arc<dyn EmailProvider>) -> Dispatcher {
        Dispatcher::new(
            email,
            Arc::new(MockMessagingProvider::new()),
            RetryConfig::quick(),
        )
    }

    fn email() -> EmailMessage {
        EmailMessage {
            to: "bruce@wayne.test".to_string(),
            to_name: None,
            subject: "Reminder".to_string(),
            body_text: Some("Pay up".to_string()),
            body_html: None,
        }
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let provider = Arc::new(FlakyEmailProvider::new(vec![
            ProviderError::http(503, "maintenance"),
            ProviderError::Connection("reset".to_string()),
        ]));
        let receipt = dispatcher(provider.clone())
            .send_email(email(), None)
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_fail_immediately() {
        let provider = Arc::new(FlakyEmailProvider::new(vec![ProviderError::http(
            401,
            "bad credentials",
        )]));
        let err = dispatcher(provider.clone())
            .send_email(email(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Http { status: 401, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_configured_limit() {
        let provider = Arc::new(FlakyEmailProvider::new(vec![
            ProviderError::http(500, "a"),
            ProviderError::http(500, "b"),
            ProviderError::http(500, "c"),
            ProviderError::http(500, "d"),
        ]));
        let err = dispatcher(provider.clone())
            .send_email(email(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Http { status: 500, .. }));
        // RetryConfig::quick allows two retries.
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn repeated_key_replays_the_first_receipt() {
        let provider = Arc::new(MockEmailProvider::new());
        let dispatcher = dispatcher(provider.clone());

        let first = dispatcher
            .send_email(email(), Some("invoice-1000-reminder"))
            .await
            .unwrap();
        let second = dispatcher
            .send_email(email(), Some("invoice-1000-reminder"))
            .await
            .unwrap();

        assert_eq!(provider.send_count(), 1);
        assert_eq!(first.notification_id, second.notification_id);
        assert!(!first.replayed);
        assert!(second.replayed);
    }

    #[tokio::test]
    async fn failed_send_does_not_claim_the_key() {
        let provider = Arc::new(FlakyEmailProvider::new(vec![ProviderError::Rejected(
            "blocked".to_string(),
        )]));
        let dispatcher = dispatcher(provider.clone());

        assert!(dispatcher.send_email(email(), Some("k")).await.is_err());
        let receipt = dispatcher.send_email(email(), Some("k")).await.unwrap();

        assert!(!receipt.replayed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_connection_reports_a_boolean() {
        let ok = dispatcher(Arc::new(MockEmailProvider::new()));
        assert!(ok.test_email("ops@acme.test").await);

        let broken = dispatcher(Arc::new(FlakyEmailProvider::new(vec![
            ProviderError::http(401, "bad credentials"),
        ])));
        assert!(!broken.test_email("ops@acme.test").await);
        assert!(!broken.test_whatsapp("no digits").await);
    }
}
