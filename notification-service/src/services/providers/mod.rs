pub mod email;
pub mod whatsapp;

use async_trait::async_trait;
use serde::Serialize;
use service_core::error::AppError;
use service_core::retry::{is_retryable_status, Retryable};
use thiserror::Error;

pub use email::{MailjetProvider, MockEmailProvider};
pub use whatsapp::{digits_only, MockMessagingProvider, WhatsAppProvider};

/// Longest slice of an upstream error body carried into logs and responses.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider returned {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Provider rejected the message: {0}")]
    Rejected(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ProviderError {
    pub fn http(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((cut, _)) => format!("{}...", &body[..cut]),
            None => body.to_string(),
        };
        ProviderError::Http { status, body }
    }

    /// Short label used for outcome counters.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Http { .. } => "http_error",
            ProviderError::Rejected(_) => "rejected",
            ProviderError::Connection(_) => "connection",
            ProviderError::InvalidRecipient(_) => "invalid_recipient",
            ProviderError::Configuration(_) => "configuration",
        }
    }
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Connection(_) => true,
            ProviderError::Http { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Connection(err.to_string())
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidRecipient(_) => AppError::BadRequest(anyhow::anyhow!("{}", err)),
            ProviderError::Configuration(_) => AppError::InternalError(anyhow::anyhow!("{}", err)),
            _ => AppError::BadGateway(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProviderResponse {
    pub provider: &'static str,
    pub provider_id: Option<String>,
}

impl ProviderResponse {
    pub fn success(provider: &'static str, provider_id: Option<String>) -> Self {
        Self {
            provider,
            provider_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhatsAppMessage {
    pub phone_number: String,
    pub text: String,
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<ProviderResponse, ProviderError>;
    fn name(&self) -> &'static str;
    fn is_enabled(&self) -> bool;
}

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send(&self, message: &WhatsAppMessage) -> Result<ProviderResponse, ProviderError>;
    fn name(&self) -> &'static str;
    fn is_enabled(&self) -> bool;
}
