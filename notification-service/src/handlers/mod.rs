//! HTTP handlers for notification-service.

pub mod email;
pub mod health;
pub mod whatsapp;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

pub use health::{health_check, metrics_handler};

pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

const MAX_IDEMPOTENCY_KEY_LEN: usize = 255;

/// Optional `Idempotency-Key` header. Blank keys count as absent.
pub(crate) fn idempotency_key(headers: &HeaderMap) -> Result<Option<String>, AppError> {
    let Some(value) = headers.get(IDEMPOTENCY_KEY_HEADER) else {
        return Ok(None);
    };

    let key = value
        .to_str()
        .map_err(|_| AppError::BadRequest(anyhow::anyhow!("Idempotency-Key must be ASCII")))?
        .trim();

    if key.is_empty() {
        return Ok(None);
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Idempotency-Key must be at most {} characters",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }

    Ok(Some(key.to_string()))
}

/// Body of the test-connection endpoints; the recipient falls back to configuration.
#[derive(Debug, Default, Deserialize)]
pub struct TestConnectionRequest {
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    pub success: bool,
}
