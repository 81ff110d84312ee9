//! Payment-gateway plan payments and callback processing.
//!
//! The gateway reports a final outcome per order:
//! `{"order": {"id", "amount", "currency"}, "transaction": [...], "result": "SUCCESS" | "FAILURE" | ...}`.

use crate::models::{CreateGatewayPayment, GatewayPayment, GatewayPaymentStatus, GatewaySettlement};
use crate::services::metrics::record_webhook_event;
use crate::services::store::BillingStore;
use crate::services::tax::validate_amount;
use anyhow::anyhow;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "X-Gateway-Signature";

#[derive(Debug, Default, Deserialize)]
pub struct GatewayOrder {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GatewayEvent {
    #[serde(default)]
    pub order: Option<GatewayOrder>,
    #[serde(default)]
    pub transaction: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub result: Option<String>,
}

impl GatewayEvent {
    pub fn order_id(&self) -> Option<&str> {
        self.order
            .as_ref()
            .and_then(|o| o.id.as_deref())
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

/// Hex-encoded HMAC-SHA256 of the raw body.
pub fn compute_signature(secret: &str, body: &[u8]) -> Result<String, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InternalError(anyhow!("Invalid webhook secret length")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Constant-time check of a hex signature against the raw body.
pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Open a pending plan payment for the company's subscription to this product.
#[instrument(skip(store), fields(company_id = %company_id))]
pub async fn create_plan_payment(
    store: &dyn BillingStore,
    company_id: Uuid,
    amount: Decimal,
    currency: &str,
) -> Result<GatewayPayment, AppError> {
    validate_amount(amount, "amount")?;
    if amount.is_zero() {
        return Err(AppError::BadRequest(anyhow!("amount must be greater than zero")));
    }

    store
        .get_company(company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow!("Company not found")))?;

    let payment = store
        .create_gateway_payment(&CreateGatewayPayment {
            company_id,
            order_id: format!("order_{}", Uuid::new_v4().simple()),
            amount,
            currency: currency.trim().to_ascii_uppercase(),
        })
        .await?;

    info!(order_id = %payment.order_id, "Gateway plan payment opened");
    Ok(payment)
}

/// Apply a gateway callback body.
///
/// Unknown orders are `NotFound("Payment record not found")`. Orders that are
/// no longer pending are returned unchanged, so redelivery is harmless.
#[instrument(skip(store, body))]
pub async fn process_callback(
    store: &dyn BillingStore,
    body: &str,
) -> Result<GatewaySettlement, AppError> {
    let payload: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        record_webhook_event("invalid");
        AppError::BadRequest(anyhow!("Invalid JSON payload: {}", e))
    })?;
    let event: GatewayEvent = serde_json::from_value(payload.clone()).unwrap_or_default();

    let Some(order_id) = event.order_id() else {
        record_webhook_event("invalid");
        return Err(AppError::BadRequest(anyhow!("Missing order.id in payload")));
    };

    let status = GatewayPaymentStatus::from_gateway_result(event.result.as_deref());
    info!(
        order_id = %order_id,
        result = ?event.result,
        status = status.as_str(),
        transactions = event.transaction.as_ref().map_or(0, Vec::len),
        "Processing gateway callback"
    );

    let Some(settlement) = store
        .settle_gateway_payment(order_id, status, &payload)
        .await?
    else {
        warn!(order_id = %order_id, "Gateway callback for unknown order");
        record_webhook_event("not_found");
        return Err(AppError::NotFound(anyhow!("Payment record not found")));
    };

    record_webhook_event(settlement.payment.status.as_str());
    Ok(settlement)
}
