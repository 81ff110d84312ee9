//! Plan payments settled through the external payment gateway.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayPaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl GatewayPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GatewayPaymentStatus::Pending => "pending",
            GatewayPaymentStatus::Completed => "completed",
            GatewayPaymentStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => GatewayPaymentStatus::Completed,
            "failed" => GatewayPaymentStatus::Failed,
            _ => GatewayPaymentStatus::Pending,
        }
    }

    /// Map the gateway's `result` field onto a payment status.
    pub fn from_gateway_result(result: Option<&str>) -> Self {
        match result {
            Some("SUCCESS") => GatewayPaymentStatus::Completed,
            Some("FAILURE") => GatewayPaymentStatus::Failed,
            _ => GatewayPaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GatewayPayment {
    pub gateway_payment_id: Uuid,
    pub company_id: Uuid,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    /// Last raw callback body received for this order.
    pub gateway_payload: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl GatewayPayment {
    pub fn status(&self) -> GatewayPaymentStatus {
        GatewayPaymentStatus::from_string(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct CreateGatewayPayment {
    pub company_id: Uuid,
    pub order_id: String,
    pub amount: Decimal,
    pub currency: String,
}

/// Result of applying a gateway callback.
#[derive(Debug, Clone, Serialize)]
pub struct GatewaySettlement {
    pub payment: GatewayPayment,
    /// True when the owning company was activated by this callback.
    pub company_activated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_results_map_to_statuses() {
        assert_eq!(
            GatewayPaymentStatus::from_gateway_result(Some("SUCCESS")),
            GatewayPaymentStatus::Completed
        );
        assert_eq!(
            GatewayPaymentStatus::from_gateway_result(Some("FAILURE")),
            GatewayPaymentStatus::Failed
        );
        assert_eq!(
            GatewayPaymentStatus::from_gateway_result(Some("PENDING")),
            GatewayPaymentStatus::Pending
        );
        assert_eq!(
            GatewayPaymentStatus::from_gateway_result(None),
            GatewayPaymentStatus::Pending
        );
    }
}
