//! Payment model: a client payment settling one invoice.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::Invoice;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            _ => PaymentStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub company_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
    pub status: String,
    pub completed_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Payment {
    pub fn status(&self) -> PaymentStatus {
        PaymentStatus::from_string(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub company_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
}

/// Filter parameters for listing payments.
#[derive(Debug, Clone, Default)]
pub struct ListPaymentsFilter {
    pub status: Option<PaymentStatus>,
    pub invoice_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ListPaymentsFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        if let Some(status) = self.status {
            if payment.status != status.as_str() {
                return false;
            }
        }
        if let Some(invoice_id) = self.invoice_id {
            if payment.invoice_id != invoice_id {
                return false;
            }
        }
        let created = payment.created_utc.date_naive();
        if let Some(start) = self.start_date {
            if created < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if created > end {
                return false;
            }
        }
        true
    }
}

/// Outcome of completing a payment.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentCompletion {
    pub payment: Payment,
    pub invoice: Invoice,
    /// True when the payment was already completed and nothing changed.
    pub already_completed: bool,
}
