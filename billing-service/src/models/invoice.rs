//! Invoice model for billing-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice status.
///
/// Only `pending`, `paid` and `cancelled` are stored. `overdue` is derived from
/// the due date of a pending invoice at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => InvoiceStatus::Paid,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Pending,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Cancelled)
    }
}

/// Invoice record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub invoice_number: String,
    pub sequence_number: i64,
    pub base_amount: Decimal,
    pub tax_rate_id: Option<Uuid>,
    /// Percentage applied when the invoice was computed.
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub paid_date: Option<NaiveDate>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    /// Stored status.
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    /// Status as seen on `today`: a pending invoice past its due date is overdue.
    pub fn effective_status(&self, today: NaiveDate) -> InvoiceStatus {
        match self.status() {
            InvoiceStatus::Pending | InvoiceStatus::Overdue if self.due_date < today => {
                InvoiceStatus::Overdue
            }
            InvoiceStatus::Overdue => InvoiceStatus::Pending,
            other => other,
        }
    }

    /// Whether a payment may still settle this invoice.
    pub fn is_payable(&self) -> bool {
        !self.status().is_terminal()
    }
}

/// Input for inserting an invoice. Amounts are computed by the caller; the
/// store assigns the number.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub base_amount: Decimal,
    pub tax_rate_id: Option<Uuid>,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
}

/// Input for updating a pending invoice.
#[derive(Debug, Clone, Default)]
pub struct UpdateInvoice {
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub base_amount: Option<Decimal>,
    /// `Some(None)` clears the rate reference.
    pub tax_rate_id: Option<Option<Uuid>>,
    pub tax_rate: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub total_amount: Option<Decimal>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone)]
pub struct ListInvoicesFilter {
    /// Effective status (`overdue` and `pending` are split on the due date).
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Reference day for overdue derivation.
    pub today: NaiveDate,
}

impl ListInvoicesFilter {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            status: None,
            client_id: None,
            start_date: None,
            end_date: None,
            today,
        }
    }

    pub fn matches(&self, invoice: &Invoice) -> bool {
        if let Some(status) = self.status {
            if invoice.effective_status(self.today) != status {
                return false;
            }
        }
        if let Some(client_id) = self.client_id {
            if invoice.client_id != client_id {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if invoice.issue_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if invoice.issue_date > end {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn invoice(status: &str, due: NaiveDate) -> Invoice {
        let now = Utc::now();
        Invoice {
            invoice_id: Uuid::new_v4(),
            company_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            subscription_id: None,
            invoice_number: "INV-1000".to_string(),
            sequence_number: 1000,
            base_amount: Decimal::new(5000, 0),
            tax_rate_id: None,
            tax_rate: Decimal::new(16, 0),
            tax_amount: Decimal::new(800, 0),
            total_amount: Decimal::new(5800, 0),
            status: status.to_string(),
            issue_date: date(2026, 1, 1),
            due_date: due,
            paid_date: None,
            payment_method: None,
            notes: None,
            created_utc: now,
            updated_utc: now,
        }
    }

    #[test]
    fn pending_invoice_past_due_is_overdue() {
        let inv = invoice("pending", date(2026, 1, 15));
        assert_eq!(inv.effective_status(date(2026, 1, 16)), InvoiceStatus::Overdue);
    }

    #[test]
    fn pending_invoice_on_due_date_is_not_overdue() {
        let inv = invoice("pending", date(2026, 1, 15));
        assert_eq!(inv.effective_status(date(2026, 1, 15)), InvoiceStatus::Pending);
    }

    #[test]
    fn terminal_states_are_not_derived() {
        let paid = invoice("paid", date(2025, 1, 1));
        let cancelled = invoice("cancelled", date(2025, 1, 1));
        assert_eq!(paid.effective_status(date(2026, 1, 1)), InvoiceStatus::Paid);
        assert_eq!(
            cancelled.effective_status(date(2026, 1, 1)),
            InvoiceStatus::Cancelled
        );
        assert!(!paid.is_payable());
        assert!(!cancelled.is_payable());
    }

    #[test]
    fn status_filter_splits_pending_and_overdue() {
        let today = date(2026, 2, 1);
        let late = invoice("pending", date(2026, 1, 20));
        let current = invoice("pending", date(2026, 2, 20));

        let mut filter = ListInvoicesFilter::new(today);
        filter.status = Some(InvoiceStatus::Overdue);
        assert!(filter.matches(&late));
        assert!(!filter.matches(&current));

        filter.status = Some(InvoiceStatus::Pending);
        assert!(!filter.matches(&late));
        assert!(filter.matches(&current));
    }
}
