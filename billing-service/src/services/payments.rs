//! Manual payments against invoices.

use crate::models::{CreatePayment, Payment, PaymentCompletion, PaymentStatus};
use crate::services::metrics::record_payment;
use crate::services::store::BillingStore;
use crate::services::tax::validate_amount;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub method: String,
    pub reference: Option<String>,
}

/// Record a pending payment for the full invoice total.
#[instrument(skip(store, input), fields(company_id = %company_id, invoice_id = %input.invoice_id))]
pub async fn record_payment_intent(
    store: &dyn BillingStore,
    company_id: Uuid,
    input: NewPayment,
) -> Result<Payment, AppError> {
    validate_amount(input.amount, "amount")?;
    if input.amount.is_zero() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "amount must be greater than zero"
        )));
    }

    let invoice = store
        .get_invoice(company_id, input.invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    if !invoice.is_payable() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invoice {} is {} and cannot take payments",
            invoice.invoice_number,
            invoice.status
        )));
    }

    if input.amount != invoice.total_amount {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Payment amount must equal the invoice total of {}; partial payments are not supported",
            invoice.total_amount
        )));
    }

    let payment = store
        .create_payment(&CreatePayment {
            company_id,
            invoice_id: invoice.invoice_id,
            amount: input.amount,
            method: input.method,
            reference: input.reference,
        })
        .await?;

    record_payment(&company_id.to_string(), PaymentStatus::Pending.as_str());
    Ok(payment)
}

/// Complete a payment and mark its invoice paid in one step.
///
/// Repeating the call returns the stored result and leaves `paid_date` alone.
#[instrument(skip(store), fields(company_id = %company_id, payment_id = %payment_id))]
pub async fn complete_payment(
    store: &dyn BillingStore,
    company_id: Uuid,
    payment_id: Uuid,
    today: NaiveDate,
) -> Result<PaymentCompletion, AppError> {
    let completion = store
        .complete_payment(company_id, payment_id, today)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    if completion.already_completed {
        info!("Payment already completed, returning stored state");
    } else {
        record_payment(&company_id.to_string(), PaymentStatus::Completed.as_str());
    }

    Ok(completion)
}

#[instrument(skip(store), fields(company_id = %company_id, payment_id = %payment_id))]
pub async fn fail_payment(
    store: &dyn BillingStore,
    company_id: Uuid,
    payment_id: Uuid,
) -> Result<Payment, AppError> {
    let payment = store
        .get_payment(company_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    if payment.status() != PaymentStatus::Pending {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Only pending payments can be failed"
        )));
    }

    let payment = store
        .fail_payment(company_id, payment_id)
        .await?
        .ok_or_else(|| AppError::Conflict(anyhow::anyhow!("Payment is no longer pending")))?;

    record_payment(&company_id.to_string(), PaymentStatus::Failed.as_str());
    Ok(payment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ClientStatus, CreateClient, CreateInvoice, Invoice, InvoiceStatus, UpdateInvoice,
    };
    use crate::services::memory::MemoryStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed_invoice(store: &MemoryStore, company_id: Uuid) -> Invoice {
        let client = store
            .create_client(&CreateClient {
                company_id,
                name: "Globex".to_string(),
                email: None,
                phone: None,
                address: None,
                status: ClientStatus::Active,
                segment: None,
                notes: None,
            })
            .await
            .unwrap();
        store
            .create_invoice(&CreateInvoice {
                company_id,
                client_id: client.client_id,
                subscription_id: None,
                base_amount: Decimal::new(5000, 0),
                tax_rate_id: None,
                tax_rate: Decimal::new(16, 0),
                tax_amount: Decimal::new(800, 0),
                total_amount: Decimal::new(5800, 0),
                issue_date: date(2026, 10, 1),
                due_date: date(2026, 10, 16),
                notes: None,
            })
            .await
            .unwrap()
    }

    fn full_payment(invoice: &Invoice) -> NewPayment {
        NewPayment {
            invoice_id: invoice.invoice_id,
            amount: invoice.total_amount,
            method: "bank_transfer".to_string(),
            reference: Some("TRX-1".to_string()),
        }
    }

    #[tokio::test]
    async fn completing_twice_keeps_paid_date() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let invoice = seed_invoice(&store, company).await;
        let payment = record_payment_intent(&store, company, full_payment(&invoice))
            .await
            .unwrap();

        let first = complete_payment(&store, company, payment.payment_id, date(2026, 10, 5))
            .await
            .unwrap();
        assert!(!first.already_completed);
        assert_eq!(first.invoice.status(), InvoiceStatus::Paid);
        assert_eq!(first.invoice.paid_date, Some(date(2026, 10, 5)));
        assert_eq!(first.invoice.payment_method.as_deref(), Some("bank_transfer"));

        let second = complete_payment(&store, company, payment.payment_id, date(2026, 10, 9))
            .await
            .unwrap();
        assert!(second.already_completed);
        assert_eq!(second.invoice.paid_date, Some(date(2026, 10, 5)));
    }

    #[tokio::test]
    async fn partial_payment_is_rejected() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let invoice = seed_invoice(&store, company).await;

        let mut partial = full_payment(&invoice);
        partial.amount = Decimal::new(1000, 0);
        let err = record_payment_intent(&store, company, partial).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn zero_payment_is_rejected() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let client = store
            .create_client(&CreateClient {
                company_id: company,
                name: "Initech".to_string(),
                email: None,
                phone: None,
                address: None,
                status: ClientStatus::Active,
                segment: None,
                notes: None,
            })
            .await
            .unwrap();
        let free = store
            .create_invoice(&CreateInvoice {
                company_id: company,
                client_id: client.client_id,
                subscription_id: None,
                base_amount: Decimal::ZERO,
                tax_rate_id: None,
                tax_rate: Decimal::ZERO,
                tax_amount: Decimal::ZERO,
                total_amount: Decimal::ZERO,
                issue_date: date(2026, 10, 1),
                due_date: date(2026, 10, 16),
                notes: None,
            })
            .await
            .unwrap();

        let err = record_payment_intent(&store, company, full_payment(&free))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn completion_after_total_changed_is_refused() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let invoice = seed_invoice(&store, company).await;
        let payment = record_payment_intent(&store, company, full_payment(&invoice))
            .await
            .unwrap();

        store
            .update_pending_invoice(
                company,
                invoice.invoice_id,
                &UpdateInvoice {
                    base_amount: Some(Decimal::new(10000, 0)),
                    tax_amount: Some(Decimal::new(1600, 0)),
                    total_amount: Some(Decimal::new(11600, 0)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = complete_payment(&store, company, payment.payment_id, date(2026, 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let invoice = store
            .get_invoice(company, invoice.invoice_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.status(), InvoiceStatus::Pending);
        assert_eq!(invoice.paid_date, None);
    }

    #[tokio::test]
    async fn failed_payment_cannot_be_completed() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let invoice = seed_invoice(&store, company).await;
        let payment = record_payment_intent(&store, company, full_payment(&invoice))
            .await
            .unwrap();

        fail_payment(&store, company, payment.payment_id).await.unwrap();
        let err = complete_payment(&store, company, payment.payment_id, date(2026, 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn payment_of_another_company_is_not_found() {
        let store = MemoryStore::new();
        let company = Uuid::new_v4();
        let invoice = seed_invoice(&store, company).await;
        let payment = record_payment_intent(&store, company, full_payment(&invoice))
            .await
            .unwrap();

        let err = complete_payment(&store, Uuid::new_v4(), payment.payment_id, date(2026, 10, 5))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
