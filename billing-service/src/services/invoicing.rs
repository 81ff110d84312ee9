//! Invoice creation, editing and lifecycle, plus the per-subscription billing run.

use crate::models::{
    CreateInvoice, Invoice, InvoiceStatus, Subscription, SubscriptionStatus, UpdateInvoice,
    UpdateSubscription,
};
use crate::services::metrics::record_invoice_created;
use crate::services::store::BillingStore;
use crate::services::tax::{calculate_tax, calculate_with_rate, validate_amount};
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub client_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub base_amount: Decimal,
    pub tax_rate_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InvoicePatch {
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub base_amount: Option<Decimal>,
    pub tax_rate_id: Option<Uuid>,
}

/// Create a pending invoice. The store assigns the number.
#[instrument(skip(store, input), fields(company_id = %company_id, client_id = %input.client_id))]
pub async fn create_invoice(
    store: &dyn BillingStore,
    company_id: Uuid,
    input: NewInvoice,
    origin: &str,
) -> Result<Invoice, AppError> {
    validate_amount(input.base_amount, "base_amount")?;
    if input.due_date < input.issue_date {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "due_date cannot be before issue_date"
        )));
    }

    store
        .get_client(company_id, input.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    if let Some(subscription_id) = input.subscription_id {
        let subscription = store
            .get_subscription(company_id, subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;
        if subscription.client_id != input.client_id {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Subscription belongs to a different client"
            )));
        }
    }

    let (calc, tax_rate_id) =
        calculate_with_rate(store, input.base_amount, input.tax_rate_id).await?;

    let invoice = store
        .create_invoice(&CreateInvoice {
            company_id,
            client_id: input.client_id,
            subscription_id: input.subscription_id,
            base_amount: calc.base_amount,
            tax_rate_id,
            tax_rate: calc.tax_rate,
            tax_amount: calc.tax_amount,
            total_amount: calc.total_amount,
            issue_date: input.issue_date,
            due_date: input.due_date,
            notes: input.notes,
        })
        .await?;

    record_invoice_created(&company_id.to_string(), origin);
    info!(
        invoice_number = %invoice.invoice_number,
        total_amount = %invoice.total_amount,
        origin = origin,
        "Invoice issued"
    );

    Ok(invoice)
}

/// Edit a pending invoice, recomputing amounts when the base or rate changes.
#[instrument(skip(store, patch), fields(company_id = %company_id, invoice_id = %invoice_id))]
pub async fn update_invoice(
    store: &dyn BillingStore,
    company_id: Uuid,
    invoice_id: Uuid,
    patch: InvoicePatch,
) -> Result<Invoice, AppError> {
    let invoice = store
        .get_invoice(company_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    if invoice.status() != InvoiceStatus::Pending {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Only pending invoices can be edited"
        )));
    }

    if let Some(due_date) = patch.due_date {
        if due_date < invoice.issue_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "due_date cannot be before issue_date"
            )));
        }
    }

    let mut update = UpdateInvoice {
        due_date: patch.due_date,
        notes: patch.notes,
        ..Default::default()
    };

    if patch.base_amount.is_some() || patch.tax_rate_id.is_some() {
        let base = patch.base_amount.unwrap_or(invoice.base_amount);
        validate_amount(base, "base_amount")?;

        let (calc, tax_rate_id) = match patch.tax_rate_id.or(invoice.tax_rate_id) {
            Some(id) => calculate_with_rate(store, base, Some(id)).await?,
            // Keep the percentage captured when the invoice was issued.
            None => (calculate_tax(base, invoice.tax_rate)?, None),
        };

        update.base_amount = Some(calc.base_amount);
        update.tax_rate_id = Some(tax_rate_id);
        update.tax_rate = Some(calc.tax_rate);
        update.tax_amount = Some(calc.tax_amount);
        update.total_amount = Some(calc.total_amount);
    }

    store
        .update_pending_invoice(company_id, invoice_id, &update)
        .await?
        .ok_or_else(|| {
            AppError::Conflict(anyhow::anyhow!("Invoice is no longer pending"))
        })
}

/// pending -> cancelled. Paid and cancelled are terminal.
#[instrument(skip(store), fields(company_id = %company_id, invoice_id = %invoice_id))]
pub async fn cancel_invoice(
    store: &dyn BillingStore,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Invoice, AppError> {
    let invoice = store
        .get_invoice(company_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    match invoice.status() {
        InvoiceStatus::Paid => Err(AppError::Conflict(anyhow::anyhow!(
            "Paid invoices cannot be cancelled"
        ))),
        InvoiceStatus::Cancelled => Err(AppError::Conflict(anyhow::anyhow!(
            "Invoice is already cancelled"
        ))),
        InvoiceStatus::Pending | InvoiceStatus::Overdue => store
            .transition_invoice(
                company_id,
                invoice_id,
                InvoiceStatus::Pending,
                InvoiceStatus::Cancelled,
            )
            .await?
            .ok_or_else(|| AppError::Conflict(anyhow::anyhow!("Invoice is no longer pending"))),
    }
}

#[instrument(skip(store), fields(company_id = %company_id, invoice_id = %invoice_id))]
pub async fn delete_invoice(
    store: &dyn BillingStore,
    company_id: Uuid,
    invoice_id: Uuid,
) -> Result<Invoice, AppError> {
    let invoice = store
        .get_invoice(company_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    if invoice.status() == InvoiceStatus::Paid {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Paid invoices cannot be deleted"
        )));
    }

    if !store.delete_unpaid_invoice(company_id, invoice_id).await? {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Invoice was paid while being deleted"
        )));
    }

    Ok(invoice)
}

/// Raise the invoice for one active subscription and advance its billing date.
///
/// One-time services do not recur, so the subscription expires once billed.
#[instrument(skip(store), fields(company_id = %company_id, subscription_id = %subscription_id))]
pub async fn bill_subscription(
    store: &dyn BillingStore,
    company_id: Uuid,
    subscription_id: Uuid,
    tax_rate_id: Option<Uuid>,
    due_in_days: i64,
    today: NaiveDate,
) -> Result<(Invoice, Subscription), AppError> {
    if due_in_days < 0 {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "due_in_days cannot be negative"
        )));
    }

    let subscription = store
        .get_subscription(company_id, subscription_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

    if subscription.status() != SubscriptionStatus::Active {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Only active subscriptions can be billed"
        )));
    }

    let service = store
        .get_service(company_id, subscription.service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service not found")))?;

    let cycle = service.billing_cycle();
    let invoice = create_invoice(
        store,
        company_id,
        NewInvoice {
            client_id: subscription.client_id,
            subscription_id: Some(subscription.subscription_id),
            base_amount: service.price,
            tax_rate_id,
            issue_date: today,
            due_date: today + Duration::days(due_in_days),
            notes: Some(format!("{} ({})", service.name, cycle.as_str())),
        },
        "subscription",
    )
    .await?;

    let period_start = subscription.next_billing_date.unwrap_or(today);
    let next_billing_date = cycle.next_billing_date(period_start);
    let update = UpdateSubscription {
        status: next_billing_date
            .is_none()
            .then_some(SubscriptionStatus::Expired),
        end_date: None,
        next_billing_date: Some(next_billing_date),
    };

    let subscription = store
        .update_subscription(company_id, subscription_id, &update)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Subscription not found")))?;

    Ok((invoice, subscription))
}
