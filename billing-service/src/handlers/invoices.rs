use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    handlers::today,
    middleware::CompanyContext,
    models::{EntityType, Invoice, InvoiceStatus, ListInvoicesFilter},
    services::{
        invoicing::{self, InvoicePatch, NewInvoice},
        numbering::format_invoice_number,
    },
    startup::AppState,
};

/// An invoice plus its status as of today (`overdue` is never stored).
#[derive(Debug, Serialize)]
pub struct InvoiceView {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub effective_status: InvoiceStatus,
}

impl InvoiceView {
    pub fn new(invoice: Invoice, today: NaiveDate) -> Self {
        let effective_status = invoice.effective_status(today);
        Self {
            invoice,
            effective_status,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub client_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub base_amount: Decimal,
    pub tax_rate_id: Option<Uuid>,
    /// Defaults to today.
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateInvoiceRequest {
    pub due_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    pub base_amount: Option<Decimal>,
    pub tax_rate_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct NextNumberResponse {
    pub invoice_number: String,
    pub sequence_number: i64,
}

fn invoice_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Invoice not found"))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<Vec<InvoiceView>>, AppError> {
    let today = today();
    let filter = ListInvoicesFilter {
        status: query.status,
        client_id: query.client_id,
        start_date: query.from,
        end_date: query.to,
        ..ListInvoicesFilter::new(today)
    };

    let invoices = state.store.list_invoices(ctx.company_id, &filter).await?;
    Ok(Json(
        invoices
            .into_iter()
            .map(|invoice| InvoiceView::new(invoice, today))
            .collect(),
    ))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceView>), AppError> {
    payload.validate()?;
    let today = today();

    let invoice = invoicing::create_invoice(
        state.store.as_ref(),
        ctx.company_id,
        NewInvoice {
            client_id: payload.client_id,
            subscription_id: payload.subscription_id,
            base_amount: payload.base_amount,
            tax_rate_id: payload.tax_rate_id,
            issue_date: payload.issue_date.unwrap_or(today),
            due_date: payload.due_date,
            notes: payload.notes,
        },
        "manual",
    )
    .await?;

    let mut entry = ctx.activity(EntityType::Invoice, invoice.invoice_id, "created");
    entry.details = Some(json!({
        "invoice_number": invoice.invoice_number,
        "total_amount": invoice.total_amount,
    }));
    state.activity.log(entry).await;

    Ok((StatusCode::CREATED, Json(InvoiceView::new(invoice, today))))
}

/// Preview of the number the next invoice will get. Does not reserve it.
pub async fn next_invoice_number(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<NextNumberResponse>, AppError> {
    let sequence_number = state
        .store
        .peek_next_invoice_number(ctx.company_id)
        .await?;
    Ok(Json(NextNumberResponse {
        invoice_number: format_invoice_number(sequence_number),
        sequence_number,
    }))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = state
        .store
        .get_invoice(ctx.company_id, invoice_id)
        .await?
        .ok_or_else(invoice_not_found)?;
    Ok(Json(InvoiceView::new(invoice, today())))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceView>, AppError> {
    payload.validate()?;

    let invoice = invoicing::update_invoice(
        state.store.as_ref(),
        ctx.company_id,
        invoice_id,
        InvoicePatch {
            due_date: payload.due_date,
            notes: payload.notes,
            base_amount: payload.base_amount,
            tax_rate_id: payload.tax_rate_id,
        },
    )
    .await?;

    state
        .activity
        .log(ctx.activity(EntityType::Invoice, invoice.invoice_id, "updated"))
        .await;

    Ok(Json(InvoiceView::new(invoice, today())))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceView>, AppError> {
    let invoice = invoicing::cancel_invoice(state.store.as_ref(), ctx.company_id, invoice_id).await?;

    state
        .activity
        .log(ctx.activity(EntityType::Invoice, invoice.invoice_id, "cancelled"))
        .await;

    Ok(Json(InvoiceView::new(invoice, today())))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let invoice = invoicing::delete_invoice(state.store.as_ref(), ctx.company_id, invoice_id).await?;

    let mut entry = ctx.activity(EntityType::Invoice, invoice.invoice_id, "deleted");
    entry.details = Some(json!({ "invoice_number": invoice.invoice_number }));
    state.activity.log(entry).await;

    Ok(StatusCode::NO_CONTENT)
}
