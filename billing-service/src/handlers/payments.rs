use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    handlers::today,
    middleware::CompanyContext,
    models::{EntityType, ListPaymentsFilter, Payment, PaymentCompletion, PaymentStatus},
    services::payments::{self, NewPayment},
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListPaymentsQuery {
    pub status: Option<PaymentStatus>,
    pub invoice_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePaymentRequest {
    pub invoice_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1, max = 50))]
    pub method: String,
    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

pub async fn list_payments(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let filter = ListPaymentsFilter {
        status: query.status,
        invoice_id: query.invoice_id,
        start_date: query.from,
        end_date: query.to,
    };
    Ok(Json(state.store.list_payments(ctx.company_id, &filter).await?))
}

pub async fn create_payment(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), AppError> {
    payload.validate()?;

    let payment = payments::record_payment_intent(
        state.store.as_ref(),
        ctx.company_id,
        NewPayment {
            invoice_id: payload.invoice_id,
            amount: payload.amount,
            method: payload.method.trim().to_string(),
            reference: payload.reference,
        },
    )
    .await?;

    let mut entry = ctx.activity(EntityType::Payment, payment.payment_id, "created");
    entry.details = Some(json!({ "invoice_id": payment.invoice_id, "amount": payment.amount }));
    state.activity.log(entry).await;

    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .store
        .get_payment(ctx.company_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;
    Ok(Json(payment))
}

/// Idempotent: a repeat returns the stored payment and invoice unchanged.
pub async fn complete_payment(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentCompletion>, AppError> {
    let completion =
        payments::complete_payment(state.store.as_ref(), ctx.company_id, payment_id, today())
            .await?;

    if !completion.already_completed {
        state
            .activity
            .log(ctx.activity(EntityType::Payment, payment_id, "completed"))
            .await;
        let mut entry = ctx.activity(EntityType::Invoice, completion.invoice.invoice_id, "paid");
        entry.details = Some(json!({
            "payment_id": payment_id,
            "payment_method": completion.invoice.payment_method,
        }));
        state.activity.log(entry).await;
    }

    Ok(Json(completion))
}

pub async fn fail_payment(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = payments::fail_payment(state.store.as_ref(), ctx.company_id, payment_id).await?;

    state
        .activity
        .log(ctx.activity(EntityType::Payment, payment.payment_id, "failed"))
        .await;

    Ok(Json(payment))
}
