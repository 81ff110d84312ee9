//! Tax rates are shared across companies; only owners and admins may edit them.

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
    models::{CreateTaxRate, EntityType, ListTaxRatesFilter, TaxRate, UpdateTaxRate},
    services::tax::{self, validate_rate, TaxCalculation},
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListTaxRatesQuery {
    #[serde(default)]
    pub active_only: bool,
    pub as_of: Option<NaiveDate>,
    pub service_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaxRateRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub rate: Decimal,
    pub service_id: Option<Uuid>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaxRateRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub rate: Option<Decimal>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CalculateTaxRequest {
    pub base_amount: Decimal,
    pub tax_rate_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct CalculateTaxResponse {
    #[serde(flatten)]
    pub calculation: TaxCalculation,
    /// `None` when the selected rate did not resolve and zero tax was applied.
    pub tax_rate_id: Option<Uuid>,
}

fn tax_rate_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Tax rate not found"))
}

fn check_window(from: NaiveDate, to: Option<NaiveDate>) -> Result<(), AppError> {
    match to {
        Some(to) if to < from => Err(AppError::BadRequest(anyhow::anyhow!(
            "effective_to cannot be before effective_from"
        ))),
        _ => Ok(()),
    }
}

pub async fn list_tax_rates(
    State(state): State<AppState>,
    _ctx: CompanyContext,
    Query(query): Query<ListTaxRatesQuery>,
) -> Result<Json<Vec<TaxRate>>, AppError> {
    let filter = ListTaxRatesFilter {
        active_only: query.active_only,
        as_of: query.as_of,
        service_id: query.service_id,
    };
    Ok(Json(state.store.list_tax_rates(&filter).await?))
}

pub async fn create_tax_rate(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateTaxRateRequest>,
) -> Result<(StatusCode, Json<TaxRate>), AppError> {
    ctx.require_admin()?;
    payload.validate()?;
    validate_rate(payload.rate)?;
    let effective_from = payload.effective_from.unwrap_or_else(today);
    check_window(effective_from, payload.effective_to)?;

    if let Some(service_id) = payload.service_id {
        state
            .store
            .get_service(ctx.company_id, service_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service not found")))?;
    }

    let tax_rate = state
        .store
        .create_tax_rate(&CreateTaxRate {
            name: payload.name.trim().to_string(),
            rate: payload.rate,
            service_id: payload.service_id,
            effective_from,
            effective_to: payload.effective_to,
        })
        .await?;

    let mut entry = ctx.activity(EntityType::TaxRate, tax_rate.tax_rate_id, "created");
    entry.details = Some(json!({ "name": tax_rate.name, "rate": tax_rate.rate }));
    state.activity.log(entry).await;

    Ok((StatusCode::CREATED, Json(tax_rate)))
}

pub async fn get_tax_rate(
    State(state): State<AppState>,
    _ctx: CompanyContext,
    Path(tax_rate_id): Path<Uuid>,
) -> Result<Json<TaxRate>, AppError> {
    let tax_rate = state
        .store
        .get_tax_rate(tax_rate_id)
        .await?
        .ok_or_else(tax_rate_not_found)?;
    Ok(Json(tax_rate))
}

pub async fn update_tax_rate(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(tax_rate_id): Path<Uuid>,
    Json(payload): Json<UpdateTaxRateRequest>,
) -> Result<Json<TaxRate>, AppError> {
    ctx.require_admin()?;
    payload.validate()?;
    if let Some(rate) = payload.rate {
        validate_rate(rate)?;
    }

    let current = state
        .store
        .get_tax_rate(tax_rate_id)
        .await?
        .ok_or_else(tax_rate_not_found)?;
    check_window(
        payload.effective_from.unwrap_or(current.effective_from),
        payload.effective_to.or(current.effective_to),
    )?;

    let tax_rate = state
        .store
        .update_tax_rate(
            tax_rate_id,
            &UpdateTaxRate {
                name: payload.name,
                rate: payload.rate,
                effective_from: payload.effective_from,
                effective_to: payload.effective_to,
                active: payload.active,
            },
        )
        .await?
        .ok_or_else(tax_rate_not_found)?;

    state
        .activity
        .log(ctx.activity(EntityType::TaxRate, tax_rate.tax_rate_id, "updated"))
        .await;

    Ok(Json(tax_rate))
}

/// Invoices keep their captured percentage; their rate reference is cleared.
pub async fn delete_tax_rate(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(tax_rate_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ctx.require_admin()?;

    if !state.store.delete_tax_rate(tax_rate_id).await? {
        return Err(tax_rate_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::TaxRate, tax_rate_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn calculate(
    State(state): State<AppState>,
    _ctx: CompanyContext,
    Json(payload): Json<CalculateTaxRequest>,
) -> Result<Json<CalculateTaxResponse>, AppError> {
    let (calculation, tax_rate_id) =
        tax::calculate_with_rate(state.store.as_ref(), payload.base_amount, payload.tax_rate_id)
            .await?;
    Ok(Json(CalculateTaxResponse {
        calculation,
        tax_rate_id,
    }))
}
