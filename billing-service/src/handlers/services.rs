//! Handlers for the company's catalogue of billable services.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{
        BillingCycle, CreateService, EntityType, ListServicesFilter, Service, UpdateService,
    },
    services::tax::validate_amount,
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListServicesQuery {
    pub active: Option<bool>,
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub price: Decimal,
    pub billing_cycle: BillingCycle,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateServiceRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(max = 100))]
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub billing_cycle: Option<BillingCycle>,
    pub active: Option<bool>,
}

fn service_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Service not found"))
}

pub async fn list_services(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<ListServicesQuery>,
) -> Result<Json<Vec<Service>>, AppError> {
    let filter = ListServicesFilter {
        active: query.active,
        category: query.category,
    };
    Ok(Json(state.store.list_services(ctx.company_id, &filter).await?))
}

pub async fn create_service(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateServiceRequest>,
) -> Result<(StatusCode, Json<Service>), AppError> {
    payload.validate()?;
    validate_amount(payload.price, "price")?;

    let service = state
        .store
        .create_service(&CreateService {
            company_id: ctx.company_id,
            name: payload.name.trim().to_string(),
            description: payload.description,
            category: payload.category,
            price: payload.price,
            billing_cycle: payload.billing_cycle,
            active: payload.active,
        })
        .await?;

    state
        .activity
        .log(ctx.activity(EntityType::Service, service.service_id, "created"))
        .await;

    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn get_service(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(service_id): Path<Uuid>,
) -> Result<Json<Service>, AppError> {
    let service = state
        .store
        .get_service(ctx.company_id, service_id)
        .await?
        .ok_or_else(service_not_found)?;
    Ok(Json(service))
}

pub async fn update_service(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(service_id): Path<Uuid>,
    Json(payload): Json<UpdateServiceRequest>,
) -> Result<Json<Service>, AppError> {
    payload.validate()?;
    if let Some(price) = payload.price {
        validate_amount(price, "price")?;
    }

    let service = state
        .store
        .update_service(
            ctx.company_id,
            service_id,
            &UpdateService {
                name: payload.name,
                description: payload.description,
                category: payload.category,
                price: payload.price,
                billing_cycle: payload.billing_cycle,
                active: payload.active,
            },
        )
        .await?
        .ok_or_else(service_not_found)?;

    state
        .activity
        .log(ctx.activity(EntityType::Service, service.service_id, "updated"))
        .await;

    Ok(Json(service))
}

pub async fn delete_service(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(service_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_service(ctx.company_id, service_id).await? {
        return Err(service_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::Service, service_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}
