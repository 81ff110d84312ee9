//! Signup, company profile, status lifecycle and plan payments.

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{Company, CompanyStatus, EntityType, GatewayPayment, NewActivity, UpdateCompany},
    services::{
        companies::{self, Signup, SignupOutcome},
        gateway,
    },
    startup::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 1, max = 200))]
    pub company_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[serde(default = "default_plan")]
    #[validate(length(min = 1, max = 50))]
    pub plan: String,
    #[serde(default)]
    pub monthly_payment: Decimal,
}

fn default_plan() -> String {
    "starter".to_string()
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub plan: Option<String>,
    pub monthly_payment: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeStatusRequest {
    pub status: CompanyStatus,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePlanPaymentRequest {
    pub amount: Decimal,
    #[serde(default = "default_currency")]
    #[validate(length(equal = 3))]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Public signup: trial company plus its owner.
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> Result<(StatusCode, Json<SignupOutcome>), AppError> {
    payload.validate()?;

    let outcome = companies::signup(
        state.store.as_ref(),
        Signup {
            company_name: payload.company_name.trim().to_string(),
            email: payload.email.trim().to_string(),
            full_name: payload.full_name.trim().to_string(),
            phone: payload.phone,
            address: payload.address,
            plan: payload.plan,
            monthly_payment: payload.monthly_payment,
        },
        state.config.billing.trial_days,
    )
    .await?;

    state
        .activity
        .log(NewActivity {
            company_id: outcome.company.company_id,
            user_id: Some(outcome.owner.user_id),
            entity_type: EntityType::Company,
            entity_id: outcome.company.company_id,
            action: "signed_up".to_string(),
            details: Some(json!({ "plan": outcome.company.plan })),
        })
        .await;

    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_company(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<Company>, AppError> {
    let company = state
        .store
        .get_company(ctx.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))?;
    Ok(Json(company))
}

pub async fn update_company(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<UpdateCompanyRequest>,
) -> Result<Json<Company>, AppError> {
    ctx.require_admin()?;
    payload.validate()?;
    if let Some(amount) = payload.monthly_payment {
        crate::services::tax::validate_amount(amount, "monthly_payment")?;
    }

    let company = state
        .store
        .update_company(
            ctx.company_id,
            &UpdateCompany {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                address: payload.address,
                plan: payload.plan,
                monthly_payment: payload.monthly_payment,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))?;

    state
        .activity
        .log(ctx.activity(EntityType::Company, company.company_id, "updated"))
        .await;

    Ok(Json(company))
}

pub async fn change_status(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<ChangeStatusRequest>,
) -> Result<Json<Company>, AppError> {
    ctx.require_admin()?;

    let before = state
        .store
        .get_company(ctx.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))?;

    let company = companies::change_status(state.store.as_ref(), ctx.company_id, payload.status)
        .await?;

    if before.status != company.status {
        let mut entry = ctx.activity(EntityType::Company, company.company_id, "status_changed");
        entry.details = Some(json!({ "from": before.status, "to": company.status }));
        state.activity.log(entry).await;
    }

    Ok(Json(company))
}

pub async fn list_gateway_payments(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<Vec<GatewayPayment>>, AppError> {
    Ok(Json(state.store.list_gateway_payments(ctx.company_id).await?))
}

pub async fn create_gateway_payment(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreatePlanPaymentRequest>,
) -> Result<(StatusCode, Json<GatewayPayment>), AppError> {
    ctx.require_admin()?;
    payload.validate()?;

    let payment = gateway::create_plan_payment(
        state.store.as_ref(),
        ctx.company_id,
        payload.amount,
        &payload.currency,
    )
    .await?;

    let mut entry = ctx.activity(
        EntityType::GatewayPayment,
        payment.gateway_payment_id,
        "created",
    );
    entry.details = Some(json!({ "order_id": payment.order_id, "amount": payment.amount }));
    state.activity.log(entry).await;

    Ok((StatusCode::CREATED, Json(payment)))
}
