use axum::{extract::State, Json};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{CompanySettings, EntityType, UpsertSettings, DEFAULT_REMINDER_DAYS},
    startup::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct SettingsRequest {
    #[validate(length(max = 200))]
    pub sender_name: Option<String>,
    #[validate(email)]
    pub sender_email: Option<String>,
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default)]
    pub whatsapp_enabled: bool,
    pub default_tax_rate_id: Option<Uuid>,
    #[serde(default = "default_reminder_days")]
    #[validate(range(min = 0, max = 90))]
    pub reminder_days_before_due: i32,
}

fn default_reminder_days() -> i32 {
    DEFAULT_REMINDER_DAYS
}

pub async fn get_settings(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<CompanySettings>, AppError> {
    let settings = state
        .store
        .get_settings(ctx.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("settings not found")))?;
    Ok(Json(settings))
}

pub async fn put_settings(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<CompanySettings>, AppError> {
    ctx.require_admin()?;
    payload.validate()?;

    if payload.email_enabled && payload.sender_email.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "sender_email is required when email is enabled"
        )));
    }
    if let Some(tax_rate_id) = payload.default_tax_rate_id {
        if state.store.get_tax_rate(tax_rate_id).await?.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "default_tax_rate_id does not reference a tax rate"
            )));
        }
    }

    let settings = state
        .store
        .upsert_settings(&UpsertSettings {
            company_id: ctx.company_id,
            sender_name: payload.sender_name,
            sender_email: payload.sender_email,
            email_enabled: payload.email_enabled,
            whatsapp_enabled: payload.whatsapp_enabled,
            default_tax_rate_id: payload.default_tax_rate_id,
            reminder_days_before_due: payload.reminder_days_before_due,
        })
        .await?;

    state
        .activity
        .log(ctx.activity(EntityType::Settings, ctx.company_id, "updated"))
        .await;

    Ok(Json(settings))
}
