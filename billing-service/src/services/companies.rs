//! Company signup and status lifecycle. Companies are never deleted.

use crate::models::{
    Company, CompanySettings, CompanyStatus, CreateCompany, CreateUser, UpsertSettings, User,
    UserRole,
};
use crate::services::store::BillingStore;
use crate::services::tax::validate_amount;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Signup {
    pub company_name: String,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub plan: String,
    pub monthly_payment: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupOutcome {
    pub company: Company,
    pub owner: User,
    pub settings: CompanySettings,
}

/// Create a trial company, its owner and a default settings row.
#[instrument(skip(store, input), fields(company_name = %input.company_name))]
pub async fn signup(
    store: &dyn BillingStore,
    input: Signup,
    trial_days: i64,
) -> Result<SignupOutcome, AppError> {
    validate_amount(input.monthly_payment, "monthly_payment")?;

    if store.find_user_by_email(&input.email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A user with this email already exists"
        )));
    }

    let company = store
        .create_company(&CreateCompany {
            name: input.company_name.clone(),
            email: input.email.clone(),
            phone: input.phone,
            address: input.address,
            plan: input.plan,
            monthly_payment: input.monthly_payment,
            trial_ends_utc: Some(Utc::now() + Duration::days(trial_days)),
        })
        .await?;

    let owner = store
        .create_user(&CreateUser {
            company_id: company.company_id,
            email: input.email.clone(),
            full_name: input.full_name,
            role: UserRole::Owner,
        })
        .await?;

    let settings = store
        .upsert_settings(&UpsertSettings::defaults(
            company.company_id,
            &input.company_name,
            &input.email,
        ))
        .await?;

    info!(
        company_id = %company.company_id,
        owner_id = %owner.user_id,
        trial_ends_utc = ?company.trial_ends_utc,
        "Company signed up"
    );

    Ok(SignupOutcome {
        company,
        owner,
        settings,
    })
}

/// Move a company to `next`, enforcing the lifecycle. Re-applying the current
/// status is a no-op.
#[instrument(skip(store), fields(company_id = %company_id, next = next.as_str()))]
pub async fn change_status(
    store: &dyn BillingStore,
    company_id: Uuid,
    next: CompanyStatus,
) -> Result<Company, AppError> {
    let company = store
        .get_company(company_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))?;

    let current = company.status();
    if current == next {
        return Ok(company);
    }
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Company cannot move from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    store
        .set_company_status(company_id, next)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Company not found")))
}
