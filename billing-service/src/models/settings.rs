//! Per-company settings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_REMINDER_DAYS: i32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CompanySettings {
    pub company_id: Uuid,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
    pub default_tax_rate_id: Option<Uuid>,
    pub reminder_days_before_due: i32,
    pub updated_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertSettings {
    pub company_id: Uuid,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub email_enabled: bool,
    pub whatsapp_enabled: bool,
    pub default_tax_rate_id: Option<Uuid>,
    pub reminder_days_before_due: i32,
}

impl UpsertSettings {
    /// Settings row written for a freshly signed-up company.
    pub fn defaults(company_id: Uuid, sender_name: &str, sender_email: &str) -> Self {
        Self {
            company_id,
            sender_name: Some(sender_name.to_string()),
            sender_email: Some(sender_email.to_string()),
            email_enabled: false,
            whatsapp_enabled: false,
            default_tax_rate_id: None,
            reminder_days_before_due: DEFAULT_REMINDER_DAYS,
        }
    }
}
