//! Company (tenant) model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Company account status. Companies are never deleted; they move between states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyStatus {
    Trial,
    Active,
    Suspended,
    Cancelled,
}

impl CompanyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompanyStatus::Trial => "trial",
            CompanyStatus::Active => "active",
            CompanyStatus::Suspended => "suspended",
            CompanyStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "active" => CompanyStatus::Active,
            "suspended" => CompanyStatus::Suspended,
            "cancelled" => CompanyStatus::Cancelled,
            _ => CompanyStatus::Trial,
        }
    }

    /// `cancelled` is terminal; `trial` can only be left, never re-entered.
    pub fn can_transition_to(&self, next: CompanyStatus) -> bool {
        use CompanyStatus::*;
        matches!(
            (self, next),
            (Trial, Active)
                | (Trial, Suspended)
                | (Trial, Cancelled)
                | (Active, Suspended)
                | (Active, Cancelled)
                | (Suspended, Active)
                | (Suspended, Cancelled)
        )
    }
}

/// Tenant record.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub company_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub plan: String,
    pub status: String,
    pub trial_ends_utc: Option<DateTime<Utc>>,
    pub monthly_payment: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Company {
    pub fn status(&self) -> CompanyStatus {
        CompanyStatus::from_string(&self.status)
    }
}

/// Input for creating a company at signup.
#[derive(Debug, Clone)]
pub struct CreateCompany {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub plan: String,
    pub monthly_payment: Decimal,
    pub trial_ends_utc: Option<DateTime<Utc>>,
}

/// Input for updating the company profile.
#[derive(Debug, Clone, Default)]
pub struct UpdateCompany {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub plan: Option<String>,
    pub monthly_payment: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_terminal() {
        for next in [
            CompanyStatus::Trial,
            CompanyStatus::Active,
            CompanyStatus::Suspended,
        ] {
            assert!(!CompanyStatus::Cancelled.can_transition_to(next));
        }
    }

    #[test]
    fn trial_cannot_be_reentered() {
        assert!(!CompanyStatus::Active.can_transition_to(CompanyStatus::Trial));
        assert!(!CompanyStatus::Suspended.can_transition_to(CompanyStatus::Trial));
    }

    #[test]
    fn suspended_company_can_be_reactivated() {
        assert!(CompanyStatus::Suspended.can_transition_to(CompanyStatus::Active));
    }
}
