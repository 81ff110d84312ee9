//! Service catalog model (what a company sells to its clients).

use chrono::{DateTime, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing cadence of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Quarterly,
    Annual,
    OneTime,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Quarterly => "quarterly",
            BillingCycle::Annual => "annual",
            BillingCycle::OneTime => "one_time",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "quarterly" => BillingCycle::Quarterly,
            "annual" => BillingCycle::Annual,
            "one_time" => BillingCycle::OneTime,
            _ => BillingCycle::Monthly,
        }
    }

    /// Next billing date after `from`, or `None` when the cycle does not recur.
    ///
    /// Month arithmetic clamps to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).
    pub fn next_billing_date(&self, from: NaiveDate) -> Option<NaiveDate> {
        let months = match self {
            BillingCycle::Monthly => 1,
            BillingCycle::Quarterly => 3,
            BillingCycle::Annual => 12,
            BillingCycle::OneTime => return None,
        };
        from.checked_add_months(Months::new(months))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Service {
    pub service_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub billing_cycle: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Service {
    pub fn billing_cycle(&self) -> BillingCycle {
        BillingCycle::from_string(&self.billing_cycle)
    }
}

#[derive(Debug, Clone)]
pub struct CreateService {
    pub company_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Decimal,
    pub billing_cycle: BillingCycle,
    pub active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateService {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub billing_cycle: Option<BillingCycle>,
    pub active: Option<bool>,
}

/// Filter parameters for listing services.
#[derive(Debug, Clone, Default)]
pub struct ListServicesFilter {
    pub active: Option<bool>,
    pub category: Option<String>,
}

impl ListServicesFilter {
    pub fn matches(&self, service: &Service) -> bool {
        if let Some(active) = self.active {
            if service.active != active {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if service.category.as_deref() != Some(category.as_str()) {
                return false;
            }
        }
        true
    }
}
