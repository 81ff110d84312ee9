//! Tax rate model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tax rate configuration. Rates are global and always selected explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TaxRate {
    pub tax_rate_id: Uuid,
    pub name: String,
    /// Percentage in `[0, 100]`, e.g. `16` for 16%.
    pub rate: Decimal,
    pub service_id: Option<Uuid>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
}

impl TaxRate {
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.effective_from <= date && self.effective_to.map_or(true, |to| to >= date)
    }
}

/// Input for creating a tax rate.
#[derive(Debug, Clone)]
pub struct CreateTaxRate {
    pub name: String,
    pub rate: Decimal,
    pub service_id: Option<Uuid>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
}

/// Input for updating a tax rate.
#[derive(Debug, Clone, Default)]
pub struct UpdateTaxRate {
    pub name: Option<String>,
    pub rate: Option<Decimal>,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
    pub active: Option<bool>,
}

/// Filter parameters for listing tax rates.
#[derive(Debug, Clone, Default)]
pub struct ListTaxRatesFilter {
    pub active_only: bool,
    pub as_of: Option<NaiveDate>,
    pub service_id: Option<Uuid>,
}

impl ListTaxRatesFilter {
    pub fn matches(&self, rate: &TaxRate) -> bool {
        if self.active_only && !rate.active {
            return false;
        }
        if let Some(as_of) = self.as_of {
            if !rate.is_effective_on(as_of) {
                return false;
            }
        }
        if let Some(service_id) = self.service_id {
            if rate.service_id != Some(service_id) {
                return false;
            }
        }
        true
    }
}
