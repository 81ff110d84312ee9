//! HTTP handlers for billing-service.
//!
//! Tenant-scoped handlers take a [`crate::middleware::CompanyContext`] and never
//! read or write outside `ctx.company_id`.

pub mod activity;
pub mod clients;
pub mod companies;
pub mod flows;
pub mod invoices;
pub mod payments;
pub mod services;
pub mod settings;
pub mod subscriptions;
pub mod tax_rates;
pub mod users;
pub mod webhook;

use chrono::{NaiveDate, Utc};

/// Calendar date used for due-date comparisons and payment stamps.
pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}
