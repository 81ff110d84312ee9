//! Services module for billing-service.

pub mod activity;
pub mod companies;
pub mod database;
pub mod gateway;
pub mod invoicing;
pub mod memory;
pub mod metrics;
pub mod numbering;
pub mod payments;
pub mod store;
pub mod tax;

pub use activity::ActivityLogger;
pub use database::PgStore;
pub use memory::MemoryStore;
pub use metrics::{
    get_metrics, init_metrics, record_activity_failure, record_error, record_invoice_created,
    record_payment, record_webhook_event,
};
pub use store::BillingStore;
pub use tax::{calculate_tax, TaxCalculation};
