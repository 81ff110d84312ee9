//! billing-service: tenant-scoped billing, invoicing and payment tracking.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
