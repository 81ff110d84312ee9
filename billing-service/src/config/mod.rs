//! Configuration module for billing-service.

use secrecy::{ExposeSecret, Secret};
use service_core::config::{self as core_config, get_env, get_optional_env};
use service_core::error::AppError;

/// `DATABASE_URL` prefix selecting the in-process store.
pub const MEMORY_DATABASE_URL: &str = "memory://";

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub database: DatabaseConfig,
    pub billing: BillingSettings,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl DatabaseConfig {
    pub fn is_memory(&self) -> bool {
        self.url.expose_secret().starts_with(MEMORY_DATABASE_URL)
    }
}

#[derive(Debug, Clone)]
pub struct BillingSettings {
    /// Length of the trial granted at signup.
    pub trial_days: i64,
    /// Default due period for invoices raised from subscriptions.
    pub default_due_days: i64,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// When set, webhook bodies must carry a matching `X-Gateway-Signature`.
    pub webhook_secret: Option<Secret<String>>,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        Ok(Self {
            service_name: get_env("SERVICE_NAME", Some("billing-service"), false)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), false)?,
            database: DatabaseConfig {
                url: Secret::new(get_env("DATABASE_URL", Some(MEMORY_DATABASE_URL), is_prod)?),
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_or("DATABASE_MIN_CONNECTIONS", 2)?,
            },
            billing: BillingSettings {
                trial_days: parse_or("TRIAL_DAYS", 14)?,
                default_due_days: parse_or("INVOICE_DUE_DAYS", 15)?,
            },
            gateway: GatewayConfig {
                webhook_secret: get_optional_env("GATEWAY_WEBHOOK_SECRET").map(Secret::new),
            },
            common,
        })
    }

    /// Configuration for tests: in-memory store, random port.
    pub fn for_tests() -> Self {
        Self {
            common: core_config::Config {
                port: 0,
                log_level: "warn".to_string(),
                ..Default::default()
            },
            service_name: "billing-service-test".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseConfig {
                url: Secret::new(MEMORY_DATABASE_URL.to_string()),
                max_connections: 1,
                min_connections: 1,
            },
            billing: BillingSettings {
                trial_days: 14,
                default_due_days: 15,
            },
            gateway: GatewayConfig {
                webhook_secret: None,
            },
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, AppError> {
    match get_optional_env(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value: {}", key, raw))
        }),
        None => Ok(default),
    }
}
