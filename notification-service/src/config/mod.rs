use secrecy::Secret;
use service_core::config::{self as core_config, get_env, get_flag, get_optional_env};
use service_core::error::AppError;
use service_core::retry::RetryConfig;
use std::time::Duration;

pub const DEFAULT_EMAIL_API_URL: &str = "https://api.mailjet.com/v3.1";

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub email: EmailConfig,
    pub whatsapp: WhatsAppConfig,
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub from_address: String,
    pub from_name: String,
    /// Recipient for `POST /notifications/email/test` when the request names none.
    pub test_recipient: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub api_key: Secret<String>,
    pub test_number: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Retries after the first attempt for transient provider failures.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub http_timeout: Duration,
}

impl DispatchConfig {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_backoff: self.initial_backoff,
            ..RetryConfig::default()
        }
    }
}

impl NotificationConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        let is_prod = common.is_prod();

        let email_enabled = get_flag("EMAIL_ENABLED");
        let whatsapp_enabled = get_flag("WHATSAPP_ENABLED");

        // Provider credentials are only mandatory for channels that are switched on.
        let email_required = is_prod && email_enabled;
        let whatsapp_required = is_prod && whatsapp_enabled;

        let config = NotificationConfig {
            service_name: get_env("SERVICE_NAME", Some("notification-service"), false)?,
            email: EmailConfig {
                api_url: get_env("EMAIL_API_URL", Some(DEFAULT_EMAIL_API_URL), email_required)?,
                api_key: Secret::new(get_env("EMAIL_API_KEY", Some(""), email_required)?),
                secret_key: Secret::new(get_env("EMAIL_SECRET_KEY", Some(""), email_required)?),
                from_address: get_env(
                    "EMAIL_FROM_ADDRESS",
                    Some("billing@example.com"),
                    email_required,
                )?,
                from_name: get_env("EMAIL_FROM_NAME", Some("Billing"), false)?,
                test_recipient: get_optional_env("EMAIL_TEST_RECIPIENT"),
                enabled: email_enabled,
            },
            whatsapp: WhatsAppConfig {
                api_url: get_env("WHATSAPP_API_URL", Some(""), whatsapp_required)?,
                api_key: Secret::new(get_env("WHATSAPP_API_KEY", Some(""), whatsapp_required)?),
                test_number: get_optional_env("WHATSAPP_TEST_NUMBER"),
                enabled: whatsapp_enabled,
            },
            dispatch: DispatchConfig {
                max_retries: parse_or("DISPATCH_MAX_RETRIES", 3)?,
                initial_backoff: Duration::from_millis(parse_or("DISPATCH_INITIAL_BACKOFF_MS", 200)?),
                http_timeout: Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", 10)?),
            },
            common,
        };

        if config.whatsapp.enabled && config.whatsapp.api_url.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WHATSAPP_API_URL is required when WHATSAPP_ENABLED is set"
            )));
        }

        Ok(config)
    }

    /// Configuration for tests: both channels mocked, random port, no backoff.
    pub fn for_tests() -> Self {
        Self {
            common: core_config::Config {
                port: 0,
                log_level: "warn".to_string(),
                ..Default::default()
            },
            service_name: "notification-service-test".to_string(),
            email: EmailConfig {
                api_url: DEFAULT_EMAIL_API_URL.to_string(),
                api_key: Secret::new("test-key".to_string()),
                secret_key: Secret::new("test-secret".to_string()),
                from_address: "billing@example.com".to_string(),
                from_name: "Billing".to_string(),
                test_recipient: Some("ops@example.com".to_string()),
                enabled: false,
            },
            whatsapp: WhatsAppConfig {
                api_url: String::new(),
                api_key: Secret::new("test-key".to_string()),
                test_number: Some("+1 555 0100".to_string()),
                enabled: false,
            },
            dispatch: DispatchConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                http_timeout: Duration::from_secs(5),
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
