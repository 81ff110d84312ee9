//! Application startup and lifecycle management.

use crate::config::NotificationConfig;
use crate::handlers::{self, email, whatsapp};
use crate::services::{
    init_metrics, Dispatcher, EmailProvider, MailjetProvider, MessagingProvider,
    MockEmailProvider, MockMessagingProvider, WhatsAppProvider,
};
use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics::metrics_middleware, tracing::request_id_middleware};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: NotificationConfig,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Wire providers from configuration; disabled channels get mocks.
    pub fn from_config(config: NotificationConfig) -> Result<Self, AppError> {
        let timeout = config.dispatch.http_timeout;

        let email_provider: Arc<dyn EmailProvider> = if config.email.enabled {
            tracing::info!(api_url = %config.email.api_url, "Mailjet email provider initialized");
            Arc::new(
                MailjetProvider::new(config.email.clone(), timeout)
                    .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?,
            )
        } else {
            tracing::info!("Email channel disabled, using mock email provider");
            Arc::new(MockEmailProvider::new())
        };

        let whatsapp_provider: Arc<dyn MessagingProvider> = if config.whatsapp.enabled {
            tracing::info!(api_url = %config.whatsapp.api_url, "WhatsApp provider initialized");
            Arc::new(
                WhatsAppProvider::new(config.whatsapp.clone(), timeout)
                    .map_err(|e| AppError::ConfigError(anyhow::anyhow!("{}", e)))?,
            )
        } else {
            tracing::info!("WhatsApp channel disabled, using mock messaging provider");
            Arc::new(MockMessagingProvider::new())
        };

        let dispatcher = Dispatcher::new(
            email_provider,
            whatsapp_provider,
            config.dispatch.retry_config(),
        );

        Ok(Self { config, dispatcher })
    }
}

/// Build the HTTP router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/notifications/email", post(email::send_email))
        .route("/notifications/email/test", post(email::test_email))
        .route("/notifications/whatsapp", post(whatsapp::send_whatsapp))
        .route("/notifications/whatsapp/test", post(whatsapp::test_whatsapp))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn(metrics_middleware))
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: NotificationConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config)?;
        Self::build_with_state(state).await
    }

    /// Build around prepared state, e.g. with providers pointed at test servers.
    pub async fn build_with_state(state: AppState) -> Result<Self, AppError> {
        init_metrics();

        // Port 0 = random port for testing
        let http_addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", http_addr, e);
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!("Notification service listening on port {}", http_port);

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.http_listener, router(self.state)).await
    }
}
