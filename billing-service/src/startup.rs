//! Application startup and lifecycle management.

use crate::config::BillingConfig;
use crate::handlers::{
    activity, clients, companies, flows, invoices, payments, services, settings, subscriptions,
    tax_rates, users, webhook,
};
use crate::services::{get_metrics, init_metrics, ActivityLogger, BillingStore, MemoryStore, PgStore};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: BillingConfig,
    pub store: Arc<dyn BillingStore>,
    pub activity: ActivityLogger,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": state.config.service_name,
                    "version": state.config.service_version,
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

/// Build the HTTP router over the given state.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Companies
        .route("/signup", post(companies::signup))
        .route(
            "/company",
            get(companies::get_company).put(companies::update_company),
        )
        .route("/company/status", post(companies::change_status))
        .route(
            "/company/gateway-payments",
            get(companies::list_gateway_payments).post(companies::create_gateway_payment),
        )
        // Users
        .route("/users", get(users::list_users).post(users::create_user))
        .route(
            "/users/:user_id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Clients
        .route(
            "/clients",
            get(clients::list_clients).post(clients::create_client),
        )
        .route(
            "/clients/:client_id",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        // Services
        .route(
            "/services",
            get(services::list_services).post(services::create_service),
        )
        .route(
            "/services/:service_id",
            get(services::get_service)
                .put(services::update_service)
                .delete(services::delete_service),
        )
        // Subscriptions
        .route(
            "/subscriptions",
            get(subscriptions::list_subscriptions).post(subscriptions::create_subscription),
        )
        .route(
            "/subscriptions/:subscription_id",
            get(subscriptions::get_subscription)
                .put(subscriptions::update_subscription)
                .delete(subscriptions::delete_subscription),
        )
        .route(
            "/subscriptions/:subscription_id/cancel",
            post(subscriptions::cancel_subscription),
        )
        .route(
            "/subscriptions/:subscription_id/invoice",
            post(subscriptions::bill_subscription),
        )
        // Tax
        .route(
            "/tax-rates",
            get(tax_rates::list_tax_rates).post(tax_rates::create_tax_rate),
        )
        .route(
            "/tax-rates/:tax_rate_id",
            get(tax_rates::get_tax_rate)
                .put(tax_rates::update_tax_rate)
                .delete(tax_rates::delete_tax_rate),
        )
        .route("/tax/calculate", post(tax_rates::calculate))
        // Invoices
        .route(
            "/invoices",
            get(invoices::list_invoices).post(invoices::create_invoice),
        )
        .route("/invoices/next-number", get(invoices::next_invoice_number))
        .route(
            "/invoices/:invoice_id",
            get(invoices::get_invoice)
                .put(invoices::update_invoice)
                .delete(invoices::delete_invoice),
        )
        .route("/invoices/:invoice_id/cancel", post(invoices::cancel_invoice))
        // Payments
        .route(
            "/payments",
            get(payments::list_payments).post(payments::create_payment),
        )
        .route("/payments/:payment_id", get(payments::get_payment))
        .route(
            "/payments/:payment_id/complete",
            post(payments::complete_payment),
        )
        .route("/payments/:payment_id/fail", post(payments::fail_payment))
        // Activity
        .route("/activity", get(activity::recent))
        .route(
            "/activity/entity/:entity_type/:entity_id",
            get(activity::by_entity),
        )
        .route("/activity/user/:user_id", get(activity::by_user))
        // Settings
        .route(
            "/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        // Flows
        .route("/flows", get(flows::list_flows).post(flows::create_flow))
        .route(
            "/flows/:flow_id",
            get(flows::get_flow)
                .put(flows::update_flow)
                .delete(flows::delete_flow),
        )
        // Gateway callback
        .route(
            "/webhooks/payment-gateway",
            post(webhook::receive).options(webhook::preflight),
        )
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    http_port: u16,
    http_listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application, connecting to the configured store.
    ///
    /// A `memory://` database URL selects the in-process store; anything else
    /// is treated as a Postgres URL and migrated on startup.
    pub async fn build(config: BillingConfig) -> Result<Self, AppError> {
        let store = connect_store(&config).await?;
        Self::build_with_store(config, store).await
    }

    /// Build the application over an existing store.
    pub async fn build_with_store(
        config: BillingConfig,
        store: Arc<dyn BillingStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let state = AppState {
            activity: ActivityLogger::new(store.clone()),
            config: config.clone(),
            store,
        };

        let http_addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let http_listener = TcpListener::bind(http_addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %http_addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let http_port = http_listener.local_addr()?.port();

        tracing::info!(http_port = http_port, "Billing service listener bound");

        Ok(Self {
            http_port,
            http_listener,
            state,
        })
    }

    /// Get the HTTP port the server is listening on.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Get a handle to the store backing this application.
    pub fn store(&self) -> Arc<dyn BillingStore> {
        self.state.store.clone()
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            http_port = self.http_port,
            "Service ready to accept connections"
        );

        let router = router(self.state);
        axum::serve(self.http_listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}

/// Open the store named by `DATABASE_URL`.
pub async fn connect_store(config: &BillingConfig) -> Result<Arc<dyn BillingStore>, AppError> {
    if config.database.is_memory() {
        tracing::warn!("Using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::new(
        config.database.url.expose_secret(),
        config.database.max_connections,
        config.database.min_connections,
    )
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "Failed to connect to PostgreSQL");
        e
    })?;

    store.run_migrations().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to run migrations");
        e
    })?;

    Ok(Arc::new(store))
}
