//! Payment-gateway callback.
//!
//! POST applies the outcome, OPTIONS answers CORS preflight. Other methods get
//! 405 from the router.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use secrecy::ExposeSecret;
use serde_json::json;
use service_core::error::AppError;

use crate::{
    models::{EntityType, NewActivity},
    services::{
        gateway::{self, SIGNATURE_HEADER},
        record_error, record_webhook_event,
    },
    startup::AppState,
};

const ALLOWED_HEADERS: &str = "authorization, x-client-info, apikey, content-type, x-gateway-signature";

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    response
}

pub async fn preflight() -> Response {
    with_cors(StatusCode::OK.into_response())
}

pub async fn receive(State(state): State<AppState>, headers: HeaderMap, body: String) -> Response {
    match handle(&state, &headers, &body).await {
        Ok(response) => with_cors(response),
        Err(e) => {
            record_error(e.kind(), "gateway_webhook");
            with_cors(e.into_response())
        }
    }
}

async fn handle(state: &AppState, headers: &HeaderMap, body: &str) -> Result<Response, AppError> {
    if let Some(secret) = &state.config.gateway.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("Missing gateway signature header");
                record_webhook_event("unauthorized");
                AppError::Unauthorized(anyhow::anyhow!("Missing webhook signature"))
            })?;

        if !gateway::verify_signature(secret.expose_secret(), body.as_bytes(), signature) {
            tracing::warn!("Invalid gateway webhook signature");
            record_webhook_event("unauthorized");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid webhook signature"
            )));
        }
    }

    let settlement = gateway::process_callback(state.store.as_ref(), body).await?;
    let payment = &settlement.payment;

    if settlement.company_activated {
        state
            .activity
            .log(NewActivity {
                company_id: payment.company_id,
                user_id: None,
                entity_type: EntityType::Company,
                entity_id: payment.company_id,
                action: "activated".to_string(),
                details: Some(json!({ "order_id": payment.order_id })),
            })
            .await;
    }

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "order_id": payment.order_id,
            "status": payment.status,
            "company_activated": settlement.company_activated,
        })),
    )
        .into_response())
}
