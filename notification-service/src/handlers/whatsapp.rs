use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Deserialize;
use std::collections::HashMap;
use validator::Validate;

use super::{idempotency_key, TestConnectionRequest, TestConnectionResponse};
use crate::models::DispatchReceipt;
use crate::services::{template, WhatsAppMessage};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct SendWhatsAppRequest {
    #[validate(length(min = 1, max = 32, message = "Phone number must be 1-32 characters"))]
    pub phone_number: String,
    #[validate(length(min = 1, max = 4096, message = "Text must be 1-4096 characters"))]
    pub text: String,
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[tracing::instrument(skip(state, headers, request))]
pub async fn send_whatsapp(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendWhatsAppRequest>,
) -> Result<(StatusCode, Json<DispatchReceipt>), AppError> {
    request.validate()?;
    let key = idempotency_key(&headers)?;

    let message = WhatsAppMessage {
        phone_number: request.phone_number,
        text: template::render(&request.text, &request.variables),
    };

    let receipt = state
        .dispatcher
        .send_whatsapp(message, key.as_deref())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

#[tracing::instrument(skip(state, request))]
pub async fn test_whatsapp(
    State(state): State<AppState>,
    request: Option<Json<TestConnectionRequest>>,
) -> Result<Json<TestConnectionResponse>, AppError> {
    let requested = request.and_then(|Json(r)| r.to);
    let Some(number) = requested.or_else(|| state.config.whatsapp.test_number.clone()) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No test number given and WHATSAPP_TEST_NUMBER is not set"
        )));
    };

    let success = state.dispatcher.test_whatsapp(&number).await;
    Ok(Json(TestConnectionResponse { success }))
}
