use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
use serde::Deserialize;
use std::collections::HashMap;
use validator::Validate;

use super::{idempotency_key, TestConnectionRequest, TestConnectionResponse};
use crate::models::DispatchReceipt;
use crate::services::{template, EmailMessage};
use crate::startup::AppState;
use service_core::error::AppError;

#[derive(Debug, Deserialize, Validate)]
pub struct SendEmailRequest {
    #[validate(email(message = "Invalid email address"))]
    pub to: String,
    pub to_name: Option<String>,
    #[validate(length(min = 1, max = 998, message = "Subject must be 1-998 characters"))]
    pub subject: String,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Values for `{{name}}` placeholders in the subject and bodies.
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

#[tracing::instrument(skip(state, headers, request))]
pub async fn send_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SendEmailRequest>,
) -> Result<(StatusCode, Json<DispatchReceipt>), AppError> {
    request.validate()?;
    let key = idempotency_key(&headers)?;

    if request.body_html.is_none() && request.body_text.is_none() {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "At least one of body_html or body_text must be provided"
        )));
    }

    let vars = &request.variables;
    let message = EmailMessage {
        to: request.to.clone(),
        to_name: request.to_name.clone(),
        subject: template::render(&request.subject, vars),
        body_text: request.body_text.as_deref().map(|t| template::render(t, vars)),
        body_html: request.body_html.as_deref().map(|t| template::render(t, vars)),
    };

    let receipt = state
        .dispatcher
        .send_email(message, key.as_deref())
        .await?;

    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

#[tracing::instrument(skip(state, request))]
pub async fn test_email(
    State(state): State<AppState>,
    request: Option<Json<TestConnectionRequest>>,
) -> Result<Json<TestConnectionResponse>, AppError> {
    let requested = request.and_then(|Json(r)| r.to);
    let Some(recipient) = requested.or_else(|| state.config.email.test_recipient.clone()) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "No test recipient given and EMAIL_TEST_RECIPIENT is not set"
        )));
    };

    let success = state.dispatcher.test_email(&recipient).await;
    Ok(Json(TestConnectionResponse { success }))
}
