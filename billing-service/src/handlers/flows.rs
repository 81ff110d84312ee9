//! Automation flows are stored and validated here; nothing runs them.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{validate_steps, CreateFlow, EntityType, Flow, FlowStep, UpdateFlow},
    startup::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFlowRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default = "default_active")]
    pub active: bool,
    pub steps: Vec<FlowStep>,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateFlowRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub active: Option<bool>,
    pub steps: Option<Vec<FlowStep>>,
}

fn flow_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Flow not found"))
}

fn check_steps(steps: &[FlowStep]) -> Result<(), AppError> {
    validate_steps(steps).map_err(|msg| AppError::BadRequest(anyhow::anyhow!(msg)))
}

pub async fn list_flows(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<Vec<Flow>>, AppError> {
    Ok(Json(state.store.list_flows(ctx.company_id).await?))
}

pub async fn create_flow(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateFlowRequest>,
) -> Result<(StatusCode, Json<Flow>), AppError> {
    payload.validate()?;
    check_steps(&payload.steps)?;

    let flow = state
        .store
        .create_flow(&CreateFlow {
            company_id: ctx.company_id,
            name: payload.name.trim().to_string(),
            active: payload.active,
            steps: payload.steps,
        })
        .await?;

    state
        .activity
        .log(ctx.activity(EntityType::Flow, flow.flow_id, "created"))
        .await;

    Ok((StatusCode::CREATED, Json(flow)))
}

pub async fn get_flow(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(flow_id): Path<Uuid>,
) -> Result<Json<Flow>, AppError> {
    let flow = state
        .store
        .get_flow(ctx.company_id, flow_id)
        .await?
        .ok_or_else(flow_not_found)?;
    Ok(Json(flow))
}

pub async fn update_flow(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(flow_id): Path<Uuid>,
    Json(payload): Json<UpdateFlowRequest>,
) -> Result<Json<Flow>, AppError> {
    payload.validate()?;
    if let Some(steps) = &payload.steps {
        check_steps(steps)?;
    }

    let flow = state
        .store
        .update_flow(
            ctx.company_id,
            flow_id,
            &UpdateFlow {
                name: payload.name,
                active: payload.active,
                steps: payload.steps,
            },
        )
        .await?
        .ok_or_else(flow_not_found)?;

    state
        .activity
        .log(ctx.activity(EntityType::Flow, flow.flow_id, "updated"))
        .await;

    Ok(Json(flow))
}

pub async fn delete_flow(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(flow_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_flow(ctx.company_id, flow_id).await? {
        return Err(flow_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::Flow, flow_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}
