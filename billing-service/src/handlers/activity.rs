use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    middleware::CompanyContext,
    models::{ActivityLog, EntityType},
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

pub async fn recent(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityLog>>, AppError> {
    Ok(Json(state.activity.recent(ctx.company_id, query.limit).await?))
}

pub async fn by_entity(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path((entity_type, entity_id)): Path<(String, Uuid)>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityLog>>, AppError> {
    let entity_type = EntityType::parse(&entity_type).ok_or_else(|| {
        AppError::BadRequest(anyhow::anyhow!("Unknown entity type: {}", entity_type))
    })?;

    Ok(Json(
        state
            .activity
            .for_entity(ctx.company_id, entity_type, entity_id, query.limit)
            .await?,
    ))
}

pub async fn by_user(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(user_id): Path<Uuid>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Vec<ActivityLog>>, AppError> {
    Ok(Json(
        state
            .activity
            .for_user(ctx.company_id, user_id, query.limit)
            .await?,
    ))
}
