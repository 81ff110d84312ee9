use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{CreateUser, EntityType, UpdateUser, User, UserRole},
    startup::AppState,
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    pub role: UserRole,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    pub role: Option<UserRole>,
    pub active: Option<bool>,
}

fn user_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("User not found"))
}

pub async fn list_users(
    State(state): State<AppState>,
    ctx: CompanyContext,
) -> Result<Json<Vec<User>>, AppError> {
    Ok(Json(state.store.list_users(ctx.company_id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    ctx.require_admin()?;
    payload.validate()?;

    if payload.role == UserRole::Owner && ctx.role != UserRole::Owner {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Only an owner can add another owner"
        )));
    }

    let email = payload.email.trim().to_string();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A user with this email already exists"
        )));
    }

    let user = state
        .store
        .create_user(&CreateUser {
            company_id: ctx.company_id,
            email,
            full_name: payload.full_name.trim().to_string(),
            role: payload.role,
        })
        .await?;

    let mut entry = ctx.activity(EntityType::User, user.user_id, "created");
    entry.details = Some(json!({ "role": user.role }));
    state.activity.log(entry).await;

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_user(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(user_id): Path<Uuid>,
) -> Result<Json<User>, AppError> {
    let user = state
        .store
        .get_user(ctx.company_id, user_id)
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<User>, AppError> {
    ctx.require_admin()?;
    payload.validate()?;

    let user = state
        .store
        .update_user(
            ctx.company_id,
            user_id,
            &UpdateUser {
                full_name: payload.full_name,
                role: payload.role,
                active: payload.active,
            },
        )
        .await?
        .ok_or_else(user_not_found)?;

    state
        .activity
        .log(ctx.activity(EntityType::User, user.user_id, "updated"))
        .await;

    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    ctx.require_admin()?;
    if user_id == ctx.user_id {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "You cannot delete your own user"
        )));
    }

    if !state.store.delete_user(ctx.company_id, user_id).await? {
        return Err(user_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::User, user_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}
