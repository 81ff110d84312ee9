use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::{
    middleware::CompanyContext,
    models::{
        Client, ClientStatus, CreateClient, EntityType, ListClientsFilter, Segment, UpdateClient,
    },
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListClientsQuery {
    pub status: Option<ClientStatus>,
    pub segment: Option<Segment>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[serde(default = "default_status")]
    pub status: ClientStatus,
    pub segment: Option<Segment>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

fn default_status() -> ClientStatus {
    ClientStatus::Active
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    pub status: Option<ClientStatus>,
    pub segment: Option<Segment>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

fn client_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Client not found"))
}

pub async fn list_clients(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<ListClientsQuery>,
) -> Result<Json<Vec<Client>>, AppError> {
    let filter = ListClientsFilter {
        status: query.status,
        segment: query.segment,
        search: query
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty()),
    };
    Ok(Json(state.store.list_clients(ctx.company_id, &filter).await?))
}

pub async fn create_client(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateClientRequest>,
) -> Result<(StatusCode, Json<Client>), AppError> {
    payload.validate()?;

    let client = state
        .store
        .create_client(&CreateClient {
            company_id: ctx.company_id,
            name: payload.name.trim().to_string(),
            email: payload.email,
            phone: payload.phone,
            address: payload.address,
            status: payload.status,
            segment: payload.segment,
            notes: payload.notes,
        })
        .await?;

    state
        .activity
        .log(ctx.activity(EntityType::Client, client.client_id, "created"))
        .await;

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<Client>, AppError> {
    let client = state
        .store
        .get_client(ctx.company_id, client_id)
        .await?
        .ok_or_else(client_not_found)?;
    Ok(Json(client))
}

pub async fn update_client(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<UpdateClientRequest>,
) -> Result<Json<Client>, AppError> {
    payload.validate()?;

    let client = state
        .store
        .update_client(
            ctx.company_id,
            client_id,
            &UpdateClient {
                name: payload.name,
                email: payload.email,
                phone: payload.phone,
                address: payload.address,
                status: payload.status,
                segment: payload.segment,
                notes: payload.notes,
            },
        )
        .await?
        .ok_or_else(client_not_found)?;

    state
        .activity
        .log(ctx.activity(EntityType::Client, client.client_id, "updated"))
        .await;

    Ok(Json(client))
}

/// Clients with subscriptions or invoices cannot be deleted (409).
pub async fn delete_client(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(client_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state.store.delete_client(ctx.company_id, client_id).await? {
        return Err(client_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::Client, client_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}
