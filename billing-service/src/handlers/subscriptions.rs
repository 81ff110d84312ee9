use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;

use crate::{
    handlers::{invoices::InvoiceView, today},
    middleware::CompanyContext,
    models::{
        CreateSubscription, EntityType, ListSubscriptionsFilter, Subscription,
        SubscriptionStatus, UpdateSubscription,
    },
    services::invoicing,
    startup::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<SubscriptionStatus>,
    pub client_id: Option<Uuid>,
    pub due_on_or_before: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSubscriptionRequest {
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    /// Defaults to `start_date`.
    pub next_billing_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub status: Option<SubscriptionStatus>,
    pub end_date: Option<NaiveDate>,
    pub next_billing_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct BillSubscriptionRequest {
    pub tax_rate_id: Option<Uuid>,
    pub due_in_days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BillSubscriptionResponse {
    pub invoice: InvoiceView,
    pub subscription: Subscription,
}

fn subscription_not_found() -> AppError {
    AppError::NotFound(anyhow::anyhow!("Subscription not found"))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Query(query): Query<ListSubscriptionsQuery>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    let filter = ListSubscriptionsFilter {
        status: query.status,
        client_id: query.client_id,
        due_on_or_before: query.due_on_or_before,
    };
    Ok(Json(
        state
            .store
            .list_subscriptions(ctx.company_id, &filter)
            .await?,
    ))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Json(payload): Json<CreateSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    if let Some(end_date) = payload.end_date {
        if end_date < payload.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "end_date cannot be before start_date"
            )));
        }
    }

    state
        .store
        .get_client(ctx.company_id, payload.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;
    let service = state
        .store
        .get_service(ctx.company_id, payload.service_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Service not found")))?;
    if !service.active {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Cannot subscribe to an inactive service"
        )));
    }

    let subscription = state
        .store
        .create_subscription(&CreateSubscription {
            company_id: ctx.company_id,
            client_id: payload.client_id,
            service_id: payload.service_id,
            start_date: payload.start_date,
            end_date: payload.end_date,
            next_billing_date: Some(payload.next_billing_date.unwrap_or(payload.start_date)),
        })
        .await?;

    state
        .activity
        .log(ctx.activity(
            EntityType::Subscription,
            subscription.subscription_id,
            "created",
        ))
        .await;

    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn get_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let subscription = state
        .store
        .get_subscription(ctx.company_id, subscription_id)
        .await?
        .ok_or_else(subscription_not_found)?;
    Ok(Json(subscription))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<UpdateSubscriptionRequest>,
) -> Result<Json<Subscription>, AppError> {
    let current = state
        .store
        .get_subscription(ctx.company_id, subscription_id)
        .await?
        .ok_or_else(subscription_not_found)?;

    if current.status() == SubscriptionStatus::Cancelled {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Cancelled subscriptions cannot be modified"
        )));
    }
    if let Some(end_date) = payload.end_date {
        if end_date < current.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "end_date cannot be before start_date"
            )));
        }
    }

    let subscription = state
        .store
        .update_subscription(
            ctx.company_id,
            subscription_id,
            &UpdateSubscription {
                status: payload.status,
                end_date: payload.end_date,
                next_billing_date: payload.next_billing_date.map(Some),
            },
        )
        .await?
        .ok_or_else(subscription_not_found)?;

    state
        .activity
        .log(ctx.activity(
            EntityType::Subscription,
            subscription.subscription_id,
            "updated",
        ))
        .await;

    Ok(Json(subscription))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(subscription_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if !state
        .store
        .delete_subscription(ctx.company_id, subscription_id)
        .await?
    {
        return Err(subscription_not_found());
    }

    state
        .activity
        .log(ctx.activity(EntityType::Subscription, subscription_id, "deleted"))
        .await;

    Ok(StatusCode::NO_CONTENT)
}

/// active|expired -> cancelled; clears the next billing date.
pub async fn cancel_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, AppError> {
    let current = state
        .store
        .get_subscription(ctx.company_id, subscription_id)
        .await?
        .ok_or_else(subscription_not_found)?;

    if current.status() == SubscriptionStatus::Cancelled {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "Subscription is already cancelled"
        )));
    }

    let subscription = state
        .store
        .update_subscription(
            ctx.company_id,
            subscription_id,
            &UpdateSubscription {
                status: Some(SubscriptionStatus::Cancelled),
                end_date: None,
                next_billing_date: Some(None),
            },
        )
        .await?
        .ok_or_else(subscription_not_found)?;

    state
        .activity
        .log(ctx.activity(
            EntityType::Subscription,
            subscription.subscription_id,
            "cancelled",
        ))
        .await;

    Ok(Json(subscription))
}

/// Billing run for a single subscription.
pub async fn bill_subscription(
    State(state): State<AppState>,
    ctx: CompanyContext,
    Path(subscription_id): Path<Uuid>,
    Json(payload): Json<BillSubscriptionRequest>,
) -> Result<(StatusCode, Json<BillSubscriptionResponse>), AppError> {
    let today = today();
    let (invoice, subscription) = invoicing::bill_subscription(
        state.store.as_ref(),
        ctx.company_id,
        subscription_id,
        payload.tax_rate_id,
        payload
            .due_in_days
            .unwrap_or(state.config.billing.default_due_days),
        today,
    )
    .await?;

    let mut entry = ctx.activity(EntityType::Invoice, invoice.invoice_id, "created");
    entry.details = Some(json!({
        "invoice_number": invoice.invoice_number,
        "subscription_id": subscription.subscription_id,
        "total_amount": invoice.total_amount,
    }));
    state.activity.log(entry).await;
    state
        .activity
        .log(ctx.activity(
            EntityType::Subscription,
            subscription.subscription_id,
            "billed",
        ))
        .await;

    Ok((
        StatusCode::CREATED,
        Json(BillSubscriptionResponse {
            invoice: InvoiceView::new(invoice, today),
            subscription,
        }),
    ))
}
