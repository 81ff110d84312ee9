//! Subscription model: a client subscribed to one of the company's services.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "expired" => SubscriptionStatus::Expired,
            "cancelled" => SubscriptionStatus::Cancelled,
            _ => SubscriptionStatus::Active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    pub subscription_id: Uuid,
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub status: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_billing_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Subscription {
    pub fn status(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_string(&self.status)
    }
}

#[derive(Debug, Clone)]
pub struct CreateSubscription {
    pub company_id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub next_billing_date: Option<NaiveDate>,
}

/// Input for updating a subscription.
///
/// `next_billing_date` uses a nested option so a one-time billing run can clear it.
#[derive(Debug, Clone, Default)]
pub struct UpdateSubscription {
    pub status: Option<SubscriptionStatus>,
    pub end_date: Option<NaiveDate>,
    pub next_billing_date: Option<Option<NaiveDate>>,
}

/// Filter parameters for listing subscriptions.
#[derive(Debug, Clone, Default)]
pub struct ListSubscriptionsFilter {
    pub status: Option<SubscriptionStatus>,
    pub client_id: Option<Uuid>,
    /// Only subscriptions whose next billing date is on or before this day.
    pub due_on_or_before: Option<NaiveDate>,
}

impl ListSubscriptionsFilter {
    pub fn matches(&self, sub: &Subscription) -> bool {
        if let Some(status) = self.status {
            if sub.status != status.as_str() {
                return false;
            }
        }
        if let Some(client_id) = self.client_id {
            if sub.client_id != client_id {
                return false;
            }
        }
        if let Some(due) = self.due_on_or_before {
            match sub.next_billing_date {
                Some(next) if next <= due => {}
                _ => return false,
            }
        }
        true
    }
}
