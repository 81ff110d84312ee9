//! Append-only activity log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const DEFAULT_ACTIVITY_LIMIT: i64 = 50;
pub const MAX_ACTIVITY_LIMIT: i64 = 200;

/// Kind of record an activity entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Company,
    User,
    Client,
    Service,
    Subscription,
    TaxRate,
    Invoice,
    Payment,
    GatewayPayment,
    Settings,
    Flow,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::User => "user",
            EntityType::Client => "client",
            EntityType::Service => "service",
            EntityType::Subscription => "subscription",
            EntityType::TaxRate => "tax_rate",
            EntityType::Invoice => "invoice",
            EntityType::Payment => "payment",
            EntityType::GatewayPayment => "gateway_payment",
            EntityType::Settings => "settings",
            EntityType::Flow => "flow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "company" => Some(EntityType::Company),
            "user" => Some(EntityType::User),
            "client" => Some(EntityType::Client),
            "service" => Some(EntityType::Service),
            "subscription" => Some(EntityType::Subscription),
            "tax_rate" => Some(EntityType::TaxRate),
            "invoice" => Some(EntityType::Invoice),
            "payment" => Some(EntityType::Payment),
            "gateway_payment" => Some(EntityType::GatewayPayment),
            "settings" => Some(EntityType::Settings),
            "flow" => Some(EntityType::Flow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub activity_id: Uuid,
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub details: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub company_id: Uuid,
    pub user_id: Option<Uuid>,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub action: String,
    pub details: Option<serde_json::Value>,
}

/// Company-scoped activity query. `limit` is already clamped.
#[derive(Debug, Clone)]
pub struct ListActivityFilter {
    pub entity: Option<(EntityType, Uuid)>,
    pub user_id: Option<Uuid>,
    pub limit: i64,
}

impl ListActivityFilter {
    pub fn recent(limit: Option<i64>) -> Self {
        Self {
            entity: None,
            user_id: None,
            limit: clamp_limit(limit),
        }
    }

    pub fn matches(&self, entry: &ActivityLog) -> bool {
        if let Some((entity_type, entity_id)) = self.entity {
            if entry.entity_type != entity_type.as_str() || entry.entity_id != entity_id {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if entry.user_id != Some(user_id) {
                return false;
            }
        }
        true
    }
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_defaults_and_clamps() {
        assert_eq!(clamp_limit(None), 50);
        assert_eq!(clamp_limit(Some(0)), 1);
        assert_eq!(clamp_limit(Some(-5)), 1);
        assert_eq!(clamp_limit(Some(1000)), 200);
        assert_eq!(clamp_limit(Some(20)), 20);
    }

    #[test]
    fn entity_type_round_trips_through_str() {
        for et in [EntityType::Invoice, EntityType::TaxRate, EntityType::GatewayPayment] {
            assert_eq!(EntityType::parse(et.as_str()), Some(et));
        }
        assert_eq!(EntityType::parse("widget"), None);
    }
}
