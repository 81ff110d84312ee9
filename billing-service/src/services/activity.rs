//! Best-effort audit trail.
//!
//! A failed write is logged and counted, never returned: recording activity
//! must not undo or block the mutation it describes.

use crate::models::{ActivityLog, EntityType, ListActivityFilter, NewActivity};
use crate::services::metrics::record_activity_failure;
use crate::services::store::BillingStore;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ActivityLogger {
    store: Arc<dyn BillingStore>,
}

impl ActivityLogger {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, entry),
        fields(
            company_id = %entry.company_id,
            entity_type = entry.entity_type.as_str(),
            entity_id = %entry.entity_id,
            action = %entry.action
        )
    )]
    pub async fn log(&self, entry: NewActivity) {
        if let Err(e) = self.store.insert_activity(&entry).await {
            warn!(error = %e, "Failed to write activity log entry");
            record_activity_failure(entry.entity_type.as_str());
        }
    }

    pub async fn recent(
        &self,
        company_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ActivityLog>, AppError> {
        self.store
            .list_activity(company_id, &ListActivityFilter::recent(limit))
            .await
    }

    pub async fn for_entity(
        &self,
        company_id: Uuid,
        entity_type: EntityType,
        entity_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ActivityLog>, AppError> {
        let filter = ListActivityFilter {
            entity: Some((entity_type, entity_id)),
            ..ListActivityFilter::recent(limit)
        };
        self.store.list_activity(company_id, &filter).await
    }

    pub async fn for_user(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        limit: Option<i64>,
    ) -> Result<Vec<ActivityLog>, AppError> {
        let filter = ListActivityFilter {
            user_id: Some(user_id),
            ..ListActivityFilter::recent(limit)
        };
        self.store.list_activity(company_id, &filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::MemoryStore;
    use serde_json::json;

    fn entry(company_id: Uuid, user_id: Uuid, entity_id: Uuid, action: &str) -> NewActivity {
        NewActivity {
            company_id,
            user_id: Some(user_id),
            entity_type: EntityType::Invoice,
            entity_id,
            action: action.to_string(),
            details: Some(json!({"source": "test"})),
        }
    }

    #[tokio::test]
    async fn reads_are_newest_first_and_limited() {
        let logger = ActivityLogger::new(Arc::new(MemoryStore::new()));
        let company = Uuid::new_v4();
        let user = Uuid::new_v4();
        let invoice = Uuid::new_v4();

        for action in ["created", "updated", "cancelled"] {
            logger.log(entry(company, user, invoice, action)).await;
        }

        let recent = logger.recent(company, Some(2)).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, "cancelled");
        assert_eq!(recent[1].action, "updated");
    }

    #[tokio::test]
    async fn reads_are_scoped_to_company() {
        let logger = ActivityLogger::new(Arc::new(MemoryStore::new()));
        let company_a = Uuid::new_v4();
        let company_b = Uuid::new_v4();
        let user = Uuid::new_v4();
        let invoice = Uuid::new_v4();

        logger.log(entry(company_a, user, invoice, "created")).await;

        assert!(logger.recent(company_b, None).await.unwrap().is_empty());
        assert!(logger
            .for_entity(company_b, EntityType::Invoice, invoice, None)
            .await
            .unwrap()
            .is_empty());
        assert!(logger.for_user(company_b, user, None).await.unwrap().is_empty());
        assert_eq!(logger.for_user(company_a, user, None).await.unwrap().len(), 1);
    }
}
