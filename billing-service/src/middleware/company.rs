//! Company context for tenant-scoped routes.
//!
//! The gateway in front of this service authenticates the caller and forwards
//! `X-Company-ID`, `X-User-ID` and `X-User-Role`. Every tenant-scoped handler
//! takes a [`CompanyContext`] and passes its `company_id` to the store.

use crate::models::{EntityType, NewActivity, UserRole};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

pub const COMPANY_ID_HEADER: &str = "X-Company-ID";
pub const USER_ID_HEADER: &str = "X-User-ID";
pub const USER_ROLE_HEADER: &str = "X-User-Role";

#[derive(Debug, Clone, Copy)]
pub struct CompanyContext {
    pub company_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
}

impl CompanyContext {
    pub fn new(company_id: Uuid, user_id: Uuid, role: UserRole) -> Self {
        Self {
            company_id,
            user_id,
            role,
        }
    }

    /// Owners and admins only.
    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(anyhow::anyhow!(
                "This action requires the owner or admin role"
            )))
        }
    }

    /// Activity entry attributed to this caller.
    pub fn activity(&self, entity_type: EntityType, entity_id: Uuid, action: &str) -> NewActivity {
        NewActivity {
            company_id: self.company_id,
            user_id: Some(self.user_id),
            entity_type,
            entity_id,
            action: action.to_string(),
            details: None,
        }
    }
}

fn header<'a>(parts: &'a Parts, name: &str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing {} header", name)))
}

fn uuid_header(parts: &Parts, name: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(header(parts, name)?)
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Malformed {} header", name)))
}

#[async_trait]
impl<S> FromRequestParts<S> for CompanyContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let company_id = uuid_header(parts, COMPANY_ID_HEADER)?;
        let user_id = uuid_header(parts, USER_ID_HEADER)?;
        let role = UserRole::parse(header(parts, USER_ROLE_HEADER)?).ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Unknown role in {} header", USER_ROLE_HEADER))
        })?;

        let span = tracing::Span::current();
        span.record("company_id", tracing::field::display(company_id));
        span.record("user_id", tracing::field::display(user_id));

        Ok(CompanyContext::new(company_id, user_id, role))
    }
}
