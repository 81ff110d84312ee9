//! Postgres implementation of [`BillingStore`].

use crate::models::{
    ActivityLog, Client, Company, CompanySettings, CompanyStatus, CreateClient, CreateCompany,
    CreateFlow, CreateGatewayPayment, CreateInvoice, CreatePayment, CreateService,
    CreateSubscription, CreateTaxRate, CreateUser, Flow, GatewayPayment, GatewayPaymentStatus,
    GatewaySettlement, Invoice, InvoiceStatus, ListActivityFilter, ListClientsFilter,
    ListInvoicesFilter, ListPaymentsFilter, ListServicesFilter, ListSubscriptionsFilter,
    ListTaxRatesFilter, NewActivity, Payment, PaymentCompletion, PaymentStatus, Service,
    Subscription, SubscriptionStatus, TaxRate, UpdateClient, UpdateCompany, UpdateFlow,
    UpdateInvoice, UpdateService, UpdateSubscription, UpdateTaxRate, UpdateUser, UpsertSettings,
    User,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::BillingStore;
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const COMPANY_COLUMNS: &str = "company_id, name, email, phone, address, plan, status, trial_ends_utc, monthly_payment, created_utc, updated_utc";
const USER_COLUMNS: &str =
    "user_id, company_id, email, full_name, role, active, created_utc, updated_utc";
const CLIENT_COLUMNS: &str = "client_id, company_id, name, email, phone, address, status, segment, notes, created_utc, updated_utc";
const SERVICE_COLUMNS: &str = "service_id, company_id, name, description, category, price, billing_cycle, active, created_utc, updated_utc";
const SUBSCRIPTION_COLUMNS: &str = "subscription_id, company_id, client_id, service_id, status, start_date, end_date, next_billing_date, created_utc, updated_utc";
const TAX_RATE_COLUMNS: &str =
    "tax_rate_id, name, rate, service_id, effective_from, effective_to, active, created_utc";
const INVOICE_COLUMNS: &str = "invoice_id, company_id, client_id, subscription_id, invoice_number, sequence_number, base_amount, tax_rate_id, tax_rate, tax_amount, total_amount, status, issue_date, due_date, paid_date, payment_method, notes, created_utc, updated_utc";
const PAYMENT_COLUMNS: &str = "payment_id, company_id, invoice_id, amount, method, reference, status, completed_utc, created_utc, updated_utc";
const GATEWAY_PAYMENT_COLUMNS: &str = "gateway_payment_id, company_id, order_id, amount, currency, status, gateway_payload, created_utc, updated_utc";
const ACTIVITY_COLUMNS: &str =
    "activity_id, company_id, user_id, entity_type, entity_id, action, details, created_utc";
const SETTINGS_COLUMNS: &str = "company_id, sender_name, sender_email, email_enabled, whatsapp_enabled, default_tax_rate_id, reminder_days_before_due, updated_utc";
const FLOW_COLUMNS: &str = "flow_id, company_id, name, active, steps, created_utc, updated_utc";

/// Map a driver error, turning constraint violations into conflicts.
fn db_error(action: &str, e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!("Cannot {}: record already exists", action))
        }
        sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "Cannot {}: record is referenced by other records",
                action
            ))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e)),
    }
}

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "billing-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl BillingStore for PgStore {
    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    // =========================================================================
    // Company Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_company(&self, input: &CreateCompany) -> Result<Company, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_company"])
            .start_timer();

        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            INSERT INTO companies (company_id, name, email, phone, address, plan, status, trial_ends_utc, monthly_payment)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.plan)
        .bind(CompanyStatus::Trial.as_str())
        .bind(input.trial_ends_utc)
        .bind(input.monthly_payment)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create company", e))?;

        timer.observe_duration();
        info!(company_id = %company.company_id, "Company created");

        Ok(company)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_company"])
            .start_timer();

        let company = sqlx::query_as::<_, Company>(&format!(
            "SELECT {COMPANY_COLUMNS} FROM companies WHERE company_id = $1"
        ))
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get company", e))?;

        timer.observe_duration();
        Ok(company)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id))]
    async fn update_company(
        &self,
        company_id: Uuid,
        input: &UpdateCompany,
    ) -> Result<Option<Company>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_company"])
            .start_timer();

        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            UPDATE companies
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                plan = COALESCE($6, plan),
                monthly_payment = COALESCE($7, monthly_payment),
                updated_utc = NOW()
            WHERE company_id = $1
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(&input.plan)
        .bind(input.monthly_payment)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update company", e))?;

        timer.observe_duration();
        Ok(company)
    }

    #[instrument(skip(self), fields(company_id = %company_id, status = status.as_str()))]
    async fn set_company_status(
        &self,
        company_id: Uuid,
        status: CompanyStatus,
    ) -> Result<Option<Company>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["set_company_status"])
            .start_timer();

        let company = sqlx::query_as::<_, Company>(&format!(
            r#"
            UPDATE companies
            SET status = $2,
                trial_ends_utc = CASE WHEN $2 = 'active' THEN NULL ELSE trial_ends_utc END,
                updated_utc = NOW()
            WHERE company_id = $1
            RETURNING {COMPANY_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update company status", e))?;

        timer.observe_duration();
        Ok(company)
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    async fn create_user(&self, input: &CreateUser) -> Result<User, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (user_id, company_id, email, full_name, role)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.email)
        .bind(&input.full_name)
        .bind(input.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!("A user with this email already exists"))
            }
            _ => db_error("create user", e),
        })?;

        timer.observe_duration();
        info!(user_id = %user.user_id, role = %user.role, "User created");

        Ok(user)
    }

    #[instrument(skip(self), fields(company_id = %company_id, user_id = %user_id))]
    async fn get_user(&self, company_id: Uuid, user_id: Uuid) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE company_id = $1 AND user_id = $2"
        ))
        .bind(company_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get user", e))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self, email))]
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_user_by_email"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find user", e))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_users(&self, company_id: Uuid) -> Result<Vec<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_users"])
            .start_timer();

        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE company_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list users", e))?;

        timer.observe_duration();
        Ok(users)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, user_id = %user_id))]
    async fn update_user(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_user"])
            .start_timer();

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET full_name = COALESCE($3, full_name),
                role = COALESCE($4, role),
                active = COALESCE($5, active),
                updated_utc = NOW()
            WHERE company_id = $1 AND user_id = $2
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(user_id)
        .bind(&input.full_name)
        .bind(input.role.map(|r| r.as_str()))
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update user", e))?;

        timer.observe_duration();
        Ok(user)
    }

    #[instrument(skip(self), fields(company_id = %company_id, user_id = %user_id))]
    async fn delete_user(&self, company_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_user"])
            .start_timer();

        let result = sqlx::query("DELETE FROM users WHERE company_id = $1 AND user_id = $2")
            .bind(company_id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete user", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Client Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients (client_id, company_id, name, email, phone, address, status, segment, notes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.status.as_str())
        .bind(input.segment.map(|s| s.as_str()))
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self), fields(company_id = %company_id, client_id = %client_id))]
    async fn get_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            "SELECT {CLIENT_COLUMNS} FROM clients WHERE company_id = $1 AND client_id = $2"
        ))
        .bind(company_id)
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_clients(
        &self,
        company_id: Uuid,
        filter: &ListClientsFilter,
    ) -> Result<Vec<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_clients"])
            .start_timer();

        let clients = sqlx::query_as::<_, Client>(&format!(
            r#"
            SELECT {CLIENT_COLUMNS}
            FROM clients
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::varchar IS NULL OR segment = $3)
              AND ($4::text IS NULL
                   OR name ILIKE '%' || $4 || '%'
                   OR email ILIKE '%' || $4 || '%')
            ORDER BY created_utc DESC
            "#
        ))
        .bind(company_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.segment.map(|s| s.as_str()))
        .bind(&filter.search)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list clients", e))?;

        timer.observe_duration();
        Ok(clients)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, client_id = %client_id))]
    async fn update_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_client"])
            .start_timer();

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET name = COALESCE($3, name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                address = COALESCE($6, address),
                status = COALESCE($7, status),
                segment = COALESCE($8, segment),
                notes = COALESCE($9, notes),
                updated_utc = NOW()
            WHERE company_id = $1 AND client_id = $2
            RETURNING {CLIENT_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(client_id)
        .bind(&input.name)
        .bind(&input.email)
        .bind(&input.phone)
        .bind(&input.address)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.segment.map(|s| s.as_str()))
        .bind(&input.notes)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update client", e))?;

        timer.observe_duration();
        Ok(client)
    }

    #[instrument(skip(self), fields(company_id = %company_id, client_id = %client_id))]
    async fn delete_client(&self, company_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_client"])
            .start_timer();

        let result = sqlx::query("DELETE FROM clients WHERE company_id = $1 AND client_id = $2")
            .bind(company_id)
            .bind(client_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete client", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Service Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_service"])
            .start_timer();

        let service = sqlx::query_as::<_, Service>(&format!(
            r#"
            INSERT INTO services (service_id, company_id, name, description, category, price, billing_cycle, active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SERVICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.billing_cycle.as_str())
        .bind(input.active)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create service", e))?;

        timer.observe_duration();
        Ok(service)
    }

    #[instrument(skip(self), fields(company_id = %company_id, service_id = %service_id))]
    async fn get_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_service"])
            .start_timer();

        let service = sqlx::query_as::<_, Service>(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services WHERE company_id = $1 AND service_id = $2"
        ))
        .bind(company_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get service", e))?;

        timer.observe_duration();
        Ok(service)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_services(
        &self,
        company_id: Uuid,
        filter: &ListServicesFilter,
    ) -> Result<Vec<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_services"])
            .start_timer();

        let services = sqlx::query_as::<_, Service>(&format!(
            r#"
            SELECT {SERVICE_COLUMNS}
            FROM services
            WHERE company_id = $1
              AND ($2::bool IS NULL OR active = $2)
              AND ($3::varchar IS NULL OR category = $3)
            ORDER BY created_utc DESC
            "#
        ))
        .bind(company_id)
        .bind(filter.active)
        .bind(&filter.category)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list services", e))?;

        timer.observe_duration();
        Ok(services)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, service_id = %service_id))]
    async fn update_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_service"])
            .start_timer();

        let service = sqlx::query_as::<_, Service>(&format!(
            r#"
            UPDATE services
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                price = COALESCE($6, price),
                billing_cycle = COALESCE($7, billing_cycle),
                active = COALESCE($8, active),
                updated_utc = NOW()
            WHERE company_id = $1 AND service_id = $2
            RETURNING {SERVICE_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(service_id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.category)
        .bind(input.price)
        .bind(input.billing_cycle.map(|c| c.as_str()))
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update service", e))?;

        timer.observe_duration();
        Ok(service)
    }

    #[instrument(skip(self), fields(company_id = %company_id, service_id = %service_id))]
    async fn delete_service(&self, company_id: Uuid, service_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_service"])
            .start_timer();

        let result =
            sqlx::query("DELETE FROM services WHERE company_id = $1 AND service_id = $2")
                .bind(company_id)
                .bind(service_id)
                .execute(&self.pool)
                .await
                .map_err(|e| db_error("delete service", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id, client_id = %input.client_id))]
    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            INSERT INTO subscriptions (subscription_id, company_id, client_id, service_id, status, start_date, end_date, next_billing_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.client_id)
        .bind(input.service_id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(input.start_date)
        .bind(input.end_date)
        .bind(input.next_billing_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create subscription", e))?;

        timer.observe_duration();
        Ok(subscription)
    }

    #[instrument(skip(self), fields(company_id = %company_id, subscription_id = %subscription_id))]
    async fn get_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_subscription"])
            .start_timer();

        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE company_id = $1 AND subscription_id = $2"
        ))
        .bind(company_id)
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get subscription", e))?;

        timer.observe_duration();
        Ok(subscription)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_subscriptions(
        &self,
        company_id: Uuid,
        filter: &ListSubscriptionsFilter,
    ) -> Result<Vec<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_subscriptions"])
            .start_timer();

        let subscriptions = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            SELECT {SUBSCRIPTION_COLUMNS}
            FROM subscriptions
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::date IS NULL OR next_billing_date <= $4)
            ORDER BY created_utc DESC
            "#
        ))
        .bind(company_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(filter.due_on_or_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list subscriptions", e))?;

        timer.observe_duration();
        Ok(subscriptions)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, subscription_id = %subscription_id))]
    async fn update_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
        input: &UpdateSubscription,
    ) -> Result<Option<Subscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subscription"])
            .start_timer();

        // $5 says whether $6 should replace next_billing_date (possibly with NULL).
        let subscription = sqlx::query_as::<_, Subscription>(&format!(
            r#"
            UPDATE subscriptions
            SET status = COALESCE($3, status),
                end_date = COALESCE($4, end_date),
                next_billing_date = CASE WHEN $5 THEN $6 ELSE next_billing_date END,
                updated_utc = NOW()
            WHERE company_id = $1 AND subscription_id = $2
            RETURNING {SUBSCRIPTION_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(subscription_id)
        .bind(input.status.map(|s| s.as_str()))
        .bind(input.end_date)
        .bind(input.next_billing_date.is_some())
        .bind(input.next_billing_date.flatten())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update subscription", e))?;

        timer.observe_duration();
        Ok(subscription)
    }

    #[instrument(skip(self), fields(company_id = %company_id, subscription_id = %subscription_id))]
    async fn delete_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_subscription"])
            .start_timer();

        let result = sqlx::query(
            "DELETE FROM subscriptions WHERE company_id = $1 AND subscription_id = $2",
        )
        .bind(company_id)
        .bind(subscription_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete subscription", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Tax Rate Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(name = %input.name))]
    async fn create_tax_rate(&self, input: &CreateTaxRate) -> Result<TaxRate, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_tax_rate"])
            .start_timer();

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            INSERT INTO tax_rates (tax_rate_id, name, rate, service_id, effective_from, effective_to)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {TAX_RATE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&input.name)
        .bind(input.rate)
        .bind(input.service_id)
        .bind(input.effective_from)
        .bind(input.effective_to)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create tax rate", e))?;

        timer.observe_duration();
        info!(tax_rate_id = %tax_rate.tax_rate_id, name = %tax_rate.name, "Tax rate created");

        Ok(tax_rate)
    }

    #[instrument(skip(self), fields(tax_rate_id = %tax_rate_id))]
    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_tax_rate"])
            .start_timer();

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            "SELECT {TAX_RATE_COLUMNS} FROM tax_rates WHERE tax_rate_id = $1"
        ))
        .bind(tax_rate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get tax rate", e))?;

        timer.observe_duration();
        Ok(tax_rate)
    }

    #[instrument(skip(self, filter))]
    async fn list_tax_rates(&self, filter: &ListTaxRatesFilter) -> Result<Vec<TaxRate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_tax_rates"])
            .start_timer();

        let tax_rates = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            SELECT {TAX_RATE_COLUMNS}
            FROM tax_rates
            WHERE ($1::bool = FALSE OR active = TRUE)
              AND ($2::date IS NULL OR (effective_from <= $2 AND (effective_to IS NULL OR effective_to >= $2)))
              AND ($3::uuid IS NULL OR service_id = $3)
            ORDER BY name, effective_from DESC
            "#
        ))
        .bind(filter.active_only)
        .bind(filter.as_of)
        .bind(filter.service_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list tax rates", e))?;

        timer.observe_duration();
        Ok(tax_rates)
    }

    #[instrument(skip(self, input), fields(tax_rate_id = %tax_rate_id))]
    async fn update_tax_rate(
        &self,
        tax_rate_id: Uuid,
        input: &UpdateTaxRate,
    ) -> Result<Option<TaxRate>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_tax_rate"])
            .start_timer();

        let tax_rate = sqlx::query_as::<_, TaxRate>(&format!(
            r#"
            UPDATE tax_rates
            SET name = COALESCE($2, name),
                rate = COALESCE($3, rate),
                effective_from = COALESCE($4, effective_from),
                effective_to = COALESCE($5, effective_to),
                active = COALESCE($6, active)
            WHERE tax_rate_id = $1
            RETURNING {TAX_RATE_COLUMNS}
            "#
        ))
        .bind(tax_rate_id)
        .bind(&input.name)
        .bind(input.rate)
        .bind(input.effective_from)
        .bind(input.effective_to)
        .bind(input.active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update tax rate", e))?;

        timer.observe_duration();
        Ok(tax_rate)
    }

    #[instrument(skip(self), fields(tax_rate_id = %tax_rate_id))]
    async fn delete_tax_rate(&self, tax_rate_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_tax_rate"])
            .start_timer();

        let result = sqlx::query("DELETE FROM tax_rates WHERE tax_rate_id = $1")
            .bind(tax_rate_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete tax rate", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Invoice Operations
    // =========================================================================

    /// The number comes from `next_invoice_number()`, which bumps the
    /// company's row in `invoice_sequences` under a row lock.
    #[instrument(skip(self, input), fields(company_id = %input.company_id, client_id = %input.client_id))]
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            WITH seq AS (SELECT next_invoice_number($2) AS n)
            INSERT INTO invoices (invoice_id, company_id, client_id, subscription_id, invoice_number, sequence_number,
                                  base_amount, tax_rate_id, tax_rate, tax_amount, total_amount, status, issue_date, due_date, notes)
            SELECT $1, $2, $3, $4, 'INV-' || seq.n, seq.n, $5, $6, $7, $8, $9, $10, $11, $12, $13
            FROM seq
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.client_id)
        .bind(input.subscription_id)
        .bind(input.base_amount)
        .bind(input.tax_rate_id)
        .bind(input.tax_rate)
        .bind(input.tax_amount)
        .bind(input.total_amount)
        .bind(InvoiceStatus::Pending.as_str())
        .bind(input.issue_date)
        .bind(input.due_date)
        .bind(&input.notes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create invoice", e))?;

        timer.observe_duration();
        info!(
            invoice_id = %invoice.invoice_id,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );

        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn peek_next_invoice_number(&self, company_id: Uuid) -> Result<i64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["peek_next_invoice_number"])
            .start_timer();

        let next = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COALESCE(
                (SELECT last_number FROM invoice_sequences WHERE company_id = $1),
                (SELECT MAX(sequence_number) FROM invoices WHERE company_id = $1),
                999
            ) + 1
            "#,
        )
        .bind(company_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("read invoice sequence", e))?;

        timer.observe_duration();
        Ok(next)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    async fn get_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = $1 AND invoice_id = $2"
        ))
        .bind(company_id)
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get invoice", e))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_invoices(
        &self,
        company_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        // Overdue is derived: stored 'pending' with a due date before $6.
        let invoices = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            SELECT {INVOICE_COLUMNS}
            FROM invoices
            WHERE company_id = $1
              AND ($2::varchar IS NULL
                   OR ($2 = 'overdue' AND status = 'pending' AND due_date < $6)
                   OR ($2 = 'pending' AND status = 'pending' AND due_date >= $6)
                   OR ($2 IN ('paid', 'cancelled') AND status = $2))
              AND ($3::uuid IS NULL OR client_id = $3)
              AND ($4::date IS NULL OR issue_date >= $4)
              AND ($5::date IS NULL OR issue_date <= $5)
            ORDER BY created_utc DESC
            "#
        ))
        .bind(company_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.client_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.today)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list invoices", e))?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, invoice_id = %invoice_id))]
    async fn update_pending_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET due_date = COALESCE($3, due_date),
                notes = COALESCE($4, notes),
                base_amount = COALESCE($5, base_amount),
                tax_rate_id = CASE WHEN $10 THEN $6 ELSE tax_rate_id END,
                tax_rate = COALESCE($7, tax_rate),
                tax_amount = COALESCE($8, tax_amount),
                total_amount = COALESCE($9, total_amount),
                updated_utc = NOW()
            WHERE company_id = $1 AND invoice_id = $2 AND status = 'pending'
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(invoice_id)
        .bind(input.due_date)
        .bind(&input.notes)
        .bind(input.base_amount)
        .bind(input.tax_rate_id.flatten())
        .bind(input.tax_rate)
        .bind(input.tax_amount)
        .bind(input.total_amount)
        .bind(input.tax_rate_id.is_some())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update invoice", e))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id, to = to.as_str()))]
    async fn transition_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = $4, updated_utc = NOW()
            WHERE company_id = $1 AND invoice_id = $2 AND status = $3
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(invoice_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update invoice status", e))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self), fields(company_id = %company_id, invoice_id = %invoice_id))]
    async fn delete_unpaid_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_invoice"])
            .start_timer();

        let result = sqlx::query(
            "DELETE FROM invoices WHERE company_id = $1 AND invoice_id = $2 AND status <> 'paid'",
        )
        .bind(company_id)
        .bind(invoice_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("delete invoice", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Payment Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id, invoice_id = %input.invoice_id))]
    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (payment_id, company_id, invoice_id, amount, method, reference, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(input.invoice_id)
        .bind(input.amount)
        .bind(&input.method)
        .bind(&input.reference)
        .bind(PaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn get_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE company_id = $1 AND payment_id = $2"
        ))
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id))]
    async fn list_payments(
        &self,
        company_id: Uuid,
        filter: &ListPaymentsFilter,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(&format!(
            r#"
            SELECT {PAYMENT_COLUMNS}
            FROM payments
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR invoice_id = $3)
              AND ($4::date IS NULL OR created_utc::date >= $4)
              AND ($5::date IS NULL OR created_utc::date <= $5)
            ORDER BY created_utc DESC
            "#
        ))
        .bind(company_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.invoice_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn complete_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<Option<PaymentCompletion>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["complete_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE company_id = $1 AND payment_id = $2 FOR UPDATE"
        ))
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("lock payment", e))?;

        let Some(payment) = payment else {
            return Ok(None);
        };

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE company_id = $1 AND invoice_id = $2 FOR UPDATE"
        ))
        .bind(company_id)
        .bind(payment.invoice_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("lock invoice", e))?;

        match payment.status() {
            PaymentStatus::Completed => {
                tx.rollback().await.ok();
                timer.observe_duration();
                return Ok(Some(PaymentCompletion {
                    payment,
                    invoice,
                    already_completed: true,
                }));
            }
            PaymentStatus::Failed => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "Payment has failed and cannot be completed"
                )));
            }
            PaymentStatus::Pending => {}
        }

        match invoice.status() {
            InvoiceStatus::Paid => {
                return Err(AppError::Conflict(anyhow::anyhow!("Invoice is already paid")))
            }
            InvoiceStatus::Cancelled => {
                return Err(AppError::Conflict(anyhow::anyhow!("Invoice is cancelled")))
            }
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
        }

        if payment.amount != invoice.total_amount {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Payment amount no longer matches the invoice total"
            )));
        }

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'completed', completed_utc = NOW(), updated_utc = NOW()
            WHERE payment_id = $1
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("complete payment", e))?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status = 'paid', paid_date = $2, payment_method = $3, updated_utc = NOW()
            WHERE invoice_id = $1
            RETURNING {INVOICE_COLUMNS}
            "#
        ))
        .bind(invoice.invoice_id)
        .bind(paid_date)
        .bind(&payment.method)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("mark invoice paid", e))?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit payment: {}", e))
        })?;

        timer.observe_duration();
        info!(
            payment_id = %payment.payment_id,
            invoice_number = %invoice.invoice_number,
            "Payment completed, invoice paid"
        );

        Ok(Some(PaymentCompletion {
            payment,
            invoice,
            already_completed: false,
        }))
    }

    #[instrument(skip(self), fields(company_id = %company_id, payment_id = %payment_id))]
    async fn fail_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fail_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments
            SET status = 'failed', updated_utc = NOW()
            WHERE company_id = $1 AND payment_id = $2 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fail payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    // =========================================================================
    // Gateway Payment Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id, order_id = %input.order_id))]
    async fn create_gateway_payment(
        &self,
        input: &CreateGatewayPayment,
    ) -> Result<GatewayPayment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_gateway_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, GatewayPayment>(&format!(
            r#"
            INSERT INTO gateway_payments (gateway_payment_id, company_id, order_id, amount, currency, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {GATEWAY_PAYMENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.order_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(GatewayPaymentStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create gateway payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_gateway_payments(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<GatewayPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_gateway_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, GatewayPayment>(&format!(
            "SELECT {GATEWAY_PAYMENT_COLUMNS} FROM gateway_payments WHERE company_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list gateway payments", e))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self))]
    async fn find_gateway_payment(
        &self,
        order_id: &str,
    ) -> Result<Option<GatewayPayment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_gateway_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, GatewayPayment>(&format!(
            "SELECT {GATEWAY_PAYMENT_COLUMNS} FROM gateway_payments WHERE order_id = $1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("find gateway payment", e))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self, payload), fields(status = status.as_str()))]
    async fn settle_gateway_payment(
        &self,
        order_id: &str,
        status: GatewayPaymentStatus,
        payload: &serde_json::Value,
    ) -> Result<Option<GatewaySettlement>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_gateway_payment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let existing = sqlx::query_as::<_, GatewayPayment>(&format!(
            "SELECT {GATEWAY_PAYMENT_COLUMNS} FROM gateway_payments WHERE order_id = $1 FOR UPDATE"
        ))
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("lock gateway payment", e))?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        if existing.status() != GatewayPaymentStatus::Pending {
            tx.rollback().await.ok();
            timer.observe_duration();
            return Ok(Some(GatewaySettlement {
                payment: existing,
                company_activated: false,
            }));
        }

        let payment = sqlx::query_as::<_, GatewayPayment>(&format!(
            r#"
            UPDATE gateway_payments
            SET status = $2, gateway_payload = $3, updated_utc = NOW()
            WHERE gateway_payment_id = $1
            RETURNING {GATEWAY_PAYMENT_COLUMNS}
            "#
        ))
        .bind(existing.gateway_payment_id)
        .bind(status.as_str())
        .bind(payload)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("update gateway payment", e))?;

        let mut company_activated = false;
        if status == GatewayPaymentStatus::Completed {
            let result = sqlx::query(
                r#"
                UPDATE companies
                SET status = 'active', trial_ends_utc = NULL, updated_utc = NOW()
                WHERE company_id = $1 AND status <> 'cancelled'
                "#,
            )
            .bind(payment.company_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_error("activate company", e))?;
            company_activated = result.rows_affected() > 0;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit settlement: {}", e))
        })?;

        timer.observe_duration();
        info!(
            order_id = %payment.order_id,
            company_id = %payment.company_id,
            company_activated = company_activated,
            "Gateway payment settled"
        );

        Ok(Some(GatewaySettlement {
            payment,
            company_activated,
        }))
    }

    // =========================================================================
    // Activity Operations
    // =========================================================================

    #[instrument(skip(self, entry), fields(company_id = %entry.company_id, entity_type = entry.entity_type.as_str()))]
    async fn insert_activity(&self, entry: &NewActivity) -> Result<ActivityLog, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_activity"])
            .start_timer();

        let log = sqlx::query_as::<_, ActivityLog>(&format!(
            r#"
            INSERT INTO activity_logs (activity_id, company_id, user_id, entity_type, entity_id, action, details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(entry.company_id)
        .bind(entry.user_id)
        .bind(entry.entity_type.as_str())
        .bind(entry.entity_id)
        .bind(&entry.action)
        .bind(&entry.details)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("insert activity", e))?;

        timer.observe_duration();
        Ok(log)
    }

    #[instrument(skip(self, filter), fields(company_id = %company_id, limit = filter.limit))]
    async fn list_activity(
        &self,
        company_id: Uuid,
        filter: &ListActivityFilter,
    ) -> Result<Vec<ActivityLog>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_activity"])
            .start_timer();

        let (entity_type, entity_id) = match filter.entity {
            Some((entity_type, entity_id)) => (Some(entity_type.as_str()), Some(entity_id)),
            None => (None, None),
        };

        let entries = sqlx::query_as::<_, ActivityLog>(&format!(
            r#"
            SELECT {ACTIVITY_COLUMNS}
            FROM activity_logs
            WHERE company_id = $1
              AND ($2::varchar IS NULL OR entity_type = $2)
              AND ($3::uuid IS NULL OR entity_id = $3)
              AND ($4::uuid IS NULL OR user_id = $4)
            ORDER BY created_utc DESC
            LIMIT $5
            "#
        ))
        .bind(company_id)
        .bind(entity_type)
        .bind(entity_id)
        .bind(filter.user_id)
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list activity", e))?;

        timer.observe_duration();
        Ok(entries)
    }

    // =========================================================================
    // Settings Operations
    // =========================================================================

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn get_settings(&self, company_id: Uuid) -> Result<Option<CompanySettings>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_settings"])
            .start_timer();

        let settings = sqlx::query_as::<_, CompanySettings>(&format!(
            "SELECT {SETTINGS_COLUMNS} FROM company_settings WHERE company_id = $1"
        ))
        .bind(company_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get settings", e))?;

        timer.observe_duration();
        Ok(settings)
    }

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    async fn upsert_settings(&self, input: &UpsertSettings) -> Result<CompanySettings, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["upsert_settings"])
            .start_timer();

        let settings = sqlx::query_as::<_, CompanySettings>(&format!(
            r#"
            INSERT INTO company_settings (company_id, sender_name, sender_email, email_enabled, whatsapp_enabled, default_tax_rate_id, reminder_days_before_due)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (company_id) DO UPDATE
            SET sender_name = EXCLUDED.sender_name,
                sender_email = EXCLUDED.sender_email,
                email_enabled = EXCLUDED.email_enabled,
                whatsapp_enabled = EXCLUDED.whatsapp_enabled,
                default_tax_rate_id = EXCLUDED.default_tax_rate_id,
                reminder_days_before_due = EXCLUDED.reminder_days_before_due,
                updated_utc = NOW()
            RETURNING {SETTINGS_COLUMNS}
            "#
        ))
        .bind(input.company_id)
        .bind(&input.sender_name)
        .bind(&input.sender_email)
        .bind(input.email_enabled)
        .bind(input.whatsapp_enabled)
        .bind(input.default_tax_rate_id)
        .bind(input.reminder_days_before_due)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("save settings", e))?;

        timer.observe_duration();
        Ok(settings)
    }

    // =========================================================================
    // Flow Operations
    // =========================================================================

    #[instrument(skip(self, input), fields(company_id = %input.company_id))]
    async fn create_flow(&self, input: &CreateFlow) -> Result<Flow, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_flow"])
            .start_timer();

        let flow = sqlx::query_as::<_, Flow>(&format!(
            r#"
            INSERT INTO flows (flow_id, company_id, name, active, steps)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {FLOW_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.company_id)
        .bind(&input.name)
        .bind(input.active)
        .bind(Json(&input.steps))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_error("create flow", e))?;

        timer.observe_duration();
        Ok(flow)
    }

    #[instrument(skip(self), fields(company_id = %company_id, flow_id = %flow_id))]
    async fn get_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<Option<Flow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_flow"])
            .start_timer();

        let flow = sqlx::query_as::<_, Flow>(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE company_id = $1 AND flow_id = $2"
        ))
        .bind(company_id)
        .bind(flow_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("get flow", e))?;

        timer.observe_duration();
        Ok(flow)
    }

    #[instrument(skip(self), fields(company_id = %company_id))]
    async fn list_flows(&self, company_id: Uuid) -> Result<Vec<Flow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_flows"])
            .start_timer();

        let flows = sqlx::query_as::<_, Flow>(&format!(
            "SELECT {FLOW_COLUMNS} FROM flows WHERE company_id = $1 ORDER BY created_utc DESC"
        ))
        .bind(company_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("list flows", e))?;

        timer.observe_duration();
        Ok(flows)
    }

    #[instrument(skip(self, input), fields(company_id = %company_id, flow_id = %flow_id))]
    async fn update_flow(
        &self,
        company_id: Uuid,
        flow_id: Uuid,
        input: &UpdateFlow,
    ) -> Result<Option<Flow>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_flow"])
            .start_timer();

        let flow = sqlx::query_as::<_, Flow>(&format!(
            r#"
            UPDATE flows
            SET name = COALESCE($3, name),
                active = COALESCE($4, active),
                steps = COALESCE($5, steps),
                updated_utc = NOW()
            WHERE company_id = $1 AND flow_id = $2
            RETURNING {FLOW_COLUMNS}
            "#
        ))
        .bind(company_id)
        .bind(flow_id)
        .bind(&input.name)
        .bind(input.active)
        .bind(input.steps.as_ref().map(Json))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("update flow", e))?;

        timer.observe_duration();
        Ok(flow)
    }

    #[instrument(skip(self), fields(company_id = %company_id, flow_id = %flow_id))]
    async fn delete_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<bool, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_flow"])
            .start_timer();

        let result = sqlx::query("DELETE FROM flows WHERE company_id = $1 AND flow_id = $2")
            .bind(company_id)
            .bind(flow_id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("delete flow", e))?;

        timer.observe_duration();
        Ok(result.rows_affected() > 0)
    }
}
