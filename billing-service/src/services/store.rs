//! Storage seam for billing-service.
//!
//! Every company-owned record is read and written through a `company_id`
//! argument; a record owned by another company is reported as absent.

use crate::models::{
    ActivityLog, Client, Company, CompanySettings, CompanyStatus, CreateClient, CreateCompany,
    CreateFlow, CreateGatewayPayment, CreateInvoice, CreatePayment, CreateService,
    CreateSubscription, CreateTaxRate, CreateUser, Flow, GatewayPayment, GatewayPaymentStatus,
    GatewaySettlement, Invoice, InvoiceStatus, ListActivityFilter, ListClientsFilter,
    ListInvoicesFilter, ListPaymentsFilter, ListServicesFilter, ListSubscriptionsFilter,
    ListTaxRatesFilter, NewActivity, Payment, PaymentCompletion, Service, Subscription, TaxRate,
    UpdateClient, UpdateCompany, UpdateFlow, UpdateInvoice, UpdateService, UpdateSubscription,
    UpdateTaxRate, UpdateUser, UpsertSettings, User,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use service_core::error::AppError;
use uuid::Uuid;

#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    // Companies
    async fn create_company(&self, input: &CreateCompany) -> Result<Company, AppError>;
    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError>;
    async fn update_company(
        &self,
        company_id: Uuid,
        input: &UpdateCompany,
    ) -> Result<Option<Company>, AppError>;
    /// Set the status unconditionally; `active` also clears the trial expiry.
    async fn set_company_status(
        &self,
        company_id: Uuid,
        status: CompanyStatus,
    ) -> Result<Option<Company>, AppError>;

    // Users
    async fn create_user(&self, input: &CreateUser) -> Result<User, AppError>;
    async fn get_user(&self, company_id: Uuid, user_id: Uuid) -> Result<Option<User>, AppError>;
    /// Global lookup; emails are unique across companies.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn list_users(&self, company_id: Uuid) -> Result<Vec<User>, AppError>;
    async fn update_user(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError>;
    async fn delete_user(&self, company_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;

    // Clients
    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError>;
    async fn get_client(&self, company_id: Uuid, client_id: Uuid)
        -> Result<Option<Client>, AppError>;
    async fn list_clients(
        &self,
        company_id: Uuid,
        filter: &ListClientsFilter,
    ) -> Result<Vec<Client>, AppError>;
    async fn update_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError>;
    async fn delete_client(&self, company_id: Uuid, client_id: Uuid) -> Result<bool, AppError>;

    // Services
    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError>;
    async fn get_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<Service>, AppError>;
    async fn list_services(
        &self,
        company_id: Uuid,
        filter: &ListServicesFilter,
    ) -> Result<Vec<Service>, AppError>;
    async fn update_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError>;
    async fn delete_service(&self, company_id: Uuid, service_id: Uuid) -> Result<bool, AppError>;

    // Subscriptions
    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError>;
    async fn get_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError>;
    async fn list_subscriptions(
        &self,
        company_id: Uuid,
        filter: &ListSubscriptionsFilter,
    ) -> Result<Vec<Subscription>, AppError>;
    async fn update_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
        input: &UpdateSubscription,
    ) -> Result<Option<Subscription>, AppError>;
    async fn delete_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<bool, AppError>;

    // Tax rates (global)
    async fn create_tax_rate(&self, input: &CreateTaxRate) -> Result<TaxRate, AppError>;
    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError>;
    async fn list_tax_rates(&self, filter: &ListTaxRatesFilter) -> Result<Vec<TaxRate>, AppError>;
    async fn update_tax_rate(
        &self,
        tax_rate_id: Uuid,
        input: &UpdateTaxRate,
    ) -> Result<Option<TaxRate>, AppError>;
    async fn delete_tax_rate(&self, tax_rate_id: Uuid) -> Result<bool, AppError>;

    // Invoices
    /// Insert an invoice under the next number of the company's sequence.
    /// Number allocation and insert are atomic.
    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError>;
    /// The number the next `create_invoice` would use, without consuming it.
    async fn peek_next_invoice_number(&self, company_id: Uuid) -> Result<i64, AppError>;
    async fn get_invoice(&self, company_id: Uuid, invoice_id: Uuid)
        -> Result<Option<Invoice>, AppError>;
    async fn list_invoices(
        &self,
        company_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError>;
    /// Update a stored-`pending` invoice; `None` if absent or no longer pending.
    async fn update_pending_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError>;
    /// Compare-and-set on the stored status.
    async fn transition_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError>;
    /// Delete an invoice that is not paid. Payments referencing it go with it.
    async fn delete_unpaid_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, AppError>;

    // Payments
    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError>;
    async fn get_payment(&self, company_id: Uuid, payment_id: Uuid)
        -> Result<Option<Payment>, AppError>;
    async fn list_payments(
        &self,
        company_id: Uuid,
        filter: &ListPaymentsFilter,
    ) -> Result<Vec<Payment>, AppError>;
    /// Mark the payment completed and its invoice paid in one unit of work.
    /// Idempotent for completed payments; `Conflict` for failed payments or
    /// invoices that can no longer be paid.
    async fn complete_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<Option<PaymentCompletion>, AppError>;
    /// pending -> failed; `None` if absent or not pending.
    async fn fail_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError>;

    // Gateway payments
    async fn create_gateway_payment(
        &self,
        input: &CreateGatewayPayment,
    ) -> Result<GatewayPayment, AppError>;
    async fn list_gateway_payments(&self, company_id: Uuid)
        -> Result<Vec<GatewayPayment>, AppError>;
    async fn find_gateway_payment(&self, order_id: &str)
        -> Result<Option<GatewayPayment>, AppError>;
    /// Apply a gateway callback to a pending order: new status and raw payload;
    /// on `completed` the owning company becomes active with its trial cleared.
    /// `None` if no order matches. Orders that already left `pending` are
    /// returned unchanged.
    async fn settle_gateway_payment(
        &self,
        order_id: &str,
        status: GatewayPaymentStatus,
        payload: &serde_json::Value,
    ) -> Result<Option<GatewaySettlement>, AppError>;

    // Activity
    async fn insert_activity(&self, entry: &NewActivity) -> Result<ActivityLog, AppError>;
    /// Newest first, at most `filter.limit` entries.
    async fn list_activity(
        &self,
        company_id: Uuid,
        filter: &ListActivityFilter,
    ) -> Result<Vec<ActivityLog>, AppError>;

    // Settings
    async fn get_settings(&self, company_id: Uuid) -> Result<Option<CompanySettings>, AppError>;
    async fn upsert_settings(&self, input: &UpsertSettings) -> Result<CompanySettings, AppError>;

    // Flows
    async fn create_flow(&self, input: &CreateFlow) -> Result<Flow, AppError>;
    async fn get_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<Option<Flow>, AppError>;
    async fn list_flows(&self, company_id: Uuid) -> Result<Vec<Flow>, AppError>;
    async fn update_flow(
        &self,
        company_id: Uuid,
        flow_id: Uuid,
        input: &UpdateFlow,
    ) -> Result<Option<Flow>, AppError>;
    async fn delete_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<bool, AppError>;
}
