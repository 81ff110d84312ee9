//! In-process implementation of [`BillingStore`].
//!
//! Used by the test harness and by `memory://` database URLs. Every operation
//! runs under one lock, which gives it the same atomicity the Postgres store
//! gets from single statements and transactions.

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
use crate::services::numbering::{format_invoice_number, next_after};
use crate::services::store::BillingStore;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use service_core::error::AppError;
use sqlx::types::Json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    companies: Vec<Company>,
    users: Vec<User>,
    clients: Vec<Client>,
    services: Vec<Service>,
    subscriptions: Vec<Subscription>,
    tax_rates: Vec<TaxRate>,
    invoices: Vec<Invoice>,
    invoice_sequences: HashMap<Uuid, i64>,
    payments: Vec<Payment>,
    gateway_payments: Vec<GatewayPayment>,
    activity: Vec<ActivityLog>,
    settings: HashMap<Uuid, CompanySettings>,
    flows: Vec<Flow>,
}

impl Tables {
    fn highest_invoice_number(&self, company_id: Uuid) -> Option<i64> {
        self.invoices
            .iter()
            .filter(|i| i.company_id == company_id)
            .map(|i| i.sequence_number)
            .max()
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(message: &str) -> AppError {
    AppError::Conflict(anyhow::anyhow!(message.to_string()))
}

/// Records are kept in insertion order; lists are returned newest first.
fn newest_first<T: Clone>(rows: &[T], keep: impl Fn(&T) -> bool) -> Vec<T> {
    rows.iter().rev().filter(|r| keep(r)).cloned().collect()
}

#[async_trait]
impl BillingStore for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    // =========================================================================
    // Companies
    // =========================================================================

    async fn create_company(&self, input: &CreateCompany) -> Result<Company, AppError> {
        let now = Utc::now();
        let company = Company {
            company_id: Uuid::new_v4(),
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            plan: input.plan.clone(),
            status: CompanyStatus::Trial.as_str().to_string(),
            trial_ends_utc: input.trial_ends_utc,
            monthly_payment: input.monthly_payment,
            created_utc: now,
            updated_utc: now,
        };
        self.tables.write().await.companies.push(company.clone());
        Ok(company)
    }

    async fn get_company(&self, company_id: Uuid) -> Result<Option<Company>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .companies
            .iter()
            .find(|c| c.company_id == company_id)
            .cloned())
    }

    async fn update_company(
        &self,
        company_id: Uuid,
        input: &UpdateCompany,
    ) -> Result<Option<Company>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(company) = tables
            .companies
            .iter_mut()
            .find(|c| c.company_id == company_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            company.name = name.clone();
        }
        if let Some(email) = &input.email {
            company.email = email.clone();
        }
        if let Some(phone) = &input.phone {
            company.phone = Some(phone.clone());
        }
        if let Some(address) = &input.address {
            company.address = Some(address.clone());
        }
        if let Some(plan) = &input.plan {
            company.plan = plan.clone();
        }
        if let Some(monthly_payment) = input.monthly_payment {
            company.monthly_payment = monthly_payment;
        }
        company.updated_utc = Utc::now();
        Ok(Some(company.clone()))
    }

    async fn set_company_status(
        &self,
        company_id: Uuid,
        status: CompanyStatus,
    ) -> Result<Option<Company>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(company) = tables
            .companies
            .iter_mut()
            .find(|c| c.company_id == company_id)
        else {
            return Ok(None);
        };
        company.status = status.as_str().to_string();
        if status == CompanyStatus::Active {
            company.trial_ends_utc = None;
        }
        company.updated_utc = Utc::now();
        Ok(Some(company.clone()))
    }

    // =========================================================================
    // Users
    // =========================================================================

    async fn create_user(&self, input: &CreateUser) -> Result<User, AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&input.email))
        {
            return Err(conflict("A user with this email already exists"));
        }
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            company_id: input.company_id,
            email: input.email.clone(),
            full_name: input.full_name.clone(),
            role: input.role.as_str().to_string(),
            active: true,
            created_utc: now,
            updated_utc: now,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, company_id: Uuid, user_id: Uuid) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.company_id == company_id && u.user_id == user_id)
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self, company_id: Uuid) -> Result<Vec<User>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.users, |u| u.company_id == company_id))
    }

    async fn update_user(
        &self,
        company_id: Uuid,
        user_id: Uuid,
        input: &UpdateUser,
    ) -> Result<Option<User>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(user) = tables
            .users
            .iter_mut()
            .find(|u| u.company_id == company_id && u.user_id == user_id)
        else {
            return Ok(None);
        };
        if let Some(full_name) = &input.full_name {
            user.full_name = full_name.clone();
        }
        if let Some(role) = input.role {
            user.role = role.as_str().to_string();
        }
        if let Some(active) = input.active {
            user.active = active;
        }
        user.updated_utc = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, company_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables
            .users
            .retain(|u| !(u.company_id == company_id && u.user_id == user_id));
        Ok(tables.users.len() < before)
    }

    // =========================================================================
    // Clients
    // =========================================================================

    async fn create_client(&self, input: &CreateClient) -> Result<Client, AppError> {
        let now = Utc::now();
        let client = Client {
            client_id: Uuid::new_v4(),
            company_id: input.company_id,
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            address: input.address.clone(),
            status: input.status.as_str().to_string(),
            segment: input.segment.map(|s| s.as_str().to_string()),
            notes: input.notes.clone(),
            created_utc: now,
            updated_utc: now,
        };
        self.tables.write().await.clients.push(client.clone());
        Ok(client)
    }

    async fn get_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
    ) -> Result<Option<Client>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .clients
            .iter()
            .find(|c| c.company_id == company_id && c.client_id == client_id)
            .cloned())
    }

    async fn list_clients(
        &self,
        company_id: Uuid,
        filter: &ListClientsFilter,
    ) -> Result<Vec<Client>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.clients, |c| {
            c.company_id == company_id && filter.matches(c)
        }))
    }

    async fn update_client(
        &self,
        company_id: Uuid,
        client_id: Uuid,
        input: &UpdateClient,
    ) -> Result<Option<Client>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(client) = tables
            .clients
            .iter_mut()
            .find(|c| c.company_id == company_id && c.client_id == client_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            client.name = name.clone();
        }
        if let Some(email) = &input.email {
            client.email = Some(email.clone());
        }
        if let Some(phone) = &input.phone {
            client.phone = Some(phone.clone());
        }
        if let Some(address) = &input.address {
            client.address = Some(address.clone());
        }
        if let Some(status) = input.status {
            client.status = status.as_str().to_string();
        }
        if let Some(segment) = input.segment {
            client.segment = Some(segment.as_str().to_string());
        }
        if let Some(notes) = &input.notes {
            client.notes = Some(notes.clone());
        }
        client.updated_utc = Utc::now();
        Ok(Some(client.clone()))
    }

    async fn delete_client(&self, company_id: Uuid, client_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let referenced = tables.subscriptions.iter().any(|s| s.client_id == client_id)
            || tables.invoices.iter().any(|i| i.client_id == client_id);
        let owned = tables
            .clients
            .iter()
            .any(|c| c.company_id == company_id && c.client_id == client_id);
        if owned && referenced {
            return Err(conflict("Client still has subscriptions or invoices"));
        }
        tables
            .clients
            .retain(|c| !(c.company_id == company_id && c.client_id == client_id));
        Ok(owned)
    }

    // =========================================================================
    // Services
    // =========================================================================

    async fn create_service(&self, input: &CreateService) -> Result<Service, AppError> {
        let now = Utc::now();
        let service = Service {
            service_id: Uuid::new_v4(),
            company_id: input.company_id,
            name: input.name.clone(),
            description: input.description.clone(),
            category: input.category.clone(),
            price: input.price,
            billing_cycle: input.billing_cycle.as_str().to_string(),
            active: input.active,
            created_utc: now,
            updated_utc: now,
        };
        self.tables.write().await.services.push(service.clone());
        Ok(service)
    }

    async fn get_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<Service>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .services
            .iter()
            .find(|s| s.company_id == company_id && s.service_id == service_id)
            .cloned())
    }

    async fn list_services(
        &self,
        company_id: Uuid,
        filter: &ListServicesFilter,
    ) -> Result<Vec<Service>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.services, |s| {
            s.company_id == company_id && filter.matches(s)
        }))
    }

    async fn update_service(
        &self,
        company_id: Uuid,
        service_id: Uuid,
        input: &UpdateService,
    ) -> Result<Option<Service>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(service) = tables
            .services
            .iter_mut()
            .find(|s| s.company_id == company_id && s.service_id == service_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            service.name = name.clone();
        }
        if let Some(description) = &input.description {
            service.description = Some(description.clone());
        }
        if let Some(category) = &input.category {
            service.category = Some(category.clone());
        }
        if let Some(price) = input.price {
            service.price = price;
        }
        if let Some(cycle) = input.billing_cycle {
            service.billing_cycle = cycle.as_str().to_string();
        }
        if let Some(active) = input.active {
            service.active = active;
        }
        service.updated_utc = Utc::now();
        Ok(Some(service.clone()))
    }

    async fn delete_service(&self, company_id: Uuid, service_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .services
            .iter()
            .any(|s| s.company_id == company_id && s.service_id == service_id);
        if owned && tables.subscriptions.iter().any(|s| s.service_id == service_id) {
            return Err(conflict("Service still has subscriptions"));
        }
        tables
            .services
            .retain(|s| !(s.company_id == company_id && s.service_id == service_id));
        for rate in tables.tax_rates.iter_mut() {
            if rate.service_id == Some(service_id) {
                rate.service_id = None;
            }
        }
        Ok(owned)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    async fn create_subscription(
        &self,
        input: &CreateSubscription,
    ) -> Result<Subscription, AppError> {
        let now = Utc::now();
        let subscription = Subscription {
            subscription_id: Uuid::new_v4(),
            company_id: input.company_id,
            client_id: input.client_id,
            service_id: input.service_id,
            status: SubscriptionStatus::Active.as_str().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            next_billing_date: input.next_billing_date,
            created_utc: now,
            updated_utc: now,
        };
        self.tables
            .write()
            .await
            .subscriptions
            .push(subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<Option<Subscription>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.company_id == company_id && s.subscription_id == subscription_id)
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        company_id: Uuid,
        filter: &ListSubscriptionsFilter,
    ) -> Result<Vec<Subscription>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.subscriptions, |s| {
            s.company_id == company_id && filter.matches(s)
        }))
    }

    async fn update_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
        input: &UpdateSubscription,
    ) -> Result<Option<Subscription>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(subscription) = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.company_id == company_id && s.subscription_id == subscription_id)
        else {
            return Ok(None);
        };
        if let Some(status) = input.status {
            subscription.status = status.as_str().to_string();
        }
        if let Some(end_date) = input.end_date {
            subscription.end_date = Some(end_date);
        }
        if let Some(next) = input.next_billing_date {
            subscription.next_billing_date = next;
        }
        subscription.updated_utc = Utc::now();
        Ok(Some(subscription.clone()))
    }

    async fn delete_subscription(
        &self,
        company_id: Uuid,
        subscription_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.subscriptions.len();
        tables
            .subscriptions
            .retain(|s| !(s.company_id == company_id && s.subscription_id == subscription_id));
        let deleted = tables.subscriptions.len() < before;
        if deleted {
            for invoice in tables.invoices.iter_mut() {
                if invoice.subscription_id == Some(subscription_id) {
                    invoice.subscription_id = None;
                }
            }
        }
        Ok(deleted)
    }

    // =========================================================================
    // Tax rates
    // =========================================================================

    async fn create_tax_rate(&self, input: &CreateTaxRate) -> Result<TaxRate, AppError> {
        let rate = TaxRate {
            tax_rate_id: Uuid::new_v4(),
            name: input.name.clone(),
            rate: input.rate,
            service_id: input.service_id,
            effective_from: input.effective_from,
            effective_to: input.effective_to,
            active: true,
            created_utc: Utc::now(),
        };
        self.tables.write().await.tax_rates.push(rate.clone());
        Ok(rate)
    }

    async fn get_tax_rate(&self, tax_rate_id: Uuid) -> Result<Option<TaxRate>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tax_rates
            .iter()
            .find(|r| r.tax_rate_id == tax_rate_id)
            .cloned())
    }

    async fn list_tax_rates(&self, filter: &ListTaxRatesFilter) -> Result<Vec<TaxRate>, AppError> {
        let tables = self.tables.read().await;
        let mut rates: Vec<TaxRate> = tables
            .tax_rates
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rates.sort_by(|a, b| a.name.cmp(&b.name).then(b.effective_from.cmp(&a.effective_from)));
        Ok(rates)
    }

    async fn update_tax_rate(
        &self,
        tax_rate_id: Uuid,
        input: &UpdateTaxRate,
    ) -> Result<Option<TaxRate>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(rate) = tables
            .tax_rates
            .iter_mut()
            .find(|r| r.tax_rate_id == tax_rate_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            rate.name = name.clone();
        }
        if let Some(value) = input.rate {
            rate.rate = value;
        }
        if let Some(from) = input.effective_from {
            rate.effective_from = from;
        }
        if let Some(to) = input.effective_to {
            rate.effective_to = Some(to);
        }
        if let Some(active) = input.active {
            rate.active = active;
        }
        Ok(Some(rate.clone()))
    }

    async fn delete_tax_rate(&self, tax_rate_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.tax_rates.len();
        tables.tax_rates.retain(|r| r.tax_rate_id != tax_rate_id);
        let deleted = tables.tax_rates.len() < before;
        if deleted {
            for invoice in tables.invoices.iter_mut() {
                if invoice.tax_rate_id == Some(tax_rate_id) {
                    invoice.tax_rate_id = None;
                }
            }
            for settings in tables.settings.values_mut() {
                if settings.default_tax_rate_id == Some(tax_rate_id) {
                    settings.default_tax_rate_id = None;
                }
            }
        }
        Ok(deleted)
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    async fn create_invoice(&self, input: &CreateInvoice) -> Result<Invoice, AppError> {
        let mut tables = self.tables.write().await;

        let highest = tables.highest_invoice_number(input.company_id);
        let sequence_number = match tables.invoice_sequences.get(&input.company_id) {
            Some(last) => last + 1,
            None => next_after(highest),
        };
        tables
            .invoice_sequences
            .insert(input.company_id, sequence_number);

        let now = Utc::now();
        let invoice = Invoice {
            invoice_id: Uuid::new_v4(),
            company_id: input.company_id,
            client_id: input.client_id,
            subscription_id: input.subscription_id,
            invoice_number: format_invoice_number(sequence_number),
            sequence_number,
            base_amount: input.base_amount,
            tax_rate_id: input.tax_rate_id,
            tax_rate: input.tax_rate,
            tax_amount: input.tax_amount,
            total_amount: input.total_amount,
            status: InvoiceStatus::Pending.as_str().to_string(),
            issue_date: input.issue_date,
            due_date: input.due_date,
            paid_date: None,
            payment_method: None,
            notes: input.notes.clone(),
            created_utc: now,
            updated_utc: now,
        };
        tables.invoices.push(invoice.clone());
        Ok(invoice)
    }

    async fn peek_next_invoice_number(&self, company_id: Uuid) -> Result<i64, AppError> {
        let tables = self.tables.read().await;
        Ok(match tables.invoice_sequences.get(&company_id) {
            Some(last) => last + 1,
            None => next_after(tables.highest_invoice_number(company_id)),
        })
    }

    async fn get_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<Option<Invoice>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .iter()
            .find(|i| i.company_id == company_id && i.invoice_id == invoice_id)
            .cloned())
    }

    async fn list_invoices(
        &self,
        company_id: Uuid,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.invoices, |i| {
            i.company_id == company_id && filter.matches(i)
        }))
    }

    async fn update_pending_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        input: &UpdateInvoice,
    ) -> Result<Option<Invoice>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(invoice) = tables.invoices.iter_mut().find(|i| {
            i.company_id == company_id
                && i.invoice_id == invoice_id
                && i.status == InvoiceStatus::Pending.as_str()
        }) else {
            return Ok(None);
        };
        if let Some(due_date) = input.due_date {
            invoice.due_date = due_date;
        }
        if let Some(notes) = &input.notes {
            invoice.notes = Some(notes.clone());
        }
        if let Some(base) = input.base_amount {
            invoice.base_amount = base;
        }
        if let Some(tax_rate_id) = input.tax_rate_id {
            invoice.tax_rate_id = tax_rate_id;
        }
        if let Some(rate) = input.tax_rate {
            invoice.tax_rate = rate;
        }
        if let Some(tax) = input.tax_amount {
            invoice.tax_amount = tax;
        }
        if let Some(total) = input.total_amount {
            invoice.total_amount = total;
        }
        invoice.updated_utc = Utc::now();
        Ok(Some(invoice.clone()))
    }

    async fn transition_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
        from: InvoiceStatus,
        to: InvoiceStatus,
    ) -> Result<Option<Invoice>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(invoice) = tables.invoices.iter_mut().find(|i| {
            i.company_id == company_id && i.invoice_id == invoice_id && i.status == from.as_str()
        }) else {
            return Ok(None);
        };
        invoice.status = to.as_str().to_string();
        invoice.updated_utc = Utc::now();
        Ok(Some(invoice.clone()))
    }

    async fn delete_unpaid_invoice(
        &self,
        company_id: Uuid,
        invoice_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.invoices.len();
        tables.invoices.retain(|i| {
            !(i.company_id == company_id
                && i.invoice_id == invoice_id
                && i.status != InvoiceStatus::Paid.as_str())
        });
        let deleted = tables.invoices.len() < before;
        if deleted {
            tables.payments.retain(|p| p.invoice_id != invoice_id);
        }
        Ok(deleted)
    }

    // =========================================================================
    // Payments
    // =========================================================================

    async fn create_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            company_id: input.company_id,
            invoice_id: input.invoice_id,
            amount: input.amount,
            method: input.method.clone(),
            reference: input.reference.clone(),
            status: PaymentStatus::Pending.as_str().to_string(),
            completed_utc: None,
            created_utc: now,
            updated_utc: now,
        };
        self.tables.write().await.payments.push(payment.clone());
        Ok(payment)
    }

    async fn get_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .iter()
            .find(|p| p.company_id == company_id && p.payment_id == payment_id)
            .cloned())
    }

    async fn list_payments(
        &self,
        company_id: Uuid,
        filter: &ListPaymentsFilter,
    ) -> Result<Vec<Payment>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.payments, |p| {
            p.company_id == company_id && filter.matches(p)
        }))
    }

    async fn complete_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
        paid_date: NaiveDate,
    ) -> Result<Option<PaymentCompletion>, AppError> {
        let mut tables = self.tables.write().await;
        let Tables {
            payments, invoices, ..
        } = &mut *tables;

        let Some(payment) = payments
            .iter_mut()
            .find(|p| p.company_id == company_id && p.payment_id == payment_id)
        else {
            return Ok(None);
        };
        let invoice = invoices
            .iter_mut()
            .find(|i| i.company_id == company_id && i.invoice_id == payment.invoice_id)
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!("Payment references a missing invoice"))
            })?;

        match payment.status() {
            PaymentStatus::Completed => {
                return Ok(Some(PaymentCompletion {
                    payment: payment.clone(),
                    invoice: invoice.clone(),
                    already_completed: true,
                }))
            }
            PaymentStatus::Failed => {
                return Err(conflict("Payment has failed and cannot be completed"))
            }
            PaymentStatus::Pending => {}
        }

        match invoice.status() {
            InvoiceStatus::Paid => return Err(conflict("Invoice is already paid")),
            InvoiceStatus::Cancelled => return Err(conflict("Invoice is cancelled")),
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
        }

        if payment.amount != invoice.total_amount {
            return Err(conflict("Payment amount no longer matches the invoice total"));
        }

        let now = Utc::now();
        payment.status = PaymentStatus::Completed.as_str().to_string();
        payment.completed_utc = Some(now);
        payment.updated_utc = now;

        invoice.status = InvoiceStatus::Paid.as_str().to_string();
        invoice.paid_date = Some(paid_date);
        invoice.payment_method = Some(payment.method.clone());
        invoice.updated_utc = now;

        Ok(Some(PaymentCompletion {
            payment: payment.clone(),
            invoice: invoice.clone(),
            already_completed: false,
        }))
    }

    async fn fail_payment(
        &self,
        company_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(payment) = tables.payments.iter_mut().find(|p| {
            p.company_id == company_id
                && p.payment_id == payment_id
                && p.status == PaymentStatus::Pending.as_str()
        }) else {
            return Ok(None);
        };
        payment.status = PaymentStatus::Failed.as_str().to_string();
        payment.updated_utc = Utc::now();
        Ok(Some(payment.clone()))
    }

    // =========================================================================
    // Gateway payments
    // =========================================================================

    async fn create_gateway_payment(
        &self,
        input: &CreateGatewayPayment,
    ) -> Result<GatewayPayment, AppError> {
        let mut tables = self.tables.write().await;
        if tables
            .gateway_payments
            .iter()
            .any(|g| g.order_id == input.order_id)
        {
            return Err(conflict("Gateway order already exists"));
        }
        let now = Utc::now();
        let payment = GatewayPayment {
            gateway_payment_id: Uuid::new_v4(),
            company_id: input.company_id,
            order_id: input.order_id.clone(),
            amount: input.amount,
            currency: input.currency.clone(),
            status: GatewayPaymentStatus::Pending.as_str().to_string(),
            gateway_payload: None,
            created_utc: now,
            updated_utc: now,
        };
        tables.gateway_payments.push(payment.clone());
        Ok(payment)
    }

    async fn list_gateway_payments(
        &self,
        company_id: Uuid,
    ) -> Result<Vec<GatewayPayment>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.gateway_payments, |g| {
            g.company_id == company_id
        }))
    }

    async fn find_gateway_payment(
        &self,
        order_id: &str,
    ) -> Result<Option<GatewayPayment>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .gateway_payments
            .iter()
            .find(|g| g.order_id == order_id)
            .cloned())
    }

    async fn settle_gateway_payment(
        &self,
        order_id: &str,
        status: GatewayPaymentStatus,
        payload: &serde_json::Value,
    ) -> Result<Option<GatewaySettlement>, AppError> {
        let mut tables = self.tables.write().await;
        let Tables {
            gateway_payments,
            companies,
            ..
        } = &mut *tables;

        let Some(payment) = gateway_payments.iter_mut().find(|g| g.order_id == order_id) else {
            return Ok(None);
        };
        if payment.status() != GatewayPaymentStatus::Pending {
            return Ok(Some(GatewaySettlement {
                payment: payment.clone(),
                company_activated: false,
            }));
        }

        let now = Utc::now();
        payment.status = status.as_str().to_string();
        payment.gateway_payload = Some(payload.clone());
        payment.updated_utc = now;

        let mut company_activated = false;
        if status == GatewayPaymentStatus::Completed {
            if let Some(company) = companies.iter_mut().find(|c| {
                c.company_id == payment.company_id
                    && c.status != CompanyStatus::Cancelled.as_str()
            }) {
                company.status = CompanyStatus::Active.as_str().to_string();
                company.trial_ends_utc = None;
                company.updated_utc = now;
                company_activated = true;
            }
        }

        Ok(Some(GatewaySettlement {
            payment: payment.clone(),
            company_activated,
        }))
    }

    // =========================================================================
    // Activity
    // =========================================================================

    async fn insert_activity(&self, entry: &NewActivity) -> Result<ActivityLog, AppError> {
        let log = ActivityLog {
            activity_id: Uuid::new_v4(),
            company_id: entry.company_id,
            user_id: entry.user_id,
            entity_type: entry.entity_type.as_str().to_string(),
            entity_id: entry.entity_id,
            action: entry.action.clone(),
            details: entry.details.clone(),
            created_utc: Utc::now(),
        };
        self.tables.write().await.activity.push(log.clone());
        Ok(log)
    }

    async fn list_activity(
        &self,
        company_id: Uuid,
        filter: &ListActivityFilter,
    ) -> Result<Vec<ActivityLog>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .activity
            .iter()
            .rev()
            .filter(|a| a.company_id == company_id && filter.matches(a))
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Settings
    // =========================================================================

    async fn get_settings(&self, company_id: Uuid) -> Result<Option<CompanySettings>, AppError> {
        Ok(self.tables.read().await.settings.get(&company_id).cloned())
    }

    async fn upsert_settings(&self, input: &UpsertSettings) -> Result<CompanySettings, AppError> {
        let settings = CompanySettings {
            company_id: input.company_id,
            sender_name: input.sender_name.clone(),
            sender_email: input.sender_email.clone(),
            email_enabled: input.email_enabled,
            whatsapp_enabled: input.whatsapp_enabled,
            default_tax_rate_id: input.default_tax_rate_id,
            reminder_days_before_due: input.reminder_days_before_due,
            updated_utc: Utc::now(),
        };
        self.tables
            .write()
            .await
            .settings
            .insert(input.company_id, settings.clone());
        Ok(settings)
    }

    // =========================================================================
    // Flows
    // =========================================================================

    async fn create_flow(&self, input: &CreateFlow) -> Result<Flow, AppError> {
        let now = Utc::now();
        let flow = Flow {
            flow_id: Uuid::new_v4(),
            company_id: input.company_id,
            name: input.name.clone(),
            active: input.active,
            steps: Json(input.steps.clone()),
            created_utc: now,
            updated_utc: now,
        };
        self.tables.write().await.flows.push(flow.clone());
        Ok(flow)
    }

    async fn get_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<Option<Flow>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .flows
            .iter()
            .find(|f| f.company_id == company_id && f.flow_id == flow_id)
            .cloned())
    }

    async fn list_flows(&self, company_id: Uuid) -> Result<Vec<Flow>, AppError> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.flows, |f| f.company_id == company_id))
    }

    async fn update_flow(
        &self,
        company_id: Uuid,
        flow_id: Uuid,
        input: &UpdateFlow,
    ) -> Result<Option<Flow>, AppError> {
        let mut tables = self.tables.write().await;
        let Some(flow) = tables
            .flows
            .iter_mut()
            .find(|f| f.company_id == company_id && f.flow_id == flow_id)
        else {
            return Ok(None);
        };
        if let Some(name) = &input.name {
            flow.name = name.clone();
        }
        if let Some(active) = input.active {
            flow.active = active;
        }
        if let Some(steps) = &input.steps {
            flow.steps = Json(steps.clone());
        }
        flow.updated_utc = Utc::now();
        Ok(Some(flow.clone()))
    }

    async fn delete_flow(&self, company_id: Uuid, flow_id: Uuid) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        let before = tables.flows.len();
        tables
            .flows
            .retain(|f| !(f.company_id == company_id && f.flow_id == flow_id));
        Ok(tables.flows.len() < before)
    }
}
