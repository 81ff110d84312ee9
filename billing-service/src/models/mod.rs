//! Domain models for billing-service.

mod activity;
mod client;
mod company;
mod flow;
mod gateway;
mod invoice;
mod payment;
mod service;
mod settings;
mod subscription;
mod tax_rate;
mod user;

pub use activity::{
    clamp_limit, ActivityLog, EntityType, ListActivityFilter, NewActivity, DEFAULT_ACTIVITY_LIMIT,
    MAX_ACTIVITY_LIMIT,
};
pub use client::{Client, ClientStatus, CreateClient, ListClientsFilter, Segment, UpdateClient};
pub use company::{Company, CompanyStatus, CreateCompany, UpdateCompany};
pub use flow::{
    validate_steps, ActionChannel, ConditionOperator, CreateFlow, Flow, FlowStep, TriggerEvent,
    UpdateFlow,
};
pub use gateway::{
    CreateGatewayPayment, GatewayPayment, GatewayPaymentStatus, GatewaySettlement,
};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, ListInvoicesFilter, UpdateInvoice};
pub use payment::{CreatePayment, ListPaymentsFilter, Payment, PaymentCompletion, PaymentStatus};
pub use service::{BillingCycle, CreateService, ListServicesFilter, Service, UpdateService};
pub use settings::{CompanySettings, UpsertSettings, DEFAULT_REMINDER_DAYS};
pub use subscription::{
    CreateSubscription, ListSubscriptionsFilter, Subscription, SubscriptionStatus,
    UpdateSubscription,
};
pub use tax_rate::{CreateTaxRate, ListTaxRatesFilter, TaxRate, UpdateTaxRate};
pub use user::{CreateUser, UpdateUser, User, UserRole};
