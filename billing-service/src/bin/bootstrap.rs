//! Provision demo accounts.
//!
//! ```text
//! bootstrap admin   # demo company and its owner
//! bootstrap demo    # demo company plus an admin user
//! bootstrap staff   # demo company plus a staff user
//! ```
//!
//! Re-running is safe: an existing e-mail is reused instead of re-created.
//! The process always exits 0; failures are reported on stderr.

use billing_service::config::BillingConfig;
use billing_service::models::{CreateUser, UpsertSettings, User, UserRole};
use billing_service::services::{companies, BillingStore};
use billing_service::startup::connect_store;
use rust_decimal::Decimal;
use service_core::error::AppError;
use uuid::Uuid;

const COMPANY_NAME: &str = "Demo Company";
const OWNER_EMAIL: &str = "owner@demo-company.test";
const ADMIN_EMAIL: &str = "admin@demo-company.test";
const STAFF_EMAIL: &str = "staff@demo-company.test";

#[derive(Debug, Clone, Copy)]
enum Mode {
    Admin,
    Demo,
    Staff,
}

impl Mode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Mode::Admin),
            "demo" => Some(Mode::Demo),
            "staff" => Some(Mode::Staff),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() {
    let Some(mode) = std::env::args().nth(1).as_deref().and_then(Mode::parse) else {
        eprintln!("usage: bootstrap <admin|demo|staff>");
        return;
    };

    if let Err(e) = run(mode).await {
        eprintln!("bootstrap {:?} failed: {}", mode, e);
    }
}

async fn run(mode: Mode) -> Result<(), AppError> {
    let config = BillingConfig::from_env()?;
    if config.database.is_memory() {
        eprintln!("DATABASE_URL is not set; provisioning into a throwaway in-memory store");
    }
    let store = connect_store(&config).await?;

    let owner = ensure_owner(store.as_ref(), config.billing.trial_days).await?;
    let user = match mode {
        Mode::Admin => owner,
        Mode::Demo => {
            ensure_member(store.as_ref(), owner.company_id, ADMIN_EMAIL, "Demo Admin", UserRole::Admin)
                .await?
        }
        Mode::Staff => {
            ensure_member(store.as_ref(), owner.company_id, STAFF_EMAIL, "Demo Staff", UserRole::Staff)
                .await?
        }
    };

    if store.get_settings(user.company_id).await?.is_none() {
        store
            .upsert_settings(&UpsertSettings::defaults(
                user.company_id,
                COMPANY_NAME,
                OWNER_EMAIL,
            ))
            .await?;
    }

    println!("company_id={}", user.company_id);
    println!("user_id={}", user.user_id);
    println!("email={}", user.email);
    println!("role={}", user.role);
    Ok(())
}

async fn ensure_owner(store: &dyn BillingStore, trial_days: i64) -> Result<User, AppError> {
    if let Some(existing) = store.find_user_by_email(OWNER_EMAIL).await? {
        println!("{} already exists, reusing", OWNER_EMAIL);
        return Ok(existing);
    }

    let outcome = companies::signup(
        store,
        companies::Signup {
            company_name: COMPANY_NAME.to_string(),
            email: OWNER_EMAIL.to_string(),
            full_name: "Demo Owner".to_string(),
            phone: None,
            address: None,
            plan: "starter".to_string(),
            monthly_payment: Decimal::new(2900, 2),
        },
        trial_days,
    )
    .await?;
    println!("signed up {}", OWNER_EMAIL);
    Ok(outcome.owner)
}

async fn ensure_member(
    store: &dyn BillingStore,
    company_id: Uuid,
    email: &str,
    full_name: &str,
    role: UserRole,
) -> Result<User, AppError> {
    if let Some(existing) = store.find_user_by_email(email).await? {
        println!("{} already exists, reusing", email);
        return Ok(existing);
    }

    let user = store
        .create_user(&CreateUser {
            company_id,
            email: email.to_string(),
            full_name: full_name.to_string(),
            role,
        })
        .await?;
    println!("created {} ({})", email, role.as_str());
    Ok(user)
}
