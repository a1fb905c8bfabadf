// ============================================================================
// Customer Persistence
// ============================================================================
//
// The store is the authoritative backstop for every uniqueness rule: the
// existence checks are best-effort pre-checks, and a racing insert is
// rejected by the store with `StoreError::UniqueViolation`.
//
// Backends:
// - postgres: sqlx pool, unique indexes, one transaction per registration
// - memory:   same constraints behind a lock, for tests and local runs
//
// ============================================================================

mod memory;
mod postgres;

pub use memory::InMemoryCustomerStore;
pub use postgres::PgCustomerStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

use crate::domain::customer::{Customer, CustomerCounts, LockoutState};

/// Column guarded by a uniqueness constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Phone,
    NationalId,
    AccountCode,
    CardNumber,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UniqueField::Email => "email",
            UniqueField::Phone => "phone",
            UniqueField::NationalId => "national_id",
            UniqueField::AccountCode => "account_code",
            UniqueField::CardNumber => "card_number",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Unique constraint violated on {0}")]
    UniqueViolation(UniqueField),

    #[error("Customer not found: {0}")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Lockout transition applied atomically by `record_failed_login`
#[derive(Debug, Clone, Copy)]
pub struct FailedLoginUpdate {
    pub threshold: i32,
    pub lock_until: DateTime<Utc>,
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    /// Persist a new customer together with its address and guardian.
    /// All rows commit together or not at all.
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError>;

    /// `email` must already be lower-cased
    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;
    async fn phone_exists(&self, phone: &str) -> Result<bool, StoreError>;
    async fn national_id_exists(&self, national_id: &str) -> Result<bool, StoreError>;
    async fn account_code_exists(&self, account_code: i64) -> Result<bool, StoreError>;
    async fn card_number_exists(&self, card_number: &str) -> Result<bool, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError>;
    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Customer>, StoreError>;
    async fn find_by_account_code(&self, account_code: i64) -> Result<Option<Customer>, StoreError>;

    /// Increment the failed-attempt counter in its own write. When the counter
    /// reaches the threshold it is reset to zero and `lock_until` is stored.
    async fn record_failed_login(
        &self,
        customer_id: Uuid,
        update: FailedLoginUpdate,
    ) -> Result<LockoutState, StoreError>;

    async fn reset_failed_logins(&self, customer_id: Uuid) -> Result<(), StoreError>;

    /// Returns false when the customer was already verified
    async fn mark_email_verified(&self, email: &str) -> Result<bool, StoreError>;

    async fn counts(&self) -> Result<CustomerCounts, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    use crate::domain::customer::{Address, CardTier, Customer};

    pub fn customer(email: &str, national_id: &str, phone: &str) -> Customer {
        let now = Utc::now();
        Customer {
            id: Uuid::new_v4(),
            full_name: "John Doe".to_string(),
            national_id: national_id.to_string(),
            mother_maiden_name: "Jane".to_string(),
            birth_place: "Jakarta".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
            sex: "LAKI-LAKI".to_string(),
            religion: "ISLAM".to_string(),
            phone: phone.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            account_code: 2026101234,
            card_tier: CardTier::Gold,
            card_number: "4102 0000 0000 0001".to_string(),
            account_type: "Tabungan Reguler".to_string(),
            failed_login_attempts: 0,
            locked_until: None,
            email_verified: false,
            created_at: now,
            updated_at: now,
            address: Address::default(),
            guardian: None,
        }
    }
}
