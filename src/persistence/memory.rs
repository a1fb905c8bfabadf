use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CustomerStore, FailedLoginUpdate, StoreError, UniqueField};
use crate::domain::customer::{Customer, CustomerCounts, LockoutState};

// ============================================================================
// In-Memory Customer Store
// ============================================================================
//
// Enforces the same uniqueness constraints as the PostgreSQL schema. Every
// write happens under one write lock, so an insert is all-or-nothing.
//
// ============================================================================

#[derive(Default)]
pub struct InMemoryCustomerStore {
    customers: RwLock<HashMap<Uuid, Customer>>,
    /// Existence checks always answer "free", as if another writer raced us
    stale_prechecks: bool,
}

impl InMemoryCustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn with_stale_prechecks(mut self) -> Self {
        self.stale_prechecks = true;
        self
    }

    async fn any(&self, predicate: impl Fn(&Customer) -> bool) -> bool {
        if self.stale_prechecks {
            return false;
        }
        self.customers.read().await.values().any(predicate)
    }

    async fn find(&self, predicate: impl Fn(&Customer) -> bool) -> Option<Customer> {
        self.customers.read().await.values().find(|c| predicate(c)).cloned()
    }

    fn conflict(existing: &Customer, candidate: &Customer) -> Option<UniqueField> {
        if existing.national_id == candidate.national_id {
            Some(UniqueField::NationalId)
        } else if existing.email.eq_ignore_ascii_case(&candidate.email) {
            Some(UniqueField::Email)
        } else if existing.phone == candidate.phone {
            Some(UniqueField::Phone)
        } else if existing.account_code == candidate.account_code {
            Some(UniqueField::AccountCode)
        } else if existing.card_number == candidate.card_number {
            Some(UniqueField::CardNumber)
        } else {
            None
        }
    }
}

#[async_trait]
impl CustomerStore for InMemoryCustomerStore {
    async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
        let mut customers = self.customers.write().await;

        if let Some(field) = customers.values().find_map(|c| Self::conflict(c, customer)) {
            return Err(StoreError::UniqueViolation(field));
        }

        customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.any(|c| c.email.eq_ignore_ascii_case(email)).await)
    }

    async fn phone_exists(&self, phone: &str) -> Result<bool, StoreError> {
        Ok(self.any(|c| c.phone == phone).await)
    }

    async fn national_id_exists(&self, national_id: &str) -> Result<bool, StoreError> {
        Ok(self.any(|c| c.national_id == national_id).await)
    }

    async fn account_code_exists(&self, account_code: i64) -> Result<bool, StoreError> {
        Ok(self.any(|c| c.account_code == account_code).await)
    }

    async fn card_number_exists(&self, card_number: &str) -> Result<bool, StoreError> {
        Ok(self.any(|c| c.card_number == card_number).await)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.find(|c| c.email.eq_ignore_ascii_case(email)).await)
    }

    async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.find(|c| c.national_id == national_id).await)
    }

    async fn find_by_account_code(&self, account_code: i64) -> Result<Option<Customer>, StoreError> {
        Ok(self.find(|c| c.account_code == account_code).await)
    }

    async fn record_failed_login(
        &self,
        customer_id: Uuid,
        update: FailedLoginUpdate,
    ) -> Result<LockoutState, StoreError> {
        let mut customers = self.customers.write().await;
        let customer = customers
            .get_mut(&customer_id)
            .ok_or(StoreError::NotFound(customer_id))?;

        let attempts = customer.failed_login_attempts + 1;
        if attempts >= update.threshold {
            customer.failed_login_attempts = 0;
            customer.locked_until = Some(update.lock_until);
        } else {
            customer.failed_login_attempts = attempts;
        }
        customer.updated_at = Utc::now();

        Ok(customer.lockout())
    }

    async fn reset_failed_logins(&self, customer_id: Uuid) -> Result<(), StoreError> {
        let mut customers = self.customers.write().await;
        let customer = customers
            .get_mut(&customer_id)
            .ok_or(StoreError::NotFound(customer_id))?;

        customer.failed_login_attempts = 0;
        customer.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_email_verified(&self, email: &str) -> Result<bool, StoreError> {
        let mut customers = self.customers.write().await;
        match customers.values_mut().find(|c| c.email.eq_ignore_ascii_case(email)) {
            Some(customer) if !customer.email_verified => {
                customer.email_verified = true;
                customer.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn counts(&self) -> Result<CustomerCounts, StoreError> {
        let customers = self.customers.read().await;
        Ok(CustomerCounts {
            total: customers.len() as i64,
            email_verified: customers.values().filter(|c| c.email_verified).count() as i64,
        })
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
