use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::value_objects::{Address, CardTier, Guardian};

// ============================================================================
// Customer Aggregate
// ============================================================================
//
// Created once by registration, then only the lockout fields and the
// email-verified flag change. Never deleted.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: Uuid,

    // Identity
    pub full_name: String,
    pub national_id: String,
    pub mother_maiden_name: String,
    pub birth_place: String,
    pub birth_date: NaiveDate,
    pub sex: String,
    pub religion: String,
    pub phone: String,
    pub email: String,

    // Credentials
    pub password_hash: String,

    // Account
    pub account_code: i64,
    pub card_tier: CardTier,
    pub card_number: String,
    pub account_type: String,

    // Lockout
    pub failed_login_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,

    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    pub address: Address,
    pub guardian: Option<Guardian>,
}

impl Customer {
    pub fn lockout(&self) -> LockoutState {
        LockoutState {
            failed_attempts: self.failed_login_attempts,
            locked_until: self.locked_until,
        }
    }

    pub fn profile(&self) -> CustomerProfile {
        CustomerProfile {
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            account_code: self.account_code.to_string(),
            card_tier: self.card_tier.name().to_string(),
            card_number: self.card_number.clone(),
            account_type: self.account_type.clone(),
            email_verified: self.email_verified,
            created_at: self.created_at,
        }
    }
}

/// Durable login-guard fields of one customer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockoutState {
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutState {
    pub fn is_locked_at(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.is_some_and(|until| until > now)
    }
}

/// Aggregate counts for reporting
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerCounts {
    pub total: i64,
    pub email_verified: i64,
}

/// Customer view returned to an authenticated caller
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub account_code: String,
    pub card_tier: String,
    pub card_number: String,
    pub account_type: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_lockout_only_while_expiry_in_future() {
        let now = Utc::now();
        let open = LockoutState { failed_attempts: 3, locked_until: None };
        let locked = LockoutState { failed_attempts: 0, locked_until: Some(now + Duration::seconds(30)) };
        let expired = LockoutState { failed_attempts: 0, locked_until: Some(now - Duration::seconds(1)) };

        assert!(!open.is_locked_at(now));
        assert!(locked.is_locked_at(now));
        assert!(!expired.is_locked_at(now));
    }
}
