use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::LockoutSettings;
use crate::domain::customer::{Customer, LockoutState};
use crate::metrics::Metrics;
use crate::persistence::{CustomerStore, FailedLoginUpdate, StoreError};

// ============================================================================
// Login Attempt Guard
// ============================================================================
//
// Two states per account, both derived from durable customer fields:
//
//   Open   -> locked_until absent or in the past
//   Locked -> locked_until in the future; every attempt is refused
//
// Open -> Locked when the failed counter reaches the threshold (counter
// reset to 0 in the same write). Locked -> Open happens by time alone.
// Each failure is its own store write, independent of the request outcome.
//
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub threshold: u32,
    pub duration: Duration,
}

impl From<&LockoutSettings> for LockoutPolicy {
    fn from(settings: &LockoutSettings) -> Self {
        Self {
            threshold: settings.threshold,
            duration: settings.duration(),
        }
    }
}

pub struct LoginAttemptGuard {
    store: Arc<dyn CustomerStore>,
    policy: LockoutPolicy,
    metrics: Arc<Metrics>,
}

impl LoginAttemptGuard {
    pub fn new(store: Arc<dyn CustomerStore>, policy: LockoutPolicy, metrics: Arc<Metrics>) -> Self {
        Self { store, policy, metrics }
    }

    /// `Some(until)` while the account is locked
    pub fn locked_until(&self, customer: &Customer, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let state = customer.lockout();
        if state.is_locked_at(now) {
            state.locked_until
        } else {
            None
        }
    }

    pub async fn record_failure(&self, customer_id: Uuid) -> Result<LockoutState, StoreError> {
        // Stores keep microseconds; truncate so the returned state compares equal
        let lock_until = (Utc::now()
            + chrono::Duration::milliseconds(self.policy.duration.as_millis() as i64))
        .trunc_subsecs(6);
        let update = FailedLoginUpdate {
            threshold: i32::try_from(self.policy.threshold).unwrap_or(i32::MAX),
            lock_until,
        };

        let state = self.store.record_failed_login(customer_id, update).await?;

        if state.locked_until == Some(lock_until) {
            self.metrics.record_lockout();
            tracing::warn!(
                customer_id = %customer_id,
                threshold = self.policy.threshold,
                locked_until = %lock_until,
                "Account locked after repeated failed logins"
            );
        } else {
            tracing::debug!(
                customer_id = %customer_id,
                failed_attempts = state.failed_attempts,
                "Failed login recorded"
            );
        }
        Ok(state)
    }

    /// Reset the counter after a successful login
    pub async fn record_success(&self, customer: &Customer) -> Result<(), StoreError> {
        if customer.failed_login_attempts == 0 {
            return Ok(());
        }
        self.store.reset_failed_logins(customer.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{fixtures, InMemoryCustomerStore};

    #[tokio::test]
    async fn test_locks_when_threshold_reached() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let customer = fixtures::customer("john@example.com", "3175031234567890", "0811111111");
        store.insert_customer(&customer).await.unwrap();

        let metrics = Arc::new(Metrics::new().unwrap());
        let guard = LoginAttemptGuard::new(
            store.clone(),
            LockoutPolicy { threshold: 2, duration: Duration::from_secs(60) },
            metrics.clone(),
        );

        let first = guard.record_failure(customer.id).await.unwrap();
        assert_eq!(first.failed_attempts, 1);
        assert!(!first.is_locked_at(Utc::now()));

        let second = guard.record_failure(customer.id).await.unwrap();
        assert_eq!(second.failed_attempts, 0);
        assert!(second.is_locked_at(Utc::now()));
        assert_eq!(metrics.account_lockouts_total.get(), 1);

        let stored = store.find_by_email("john@example.com").await.unwrap().unwrap();
        assert!(guard.locked_until(&stored, Utc::now()).is_some());
        assert!(guard
            .locked_until(&stored, Utc::now() + chrono::Duration::minutes(2))
            .is_none());
    }
}
