use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::guard::LoginAttemptGuard;
use crate::credentials::{CredentialError, CredentialIssuer, IssuedToken, PasswordError, PasswordHasher};
use crate::domain::customer::{mask, CustomerProfile};
use crate::error::{Classified, ErrorClass};
use crate::metrics::Metrics;
use crate::persistence::{CustomerStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Unknown email and wrong password look the same
    #[error("Email or password is incorrect")]
    InvalidCredentials,

    #[error("Account is locked until {until}")]
    AccountLocked { until: DateTime<Utc> },

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Email is already verified")]
    EmailAlreadyVerified,

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("Password check failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Token issuance failed: {0}")]
    Credential(#[from] CredentialError),
}

impl AuthError {
    pub fn outcome(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::AccountLocked { .. } => "locked",
            AuthError::InvalidToken => "invalid_token",
            AuthError::EmailAlreadyVerified => "already_verified",
            AuthError::Storage(_) | AuthError::Password(_) | AuthError::Credential(_) => "system_error",
        }
    }
}

impl Classified for AuthError {
    fn class(&self) -> ErrorClass {
        match self {
            AuthError::InvalidCredentials | AuthError::InvalidToken => ErrorClass::Authentication,
            AuthError::AccountLocked { .. } => ErrorClass::Locked,
            AuthError::EmailAlreadyVerified => ErrorClass::Conflict,
            AuthError::Storage(_) | AuthError::Password(_) | AuthError::Credential(_) => ErrorClass::System,
        }
    }
}

pub struct AuthenticationService {
    store: Arc<dyn CustomerStore>,
    guard: LoginAttemptGuard,
    hasher: PasswordHasher,
    issuer: Arc<CredentialIssuer>,
    metrics: Arc<Metrics>,
}

impl AuthenticationService {
    pub fn new(
        store: Arc<dyn CustomerStore>,
        guard: LoginAttemptGuard,
        hasher: PasswordHasher,
        issuer: Arc<CredentialIssuer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { store, guard, hasher, issuer, metrics }
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let result = self.try_authenticate(email, password).await;
        match &result {
            Ok(_) => self.metrics.record_login("success"),
            Err(e) => {
                self.metrics.record_login(e.outcome());
                if e.class() == ErrorClass::System {
                    tracing::error!(error = %e, "Login failed");
                }
            }
        }
        result
    }

    async fn try_authenticate(&self, email: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let email = email.trim().to_lowercase();

        let customer = match self.store.find_by_email(&email).await? {
            Some(customer) => customer,
            None => {
                self.hasher.verify_dummy(password.to_string()).await?;
                tracing::info!(email = %mask(&email), "Login for unknown email");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if let Some(until) = self.guard.locked_until(&customer, Utc::now()) {
            tracing::info!(customer_id = %customer.id, locked_until = %until, "Login refused, account locked");
            return Err(AuthError::AccountLocked { until });
        }

        let matches = self
            .hasher
            .verify(password.to_string(), customer.password_hash.clone())
            .await?;
        if !matches {
            self.guard.record_failure(customer.id).await?;
            return Err(AuthError::InvalidCredentials);
        }

        self.guard.record_success(&customer).await?;
        let token = self.issuer.issue(&customer.email)?;
        self.metrics.record_token_issued(token.purpose.as_str());

        tracing::info!(customer_id = %customer.id, "Login succeeded");
        Ok(token)
    }

    /// Resolve an access token to the customer it was issued for
    pub async fn profile(&self, token: &str) -> Result<CustomerProfile, AuthError> {
        let email = self.issuer.validate(token).map_err(|_| AuthError::InvalidToken)?;
        match self.store.find_by_email(&email).await? {
            Some(customer) => Ok(customer.profile()),
            // Signed for an email that no longer resolves
            None => Err(AuthError::InvalidToken),
        }
    }
}
