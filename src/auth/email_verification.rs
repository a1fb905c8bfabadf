use std::sync::Arc;

use super::AuthError;
use crate::credentials::{CredentialIssuer, IssuedToken, TokenPurpose};
use crate::metrics::Metrics;
use crate::persistence::CustomerStore;

/// Issues and redeems email-verification tokens. Delivering the token to the
/// mailbox is left to the mail gateway.
pub struct EmailVerificationService {
    store: Arc<dyn CustomerStore>,
    issuer: Arc<CredentialIssuer>,
    metrics: Arc<Metrics>,
}

impl EmailVerificationService {
    pub fn new(store: Arc<dyn CustomerStore>, issuer: Arc<CredentialIssuer>, metrics: Arc<Metrics>) -> Self {
        Self { store, issuer, metrics }
    }

    /// `access_token` identifies the customer asking for verification
    pub async fn request(&self, access_token: &str) -> Result<IssuedToken, AuthError> {
        let email = self.issuer.validate(access_token).map_err(|_| AuthError::InvalidToken)?;
        let customer = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if customer.email_verified {
            return Err(AuthError::EmailAlreadyVerified);
        }

        let token = self.issuer.issue_for(&customer.email, TokenPurpose::EmailVerification)?;
        self.metrics.record_token_issued(token.purpose.as_str());
        tracing::info!(customer_id = %customer.id, "Email verification token issued");
        Ok(token)
    }

    /// Returns false when the email was already verified
    pub async fn confirm(&self, verification_token: &str) -> Result<bool, AuthError> {
        let email = self
            .issuer
            .validate_for(verification_token, TokenPurpose::EmailVerification)
            .map_err(|_| AuthError::InvalidToken)?;

        let customer = self
            .store
            .find_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let newly_verified = self.store.mark_email_verified(&customer.email).await?;
        if newly_verified {
            tracing::info!(customer_id = %customer.id, "Email verified");
        }
        Ok(newly_verified)
    }
}
