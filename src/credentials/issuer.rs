use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::config::CredentialSettings;

// ============================================================================
// Credential Issuer - stateless signed bearer tokens
// ============================================================================
//
// Claims: sub (email), iss, aud, iat, nbf (= iat), exp, jti, purpose.
// Validation order: signature, issuer, audience, expiry, not-before, purpose.
// Callers only learn "invalid"; the precise reason is logged at debug.
//
// The signing key must hold at least 256 bits. A shorter or missing key is
// not replaced by anything weaker: issuance fails and every token is invalid.
//
// ============================================================================

pub const MIN_SIGNING_KEY_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    Access,
    EmailVerification,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::EmailVerification => "email_verification",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    sub: String,
    iss: String,
    aud: String,
    iat: i64,
    nbf: i64,
    exp: i64,
    jti: String,
    purpose: TokenPurpose,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Signing key must be at least {min} bytes, got {actual}")]
    SigningKeyTooShort { min: usize, actual: usize },

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
}

/// Why a token was refused. Never shown to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub(crate) enum TokenRejection {
    #[error("no usable signing key")]
    NoKey,
    #[error("signature mismatch")]
    BadSignature,
    #[error("issuer mismatch")]
    IssuerMismatch,
    #[error("audience mismatch")]
    AudienceMismatch,
    #[error("token expired")]
    Expired,
    #[error("token not yet valid")]
    NotYetValid,
    #[error("purpose mismatch")]
    WrongPurpose,
    #[error("malformed token")]
    Malformed,
}

impl From<jsonwebtoken::errors::Error> for TokenRejection {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::InvalidSignature => TokenRejection::BadSignature,
            ErrorKind::InvalidIssuer => TokenRejection::IssuerMismatch,
            ErrorKind::InvalidAudience => TokenRejection::AudienceMismatch,
            ErrorKind::ExpiredSignature => TokenRejection::Expired,
            ErrorKind::ImmatureSignature => TokenRejection::NotYetValid,
            _ => TokenRejection::Malformed,
        }
    }
}

/// The single failure callers see from `validate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid token")]
pub struct InvalidToken;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_at: DateTime<Utc>,
    #[serde(skip)]
    pub purpose: TokenPurpose,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

pub struct CredentialIssuer {
    keys: Option<SigningKeys>,
    key_len: usize,
    issuer: String,
    audience: String,
    access_lifetime: Duration,
    verification_lifetime: Duration,
}

impl CredentialIssuer {
    pub fn new(settings: &CredentialSettings) -> Self {
        let secret = settings.signing_key.as_bytes();
        let keys = (secret.len() >= MIN_SIGNING_KEY_BYTES).then(|| SigningKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        });

        Self {
            keys,
            key_len: secret.len(),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            access_lifetime: Duration::seconds(settings.token_lifetime_secs as i64),
            verification_lifetime: Duration::seconds(settings.verification_token_lifetime_secs as i64),
        }
    }

    pub fn has_usable_key(&self) -> bool {
        self.keys.is_some()
    }

    /// Issue an access token for `subject_email`
    pub fn issue(&self, subject_email: &str) -> Result<IssuedToken, CredentialError> {
        self.issue_for(subject_email, TokenPurpose::Access)
    }

    pub fn issue_for(&self, subject_email: &str, purpose: TokenPurpose) -> Result<IssuedToken, CredentialError> {
        self.issue_at(subject_email, purpose, Utc::now())
    }

    fn issue_at(
        &self,
        subject_email: &str,
        purpose: TokenPurpose,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, CredentialError> {
        let keys = self.keys.as_ref().ok_or_else(|| {
            tracing::error!(
                key_bytes = self.key_len,
                "Refusing to issue token: signing key shorter than 256 bits"
            );
            CredentialError::SigningKeyTooShort { min: MIN_SIGNING_KEY_BYTES, actual: self.key_len }
        })?;

        let lifetime = match purpose {
            TokenPurpose::Access => self.access_lifetime,
            TokenPurpose::EmailVerification => self.verification_lifetime,
        };
        let expires_at = issued_at + lifetime;

        let claims = Claims {
            sub: subject_email.to_string(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: issued_at.timestamp(),
            nbf: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            purpose,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)?;

        Ok(IssuedToken {
            token,
            token_type: "Bearer",
            expires_at,
            purpose,
        })
    }

    /// Validate an access token and return its subject email
    pub fn validate(&self, token: &str) -> Result<String, InvalidToken> {
        self.validate_for(token, TokenPurpose::Access)
    }

    pub fn validate_for(&self, token: &str, purpose: TokenPurpose) -> Result<String, InvalidToken> {
        self.inspect(token, purpose).map_err(|reason| {
            tracing::debug!(reason = %reason, purpose = %purpose, "Token rejected");
            InvalidToken
        })
    }

    pub(crate) fn inspect(&self, token: &str, purpose: TokenPurpose) -> Result<String, TokenRejection> {
        let keys = self.keys.as_ref().ok_or(TokenRejection::NoKey)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "nbf", "iss", "aud", "sub"]);
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &keys.decoding, &validation)?;

        if data.claims.purpose != purpose {
            return Err(TokenRejection::WrongPurpose);
        }
        Ok(data.claims.sub)
    }
}
