// ============================================================================
// Credentials
// ============================================================================
//
// - issuer:   signed, time-bounded bearer tokens (HS256 JWT)
// - password: Argon2id password hashing
//
// ============================================================================

mod issuer;
mod password;

pub use issuer::{CredentialError, CredentialIssuer, InvalidToken, IssuedToken, TokenPurpose};
pub use password::{PasswordError, PasswordHasher};

#[cfg(test)]
pub(crate) use password::tests::fast_settings as fast_password_settings;
