// ============================================================================
// Customer Input Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum CustomerError {
    #[error("Email cannot be empty")]
    EmptyEmail,

    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("National ID must be exactly 16 digits")]
    InvalidNationalId,

    #[error("Full name cannot be empty")]
    EmptyFullName,

    #[error("Mother's maiden name cannot be empty")]
    EmptyMotherMaidenName,

    #[error("Account type cannot be empty")]
    EmptyAccountType,

    #[error("Password must be at least {0} characters")]
    PasswordTooShort(usize),

    #[error("Birth date cannot be in the future")]
    BirthDateInFuture,

    #[error("Account code must be a positive number, got {0}")]
    InvalidAccountCode(i64),
}
