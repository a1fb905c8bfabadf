// ============================================================================
// Authentication
// ============================================================================
//
// - guard:              per-account failed-login counter and lockout window
// - service:            password login, token issuance, token -> profile
// - email_verification: email-verification token workflow
//
// ============================================================================

mod email_verification;
mod guard;
mod service;

pub use email_verification::EmailVerificationService;
pub use guard::{LockoutPolicy, LoginAttemptGuard};
pub use service::{AuthError, AuthenticationService};
