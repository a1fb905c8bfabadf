// ============================================================================
// Registration
// ============================================================================
//
// - request:      submitted form, input validation, returned summary
// - orchestrator: verification, uniqueness checks, allocation, persistence
//
// ============================================================================

mod orchestrator;
mod request;

pub use orchestrator::{RegistrationError, RegistrationOrchestrator, MAX_WRITE_ATTEMPTS};
pub use request::{RegistrationRequest, RegistrationSummary, MIN_PASSWORD_LENGTH};
