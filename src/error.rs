// ============================================================================
// Error classes shared by the workflows
// ============================================================================
//
// Workflow errors are typed per component. The two top-level workflows
// (registration, authentication) classify their errors so the transport
// layer can pick a status code without inspecting variants.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Caller-correctable input problem
    Validation,
    /// Input clashes with data already registered: duplicate email, phone,
    /// national ID or account code. Rendered as 409, not as a 400 `Validation`.
    Conflict,
    /// External dependency down or misbehaving, retry later
    Dependency,
    /// Wrong or missing credentials
    Authentication,
    /// Account temporarily locked
    Locked,
    /// Anything unexpected; details stay in the logs
    System,
}

pub trait Classified: std::error::Error {
    fn class(&self) -> ErrorClass;

    /// Text safe to show the caller
    fn public_message(&self) -> String {
        match self.class() {
            ErrorClass::System => "An internal error occurred, please try again later".to_string(),
            _ => self.to_string(),
        }
    }
}
