// ============================================================================
// Customer Domain
// ============================================================================
//
// - Value objects (Email, NationalId, CardTier, Address, Guardian, ...)
// - Errors (CustomerError for malformed input)
// - Model (Customer aggregate and derived lockout state)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod model;

pub use value_objects::*;
pub use errors::*;
pub use model::*;
