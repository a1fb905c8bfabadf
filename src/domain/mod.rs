// ============================================================================
// Domain Layer
// ============================================================================
//
// Customer aggregate, its value objects and input errors. No I/O here:
// persistence, the identity registry and credentials live in their own
// modules and depend on this one.
//
// ============================================================================

pub mod customer;
