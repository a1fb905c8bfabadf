use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

// ============================================================================
// Identity Registry - external national identity verification
// ============================================================================
//
// Every way the remote call can end is a variant of VerificationOutcome, so
// callers match exhaustively instead of catching errors:
//
//   Verified          -> registry confirmed the identity, may carry fields
//   Rejected          -> registry answered and disagreed (or refused input)
//   Unreachable       -> timeout, network failure, 5xx, open circuit
//   MalformedResponse -> registry answered with something unreadable
//
// ============================================================================

mod http;

pub use http::{interpret_response, HttpIdentityRegistry, RegistryCallError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationQuery {
    #[serde(rename = "nik")]
    pub national_id: String,
    #[serde(rename = "namaLengkap")]
    pub full_name: String,
    #[serde(rename = "tanggalLahir")]
    pub birth_date: NaiveDate,
}

/// Authoritative identity fields returned by the registry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub full_name: Option<String>,
    pub birth_place: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub sex: Option<String>,
    pub religion: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Verified(VerifiedIdentity),
    Rejected { reason: String },
    Unreachable { reason: String },
    MalformedResponse { reason: String },
}

impl VerificationOutcome {
    /// Registry message, or the reason the call failed
    pub fn message(&self) -> &str {
        match self {
            VerificationOutcome::Verified(identity) => &identity.message,
            VerificationOutcome::Rejected { reason }
            | VerificationOutcome::Unreachable { reason }
            | VerificationOutcome::MalformedResponse { reason } => reason,
        }
    }

    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            VerificationOutcome::Verified(_) => "verified",
            VerificationOutcome::Rejected { .. } => "rejected",
            VerificationOutcome::Unreachable { .. } => "unreachable",
            VerificationOutcome::MalformedResponse { .. } => "malformed",
        }
    }
}

#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// Liveness probe, checked before every verification
    async fn is_healthy(&self) -> bool;

    async fn verify(&self, query: &VerificationQuery) -> VerificationOutcome;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_wire_format() {
        let query = VerificationQuery {
            national_id: "3175031234567890".to_string(),
            full_name: "John Doe".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
        };

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["nik"], "3175031234567890");
        assert_eq!(json["namaLengkap"], "John Doe");
        assert_eq!(json["tanggalLahir"], "1990-05-15");
    }

    #[test]
    fn test_message_per_outcome() {
        let rejected = VerificationOutcome::Rejected { reason: "NIK tidak ditemukan".to_string() };
        assert_eq!(rejected.message(), "NIK tidak ditemukan");
        assert_eq!(rejected.label(), "rejected");

        let verified = VerificationOutcome::Verified(VerifiedIdentity {
            message: "Data valid".to_string(),
            ..VerifiedIdentity::default()
        });
        assert_eq!(verified.message(), "Data valid");
        assert_eq!(verified.label(), "verified");
    }
}
