use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;

use super::{IdentityRegistry, VerificationOutcome, VerificationQuery, VerifiedIdentity};
use crate::config::RegistrySettings;
use crate::domain::customer::mask;
use crate::metrics::Metrics;
use crate::utils::{
    retry_on_transient, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, IsTransient,
    RetryConfig,
};

// ============================================================================
// HTTP adapter for the identity registry
// ============================================================================
//
// POST {base_url}{verify_path}  {"nik", "namaLengkap", "tanggalLahir"}
//   -> {"valid": bool, "message": str, "data": {namaLengkap, tempatLahir,
//       tanggalLahir, jenisKelamin, agama}}
// GET  {base_url}{health_path}  -> 2xx when up, optional {"status": "UP"}
//
// Timeouts and connection failures are retried with backoff. Anything the
// registry actually answered is never retried. The circuit breaker sits
// outside the retry loop: one exhausted retry sequence is one failure.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum RegistryCallError {
    #[error("identity registry timed out: {0}")]
    Timeout(String),

    #[error("cannot connect to identity registry: {0}")]
    Connect(String),

    #[error("identity registry returned server error {status}")]
    ServerError { status: u16 },

    #[error("identity registry request failed: {0}")]
    Transport(String),
}

impl IsTransient for RegistryCallError {
    fn is_transient(&self) -> bool {
        matches!(self, RegistryCallError::Timeout(_) | RegistryCallError::Connect(_))
    }
}

impl From<reqwest::Error> for RegistryCallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryCallError::Timeout(err.to_string())
        } else if err.is_connect() {
            RegistryCallError::Connect(err.to_string())
        } else {
            RegistryCallError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    valid: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<IdentityData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityData {
    nama_lengkap: Option<String>,
    tempat_lahir: Option<String>,
    tanggal_lahir: Option<String>,
    jenis_kelamin: Option<String>,
    agama: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: Option<String>,
}

/// Map what the registry answered to an outcome. Pure, so every status and
/// body shape can be tested without a server.
pub fn interpret_response(status: u16, body: &str) -> VerificationOutcome {
    match status {
        200..=299 => match serde_json::from_str::<VerifyResponse>(body) {
            Ok(response) if response.valid => {
                let data = response.data.unwrap_or_default();
                VerificationOutcome::Verified(VerifiedIdentity {
                    full_name: non_blank(data.nama_lengkap),
                    birth_place: non_blank(data.tempat_lahir),
                    birth_date: non_blank(data.tanggal_lahir).and_then(|raw| parse_registry_date(&raw)),
                    sex: non_blank(data.jenis_kelamin),
                    religion: non_blank(data.agama),
                    message: response.message.unwrap_or_else(|| "Identity verified".to_string()),
                })
            }
            Ok(response) => VerificationOutcome::Rejected {
                reason: response
                    .message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Identity data does not match the registry".to_string()),
            },
            Err(e) => VerificationOutcome::MalformedResponse {
                reason: format!("unreadable registry response: {e}"),
            },
        },
        400..=499 => {
            let detail = serde_json::from_str::<VerifyResponse>(body)
                .ok()
                .and_then(|r| r.message)
                .filter(|m| !m.trim().is_empty());
            VerificationOutcome::Rejected {
                reason: match detail {
                    Some(message) => message,
                    None => format!("Identity registry refused the request (status {status})"),
                },
            }
        }
        500..=599 => VerificationOutcome::Unreachable {
            reason: format!("Identity registry failed (status {status})"),
        },
        _ => VerificationOutcome::MalformedResponse {
            reason: format!("unexpected registry status {status}"),
        },
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_registry_date(raw: &str) -> Option<NaiveDate> {
    let parsed = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d-%m-%Y"))
        .ok();
    if parsed.is_none() {
        tracing::warn!(value = raw, "Ignoring unparseable birth date from identity registry");
    }
    parsed
}

pub struct HttpIdentityRegistry {
    client: reqwest::Client,
    verify_url: String,
    health_url: String,
    retry: RetryConfig,
    breaker: CircuitBreaker,
    metrics: Arc<Metrics>,
}

impl HttpIdentityRegistry {
    pub fn new(settings: &RegistrySettings, metrics: Arc<Metrics>) -> Result<Self, RegistryCallError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .connect_timeout(settings.timeout())
            .build()?;

        let base = settings.base_url.trim_end_matches('/');
        Ok(Self {
            client,
            verify_url: format!("{}{}", base, settings.verify_path),
            health_url: format!("{}{}", base, settings.health_path),
            retry: RetryConfig::with_retries(settings.max_retries),
            breaker: CircuitBreaker::new(CircuitBreakerConfig {
                failure_threshold: settings.failure_threshold,
                open_duration: settings.open_duration(),
                success_threshold: 1,
            }),
            metrics,
        })
    }

    async fn post_verification(&self, query: &VerificationQuery) -> Result<(u16, String), RegistryCallError> {
        let outcome = retry_on_transient(&self.retry, |attempt| async move {
            tracing::debug!(attempt, national_id = %mask(&query.national_id), "Calling identity registry");
            let response = self.client.post(&self.verify_url).json(query).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok::<_, RegistryCallError>((status, body))
        })
        .await
        .into_result()?;

        if outcome.0 >= 500 {
            return Err(RegistryCallError::ServerError { status: outcome.0 });
        }
        Ok(outcome)
    }

    async fn publish_breaker_state(&self) {
        self.metrics
            .update_circuit_breaker_state(self.breaker.get_state().await.as_gauge());
    }
}

#[async_trait]
impl IdentityRegistry for HttpIdentityRegistry {
    async fn is_healthy(&self) -> bool {
        if !self.breaker.is_call_permitted().await {
            tracing::debug!("Identity registry circuit open, reporting unhealthy");
            return false;
        }

        let response = match self.client.get(&self.health_url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Identity registry health probe failed");
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = response.status().as_u16(), "Identity registry reports unhealthy");
            return false;
        }

        // A bare 2xx counts as up; an explicit status field must not say down
        match response.json::<HealthResponse>().await {
            Ok(HealthResponse { status: Some(status) }) => !status.eq_ignore_ascii_case("down"),
            _ => true,
        }
    }

    async fn verify(&self, query: &VerificationQuery) -> VerificationOutcome {
        let started = Instant::now();

        let outcome = match self.breaker.call(self.post_verification(query), |_| true).await {
            Ok((status, body)) => interpret_response(status, &body),
            Err(CircuitBreakerError::CircuitOpen) => VerificationOutcome::Unreachable {
                reason: "Identity registry temporarily disabled after repeated failures".to_string(),
            },
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(error = %e, "Identity registry call failed");
                VerificationOutcome::Unreachable { reason: e.to_string() }
            }
        };

        self.publish_breaker_state().await;
        self.metrics
            .record_registry_call(outcome.label(), started.elapsed().as_secs_f64());

        tracing::info!(
            outcome = outcome.label(),
            message = outcome.message(),
            national_id = %mask(&query.national_id),
            duration_ms = started.elapsed().as_millis() as u64,
            "Identity verification finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::CircuitState;

    fn query() -> VerificationQuery {
        VerificationQuery {
            national_id: "3175031234567890".to_string(),
            full_name: "John Doe".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
        }
    }

    #[test]
    fn test_valid_response_carries_identity_fields() {
        let body = r#"{
            "valid": true,
            "message": "Data valid",
            "data": {
                "namaLengkap": "JOHN DOE",
                "tempatLahir": "JAKARTA",
                "tanggalLahir": "1990-05-15",
                "jenisKelamin": "LAKI-LAKI",
                "agama": "ISLAM"
            }
        }"#;

        match interpret_response(200, body) {
            VerificationOutcome::Verified(identity) => {
                assert_eq!(identity.full_name.as_deref(), Some("JOHN DOE"));
                assert_eq!(identity.birth_place.as_deref(), Some("JAKARTA"));
                assert_eq!(identity.birth_date, NaiveDate::from_ymd_opt(1990, 5, 15));
                assert_eq!(identity.sex.as_deref(), Some("LAKI-LAKI"));
                assert_eq!(identity.religion.as_deref(), Some("ISLAM"));
                assert_eq!(identity.message, "Data valid");
            }
            other => panic!("expected verified, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_without_data_has_no_fields() {
        match interpret_response(200, r#"{"valid": true, "data": {"agama": "  "}}"#) {
            VerificationOutcome::Verified(identity) => {
                assert_eq!(identity.full_name, None);
                assert_eq!(identity.religion, None);
            }
            other => panic!("expected verified, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_verdict_keeps_registry_message() {
        let outcome = interpret_response(200, r#"{"valid": false, "message": "NIK tidak ditemukan"}"#);
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected { reason: "NIK tidak ditemukan".to_string() }
        );
    }

    #[test]
    fn test_client_error_is_rejection() {
        let outcome = interpret_response(400, r#"{"valid": false, "message": "Format NIK salah"}"#);
        assert_eq!(outcome.message(), "Format NIK salah");

        let outcome = interpret_response(404, "");
        assert!(matches!(outcome, VerificationOutcome::Rejected { .. }));
        assert!(outcome.message().contains("404"));
    }

    #[test]
    fn test_server_error_is_unreachable() {
        assert!(matches!(
            interpret_response(503, "Service Unavailable"),
            VerificationOutcome::Unreachable { .. }
        ));
    }

    #[test]
    fn test_garbage_body_is_malformed() {
        assert!(matches!(
            interpret_response(200, "<html>oops</html>"),
            VerificationOutcome::MalformedResponse { .. }
        ));
    }

    #[test]
    fn test_only_network_failures_are_transient() {
        assert!(RegistryCallError::Timeout("t".into()).is_transient());
        assert!(RegistryCallError::Connect("c".into()).is_transient());
        assert!(!RegistryCallError::ServerError { status: 500 }.is_transient());
        assert!(!RegistryCallError::Transport("x".into()).is_transient());
    }

    #[tokio::test]
    async fn test_open_circuit_reports_unhealthy_without_calling() {
        let settings = RegistrySettings {
            // nothing listens on the discard port
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_ms: 500,
            max_retries: 0,
            failure_threshold: 1,
            open_secs: 60,
            ..RegistrySettings::default()
        };
        let metrics = Arc::new(Metrics::new().unwrap());
        let registry = HttpIdentityRegistry::new(&settings, metrics.clone()).unwrap();

        let first = registry.verify(&query()).await;
        assert!(matches!(first, VerificationOutcome::Unreachable { .. }));
        assert_eq!(registry.breaker.get_state().await, CircuitState::Open);
        assert_eq!(metrics.circuit_breaker_state.get(), 1);

        assert!(!registry.is_healthy().await);
        let second = registry.verify(&query()).await;
        assert_eq!(
            second.message(),
            "Identity registry temporarily disabled after repeated failures"
        );
    }
}
