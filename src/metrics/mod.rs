use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

// ============================================================================
// Metrics - Prometheus metrics for the onboarding service
// ============================================================================
//
// - Registration outcomes and latency
// - Identity registry calls
// - Identifier allocation collisions and fallbacks
// - Login attempts, lockouts and issued tokens
// - Circuit breaker state in front of the identity registry
//
// Exposed in text format on GET /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,

    // Registration
    pub registrations_total: IntCounterVec,
    pub registration_duration: Histogram,

    // Identity registry
    pub registry_calls_total: IntCounterVec,
    pub registry_call_duration: Histogram,

    // Identifier allocation
    pub identifier_collisions_total: IntCounterVec,
    pub identifier_fallbacks_total: IntCounterVec,

    // Authentication
    pub login_attempts_total: IntCounterVec,
    pub account_lockouts_total: IntCounter,
    pub tokens_issued_total: IntCounterVec,

    pub circuit_breaker_state: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let registrations_total = IntCounterVec::new(
            Opts::new("registrations_total", "Registration attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(registrations_total.clone()))?;

        let registration_duration = Histogram::with_opts(
            HistogramOpts::new("registration_duration_seconds", "End-to-end registration duration")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        )?;
        registry.register(Box::new(registration_duration.clone()))?;

        let registry_calls_total = IntCounterVec::new(
            Opts::new("identity_registry_calls_total", "Identity registry verifications by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(registry_calls_total.clone()))?;

        let registry_call_duration = Histogram::with_opts(
            HistogramOpts::new("identity_registry_duration_seconds", "Identity registry verification latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )?;
        registry.register(Box::new(registry_call_duration.clone()))?;

        let identifier_collisions_total = IntCounterVec::new(
            Opts::new("identifier_collisions_total", "Generated identifiers that were already taken"),
            &["identifier"],
        )?;
        registry.register(Box::new(identifier_collisions_total.clone()))?;

        let identifier_fallbacks_total = IntCounterVec::new(
            Opts::new("identifier_fallbacks_total", "Allocations that exhausted the retry bound"),
            &["identifier"],
        )?;
        registry.register(Box::new(identifier_fallbacks_total.clone()))?;

        let login_attempts_total = IntCounterVec::new(
            Opts::new("login_attempts_total", "Login attempts by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(login_attempts_total.clone()))?;

        let account_lockouts_total = IntCounter::new(
            "account_lockouts_total",
            "Accounts locked after repeated failed logins",
        )?;
        registry.register(Box::new(account_lockouts_total.clone()))?;

        let tokens_issued_total = IntCounterVec::new(
            Opts::new("tokens_issued_total", "Bearer tokens issued by purpose"),
            &["purpose"],
        )?;
        registry.register(Box::new(tokens_issued_total.clone()))?;

        let circuit_breaker_state = IntGauge::new(
            "circuit_breaker_state",
            "Identity registry circuit breaker state (0=Closed, 1=Open, 2=HalfOpen)",
        )?;
        registry.register(Box::new(circuit_breaker_state.clone()))?;

        Ok(Self {
            registry,
            registrations_total,
            registration_duration,
            registry_calls_total,
            registry_call_duration,
            identifier_collisions_total,
            identifier_fallbacks_total,
            login_attempts_total,
            account_lockouts_total,
            tokens_issued_total,
            circuit_breaker_state,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_registration(&self, outcome: &str, duration_secs: f64) {
        self.registrations_total.with_label_values(&[outcome]).inc();
        self.registration_duration.observe(duration_secs);
    }

    pub fn record_registry_call(&self, outcome: &str, duration_secs: f64) {
        self.registry_calls_total.with_label_values(&[outcome]).inc();
        self.registry_call_duration.observe(duration_secs);
    }

    pub fn record_collision(&self, identifier: &str) {
        self.identifier_collisions_total.with_label_values(&[identifier]).inc();
    }

    pub fn record_fallback(&self, identifier: &str) {
        self.identifier_fallbacks_total.with_label_values(&[identifier]).inc();
    }

    pub fn record_login(&self, outcome: &str) {
        self.login_attempts_total.with_label_values(&[outcome]).inc();
    }

    pub fn record_lockout(&self) {
        self.account_lockouts_total.inc();
    }

    pub fn record_token_issued(&self, purpose: &str) {
        self.tokens_issued_total.with_label_values(&[purpose]).inc();
    }

    pub fn update_circuit_breaker_state(&self, state: i64) {
        self.circuit_breaker_state.set(state);
    }

    /// Render every registered metric in the Prometheus text format
    pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        assert!(!metrics.registry().gather().is_empty());
    }

    #[test]
    fn test_record_registration() {
        let metrics = Metrics::new().unwrap();
        metrics.record_registration("success", 0.2);
        metrics.record_registration("duplicate_email", 0.01);

        let gathered = metrics.registry().gather();
        let total = gathered.iter().find(|m| m.name() == "registrations_total").unwrap();
        assert_eq!(total.metric.len(), 2);
    }

    #[test]
    fn test_record_lockout() {
        let metrics = Metrics::new().unwrap();
        metrics.record_lockout();
        metrics.record_lockout();

        let gathered = metrics.registry().gather();
        let lockouts = gathered.iter().find(|m| m.name() == "account_lockouts_total").unwrap();
        assert_eq!(lockouts.metric[0].counter.value, Some(2.0));
    }

    #[test]
    fn test_render_text_format() {
        let metrics = Metrics::new().unwrap();
        metrics.record_collision("card_number");

        let text = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(text.contains("identifier_collisions_total{identifier=\"card_number\"} 1"));
    }
}
