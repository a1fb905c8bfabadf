use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::auth::{AuthenticationService, EmailVerificationService, LockoutPolicy, LoginAttemptGuard};
use crate::config::AppConfig;
use crate::credentials::{CredentialIssuer, PasswordError, PasswordHasher};
use crate::health::HealthChecker;
use crate::identity::IdentityRegistry;
use crate::metrics::Metrics;
use crate::persistence::CustomerStore;
use crate::registration::RegistrationOrchestrator;

// ============================================================================
// HTTP Transport
// ============================================================================
//
// POST /api/v1/registrations                     register a customer
// POST /api/v1/auth/login                        password login
// GET  /api/v1/customers/me                      profile for the token
// POST /api/v1/auth/email-verification           issue verification token
// POST /api/v1/auth/email-verification/confirm   redeem verification token
// GET  /api/v1/reports/customers                 customer counts
// GET  /health, GET /metrics                     ops
//
// ============================================================================

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::{access_token, ACCESS_TOKEN_COOKIE};

pub struct AppState {
    pub registration: RegistrationOrchestrator,
    pub auth: AuthenticationService,
    pub email_verification: EmailVerificationService,
    pub store: Arc<dyn CustomerStore>,
    pub health: HealthChecker,
    pub metrics: Arc<Metrics>,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn build(
        config: &AppConfig,
        store: Arc<dyn CustomerStore>,
        registry: Arc<dyn IdentityRegistry>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, PasswordError> {
        let hasher = PasswordHasher::new(&config.password)?;
        let issuer = Arc::new(CredentialIssuer::new(&config.credentials));
        if !issuer.has_usable_key() {
            tracing::warn!(
                "Signing key is missing or shorter than 256 bits; logins will fail until one is configured"
            );
        }

        let guard = LoginAttemptGuard::new(
            store.clone(),
            LockoutPolicy::from(&config.lockout),
            metrics.clone(),
        );

        Ok(Self {
            registration: RegistrationOrchestrator::new(
                store.clone(),
                registry.clone(),
                hasher.clone(),
                config.registration.default_tier(),
                metrics.clone(),
            ),
            auth: AuthenticationService::new(store.clone(), guard, hasher, issuer.clone(), metrics.clone()),
            email_verification: EmailVerificationService::new(store.clone(), issuer, metrics.clone()),
            health: HealthChecker::new(store.clone(), registry),
            store,
            metrics,
            secure_cookies: false,
        })
    }

    /// Mark the access-token cookie `Secure` (TLS terminated in front of us)
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let message = format!("Invalid request body: {err}");
        ApiError::bad_request(message).into()
    }))
    .service(
        web::scope("/api/v1")
            .route("/registrations", web::post().to(handlers::register))
            .route("/auth/login", web::post().to(handlers::login))
            .route(
                "/auth/email-verification",
                web::post().to(handlers::request_email_verification),
            )
            .route(
                "/auth/email-verification/confirm",
                web::post().to(handlers::confirm_email_verification),
            )
            .route("/customers/me", web::get().to(handlers::me))
            .route("/reports/customers", web::get().to(handlers::customer_report)),
    )
    .route("/health", web::get().to(handlers::health))
    .route("/metrics", web::get().to(handlers::metrics))
    .default_service(web::to(|| async {
        HttpResponse::NotFound().json(serde_json::json!({
            "error": "not_found",
            "message": "No such endpoint"
        }))
    }));
}
