use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use super::request::{RegistrationRequest, RegistrationSummary, ValidatedIdentifiers};
use crate::allocation::{AllocationError, UniqueCodeAllocator};
use crate::credentials::{PasswordError, PasswordHasher};
use crate::domain::customer::{mask, CardTier, Customer, CustomerError};
use crate::error::{Classified, ErrorClass};
use crate::identity::{IdentityRegistry, VerificationOutcome, VerificationQuery, VerifiedIdentity};
use crate::metrics::Metrics;
use crate::persistence::{CustomerStore, StoreError, UniqueField};

// ============================================================================
// Registration Orchestrator
// ============================================================================
//
// Each step is a hard precondition for the next:
//
//   1. identity registry liveness       -> RegistryUnavailable
//   2. identity verification            -> IdentityRejected / RegistryFailure
//   3. email not registered (any case)  -> DuplicateEmail
//   4. phone not registered             -> DuplicatePhone
//   5. national ID not registered       -> DuplicateNationalId
//   6. resolve card tier (unknown -> base tier)
//   7. allocate account code unless the request supplied one
//   8. allocate card number (always generated)
//   9. hash password, build customer preferring registry identity fields
//  10. insert customer + address + guardian in one write
//
// The remote call finishes before any write starts. The pre-checks are
// best-effort; a racing insert is rejected by the store and mapped to the
// same errors. A store rejection on a generated identifier re-allocates
// and retries the write, bounded by MAX_WRITE_ATTEMPTS.
//
// ============================================================================

pub const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error(transparent)]
    InvalidInput(#[from] CustomerError),

    #[error("Identity verification service is unavailable, please try again later")]
    RegistryUnavailable,

    #[error("Identity verification failed: {reason}")]
    IdentityRejected { reason: String },

    /// `reason` is transport detail for the logs, never shown to the caller
    #[error("Identity verification could not be completed, please try again later")]
    RegistryFailure { reason: String },

    #[error("Email {0} is already registered")]
    DuplicateEmail(String),

    #[error("Phone number {0} is already registered")]
    DuplicatePhone(String),

    #[error("National ID {0} is already registered")]
    DuplicateNationalId(String),

    #[error("Account code {0} is already in use")]
    DuplicateAccountCode(i64),

    #[error("Could not allocate unique identifiers after {0} write attempts")]
    IdentifiersExhausted(u32),

    #[error("Identifier allocation failed: {0}")]
    Allocation(#[from] AllocationError),

    #[error("Password hashing failed: {0}")]
    Password(#[from] PasswordError),

    #[error("Storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl RegistrationError {
    /// Metric label
    pub fn outcome(&self) -> &'static str {
        match self {
            RegistrationError::InvalidInput(_) => "invalid_input",
            RegistrationError::RegistryUnavailable => "registry_unavailable",
            RegistrationError::IdentityRejected { .. } => "identity_rejected",
            RegistrationError::RegistryFailure { .. } => "registry_failure",
            RegistrationError::DuplicateEmail(_) => "duplicate_email",
            RegistrationError::DuplicatePhone(_) => "duplicate_phone",
            RegistrationError::DuplicateNationalId(_) => "duplicate_national_id",
            RegistrationError::DuplicateAccountCode(_) => "duplicate_account_code",
            RegistrationError::IdentifiersExhausted(_) => "identifiers_exhausted",
            RegistrationError::Allocation(_)
            | RegistrationError::Password(_)
            | RegistrationError::Storage(_) => "system_error",
        }
    }
}

impl Classified for RegistrationError {
    fn class(&self) -> ErrorClass {
        match self {
            RegistrationError::InvalidInput(_) | RegistrationError::IdentityRejected { .. } => {
                ErrorClass::Validation
            }
            RegistrationError::DuplicateEmail(_)
            | RegistrationError::DuplicatePhone(_)
            | RegistrationError::DuplicateNationalId(_)
            | RegistrationError::DuplicateAccountCode(_) => ErrorClass::Conflict,
            RegistrationError::RegistryUnavailable | RegistrationError::RegistryFailure { .. } => {
                ErrorClass::Dependency
            }
            RegistrationError::IdentifiersExhausted(_)
            | RegistrationError::Allocation(_)
            | RegistrationError::Password(_)
            | RegistrationError::Storage(_) => ErrorClass::System,
        }
    }
}

/// What to do when the store rejects an insert on `field`
#[derive(Debug)]
enum ViolationAction {
    Reallocate,
    Fail(RegistrationError),
}

fn on_unique_violation(
    field: UniqueField,
    customer: &Customer,
    account_code_supplied: bool,
) -> ViolationAction {
    match field {
        UniqueField::Email => ViolationAction::Fail(RegistrationError::DuplicateEmail(customer.email.clone())),
        UniqueField::Phone => ViolationAction::Fail(RegistrationError::DuplicatePhone(customer.phone.clone())),
        UniqueField::NationalId => {
            ViolationAction::Fail(RegistrationError::DuplicateNationalId(customer.national_id.clone()))
        }
        UniqueField::AccountCode if account_code_supplied => {
            ViolationAction::Fail(RegistrationError::DuplicateAccountCode(customer.account_code))
        }
        UniqueField::AccountCode | UniqueField::CardNumber => ViolationAction::Reallocate,
    }
}

pub struct RegistrationOrchestrator {
    store: Arc<dyn CustomerStore>,
    registry: Arc<dyn IdentityRegistry>,
    allocator: UniqueCodeAllocator,
    hasher: PasswordHasher,
    default_tier: CardTier,
    metrics: Arc<Metrics>,
}

impl RegistrationOrchestrator {
    pub fn new(
        store: Arc<dyn CustomerStore>,
        registry: Arc<dyn IdentityRegistry>,
        hasher: PasswordHasher,
        default_tier: CardTier,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            registry,
            allocator: UniqueCodeAllocator::new(metrics.clone()),
            hasher,
            default_tier,
            metrics,
        }
    }

    pub async fn register(&self, request: RegistrationRequest) -> Result<RegistrationSummary, RegistrationError> {
        let started = Instant::now();
        let result = self.run(request).await;

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(_) => self.metrics.record_registration("success", elapsed),
            Err(e) => {
                self.metrics.record_registration(e.outcome(), elapsed);
                match e.class() {
                    ErrorClass::System => tracing::error!(error = %e, "Registration failed"),
                    _ => tracing::info!(outcome = e.outcome(), "Registration refused"),
                }
            }
        }
        result
    }

    async fn run(&self, request: RegistrationRequest) -> Result<RegistrationSummary, RegistrationError> {
        let ids = request.validate(Utc::now().date_naive())?;
        tracing::debug!(national_id = %mask(ids.national_id.as_str()), "Registration started");

        if !self.registry.is_healthy().await {
            return Err(RegistrationError::RegistryUnavailable);
        }

        let identity = self.verify_identity(&request, &ids).await?;

        self.check_not_registered(&ids).await?;

        let tier = match request.card_tier.as_deref() {
            Some(name) => CardTier::from_name(name).unwrap_or_else(|| {
                tracing::debug!(requested = name, "Unknown card tier, using base tier");
                CardTier::BASE
            }),
            None => self.default_tier,
        };

        if let Some(code) = request.account_code {
            if self.store.account_code_exists(code).await? {
                return Err(RegistrationError::DuplicateAccountCode(code));
            }
        }

        let password_hash = self.hasher.hash(request.password.clone()).await?;
        let mut customer = build_customer(&request, &ids, &identity, tier, password_hash);

        self.insert_with_fresh_identifiers(&mut customer, request.account_code).await?;

        tracing::info!(
            customer_id = %customer.id,
            national_id = %mask(&customer.national_id),
            card_number = %mask(&customer.card_number),
            tier = %tier,
            "Customer registered"
        );

        Ok(RegistrationSummary {
            card_tier: tier.name().to_string(),
            full_name: customer.full_name.clone(),
            account_code: customer.account_code.to_string(),
            account_type: customer.account_type.clone(),
            card_number: customer.card_number.clone(),
        })
    }

    async fn verify_identity(
        &self,
        request: &RegistrationRequest,
        ids: &ValidatedIdentifiers,
    ) -> Result<VerifiedIdentity, RegistrationError> {
        let query = VerificationQuery {
            national_id: ids.national_id.as_str().to_string(),
            full_name: request.full_name.trim().to_string(),
            birth_date: request.birth_date,
        };

        match self.registry.verify(&query).await {
            VerificationOutcome::Verified(identity) => Ok(identity),
            VerificationOutcome::Rejected { reason } => Err(RegistrationError::IdentityRejected { reason }),
            VerificationOutcome::Unreachable { reason }
            | VerificationOutcome::MalformedResponse { reason } => {
                tracing::warn!(
                    national_id = %mask(&query.national_id),
                    reason = %reason,
                    "Identity verification could not be completed"
                );
                Err(RegistrationError::RegistryFailure { reason })
            }
        }
    }

    async fn check_not_registered(&self, ids: &ValidatedIdentifiers) -> Result<(), RegistrationError> {
        if self.store.email_exists(ids.email.as_str()).await? {
            return Err(RegistrationError::DuplicateEmail(ids.email.to_string()));
        }
        if self.store.phone_exists(ids.phone.as_str()).await? {
            return Err(RegistrationError::DuplicatePhone(ids.phone.to_string()));
        }
        if self.store.national_id_exists(ids.national_id.as_str()).await? {
            return Err(RegistrationError::DuplicateNationalId(ids.national_id.to_string()));
        }
        Ok(())
    }

    async fn insert_with_fresh_identifiers(
        &self,
        customer: &mut Customer,
        supplied_account_code: Option<i64>,
    ) -> Result<(), RegistrationError> {
        let lookup = self.store.as_ref();

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            customer.account_code = match supplied_account_code {
                Some(code) => code,
                None => self.allocator.allocate_account_code(lookup, customer.card_tier).await?,
            };
            customer.card_number = self.allocator.allocate_card_number(lookup, customer.card_tier).await?;

            match self.store.insert_customer(customer).await {
                Ok(()) => return Ok(()),
                Err(StoreError::UniqueViolation(field)) => {
                    match on_unique_violation(field, customer, supplied_account_code.is_some()) {
                        ViolationAction::Fail(e) => return Err(e),
                        ViolationAction::Reallocate => {
                            tracing::warn!(
                                attempt,
                                field = %field,
                                "Generated identifier rejected by store, allocating again"
                            );
                            self.metrics.record_collision(&field.to_string());
                        }
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(RegistrationError::IdentifiersExhausted(MAX_WRITE_ATTEMPTS))
    }
}

fn build_customer(
    request: &RegistrationRequest,
    ids: &ValidatedIdentifiers,
    identity: &VerifiedIdentity,
    tier: CardTier,
    password_hash: String,
) -> Customer {
    let prefer = |registry: &Option<String>, submitted: &str| {
        registry.clone().unwrap_or_else(|| submitted.trim().to_string())
    };
    let now = Utc::now();

    Customer {
        id: Uuid::new_v4(),
        full_name: prefer(&identity.full_name, &request.full_name),
        national_id: ids.national_id.as_str().to_string(),
        mother_maiden_name: request.mother_maiden_name.trim().to_string(),
        birth_place: prefer(&identity.birth_place, &request.birth_place),
        birth_date: identity.birth_date.unwrap_or(request.birth_date),
        sex: prefer(&identity.sex, &request.sex),
        religion: prefer(&identity.religion, &request.religion),
        phone: ids.phone.as_str().to_string(),
        email: ids.email.as_str().to_string(),
        password_hash,
        account_code: 0,
        card_tier: tier,
        card_number: String::new(),
        account_type: request.account_type.trim().to_string(),
        failed_login_attempts: 0,
        locked_until: None,
        email_verified: false,
        created_at: now,
        updated_at: now,
        address: request.address.clone(),
        guardian: request.complete_guardian(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::fast_password_settings;
    use crate::domain::customer::{Address, Guardian};
    use crate::identity::testing::ScriptedRegistry;
    use crate::domain::customer::{CustomerCounts, LockoutState};
    use crate::persistence::{FailedLoginUpdate, InMemoryCustomerStore};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn orchestrator(
        store: Arc<InMemoryCustomerStore>,
        registry: Arc<ScriptedRegistry>,
    ) -> RegistrationOrchestrator {
        RegistrationOrchestrator::new(
            store,
            registry,
            PasswordHasher::new(&fast_password_settings()).unwrap(),
            CardTier::BASE,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    fn request() -> RegistrationRequest {
        RegistrationRequest {
            full_name: "John Doe".to_string(),
            national_id: "3175031234567890".to_string(),
            mother_maiden_name: "Jane Roe".to_string(),
            birth_place: "Jakarta".to_string(),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 15).unwrap(),
            sex: "M".to_string(),
            religion: "Islam".to_string(),
            phone: "081234567890".to_string(),
            email: "john@example.com".to_string(),
            password: "s3cret-pass".to_string(),
            account_type: "Tabungan Reguler".to_string(),
            card_tier: Some("Gold".to_string()),
            account_code: None,
            address: Address {
                street: "Jl. Sudirman 1".to_string(),
                city: "Jakarta".to_string(),
                ..Address::default()
            },
            guardian: None,
        }
    }

    fn other_applicant() -> RegistrationRequest {
        RegistrationRequest {
            national_id: "3175039999999999".to_string(),
            phone: "089999999999".to_string(),
            email: "other@example.com".to_string(),
            ..request()
        }
    }

    fn registry_with_fields() -> ScriptedRegistry {
        ScriptedRegistry::verified(VerifiedIdentity {
            full_name: Some("JOHN DOE".to_string()),
            birth_place: Some("JAKARTA".to_string()),
            birth_date: NaiveDate::from_ymd_opt(1990, 5, 15),
            sex: Some("LAKI-LAKI".to_string()),
            religion: Some("ISLAM".to_string()),
            message: "Data valid".to_string(),
        })
    }

    fn card_number_is_well_formed(card: &str, prefix: &str) -> bool {
        let groups: Vec<&str> = card.split(' ').collect();
        groups.len() == 4
            && groups[0] == prefix
            && groups.iter().all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_digit()))
    }

    #[tokio::test]
    async fn test_gold_registration_summary() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let registry = Arc::new(ScriptedRegistry::verified_without_fields());
        let summary = orchestrator(store.clone(), registry.clone()).register(request()).await.unwrap();

        assert_eq!(summary.card_tier, "Gold");
        assert_eq!(summary.full_name, "John Doe");
        assert_eq!(summary.account_type, "Tabungan Reguler");
        assert!(card_number_is_well_formed(&summary.card_number, "4102"));
        assert_eq!(summary.account_code.len(), 10);
        assert!(summary.account_code.starts_with("20"));
        assert!(summary.account_code.parse::<i64>().unwrap() > 0);

        assert_eq!(registry.calls(), 1);
        assert_eq!(store.counts().await.unwrap().total, 1);

        let stored = store.find_by_national_id("3175031234567890").await.unwrap().unwrap();
        assert_eq!(stored.account_code.to_string(), summary.account_code);
        assert_eq!(stored.card_number, summary.card_number);
        assert_eq!(stored.address.street, "Jl. Sudirman 1");
        assert!(stored.password_hash.starts_with("$argon2id$"));
        assert!(!stored.email_verified);
    }

    #[tokio::test]
    async fn test_registry_fields_preferred_over_form() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let summary = orchestrator(store.clone(), Arc::new(registry_with_fields()))
            .register(request())
            .await
            .unwrap();

        assert_eq!(summary.full_name, "JOHN DOE");
        let stored = store.find_by_email("john@example.com").await.unwrap().unwrap();
        assert_eq!(stored.birth_place, "JAKARTA");
        assert_eq!(stored.sex, "LAKI-LAKI");
        assert_eq!(stored.religion, "ISLAM");
        assert_eq!(stored.mother_maiden_name, "Jane Roe");
    }

    #[tokio::test]
    async fn test_rejected_identity_persists_nothing() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let registry = Arc::new(ScriptedRegistry::answering(VerificationOutcome::Rejected {
            reason: "NIK tidak ditemukan".to_string(),
        }));

        let err = orchestrator(store.clone(), registry).register(request()).await.unwrap_err();

        assert!(matches!(err, RegistrationError::IdentityRejected { .. }));
        assert!(err.to_string().contains("NIK tidak ditemukan"));
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(store.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unhealthy_registry_fails_fast() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let registry = Arc::new(ScriptedRegistry::down());

        let err = orchestrator(store.clone(), registry.clone()).register(request()).await.unwrap_err();

        assert!(matches!(err, RegistrationError::RegistryUnavailable));
        assert_eq!(err.class(), ErrorClass::Dependency);
        assert_eq!(registry.calls(), 0);
        assert_eq!(store.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_unreachable_registry_is_dependency_error() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let registry = Arc::new(ScriptedRegistry::answering(VerificationOutcome::Unreachable {
            reason: "timed out".to_string(),
        }));

        let err = orchestrator(store.clone(), registry).register(request()).await.unwrap_err();
        assert!(matches!(err, RegistrationError::RegistryFailure { .. }));
        assert_eq!(err.class(), ErrorClass::Dependency);
        assert_eq!(store.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_registry_transport_detail_stays_out_of_public_message() {
        let registry = Arc::new(ScriptedRegistry::answering(VerificationOutcome::Unreachable {
            reason: "cannot connect to identity registry: error sending request for url \
                     (http://10.0.3.7:8443/api/v1/identity/verify)"
                .to_string(),
        }));

        let err = orchestrator(Arc::new(InMemoryCustomerStore::new()), registry)
            .register(request())
            .await
            .unwrap_err();

        let public = err.public_message();
        assert_eq!(public, "Identity verification could not be completed, please try again later");
        assert!(!public.contains("http://"));
        assert!(!public.contains("10.0.3.7"));
        assert!(matches!(err, RegistrationError::RegistryFailure { ref reason } if reason.contains("10.0.3.7")));
    }

    #[tokio::test]
    async fn test_invalid_input_skips_registry() {
        let registry = Arc::new(ScriptedRegistry::verified_without_fields());
        let bad = RegistrationRequest {
            national_id: "12345".to_string(),
            ..request()
        };

        let err = orchestrator(Arc::new(InMemoryCustomerStore::new()), registry.clone())
            .register(bad)
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidInput(CustomerError::InvalidNationalId)));
        assert_eq!(registry.calls(), 0);
    }

    #[tokio::test]
    async fn test_negative_account_code_is_refused() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let registry = Arc::new(ScriptedRegistry::verified_without_fields());

        let err = orchestrator(store.clone(), registry.clone())
            .register(RegistrationRequest {
                account_code: Some(-42),
                ..request()
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RegistrationError::InvalidInput(CustomerError::InvalidAccountCode(-42))));
        assert_eq!(err.class(), ErrorClass::Validation);
        assert_eq!(registry.calls(), 0);
        assert_eq!(store.counts().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedRegistry::verified_without_fields()));
        orchestrator.register(request()).await.unwrap();

        let second = RegistrationRequest {
            email: "JOHN@Example.COM".to_string(),
            ..other_applicant()
        };
        let err = orchestrator.register(second).await.unwrap_err();

        assert!(matches!(err, RegistrationError::DuplicateEmail(ref email) if email == "john@example.com"));
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_duplicate_phone_and_national_id() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedRegistry::verified_without_fields()));
        orchestrator.register(request()).await.unwrap();

        let same_phone = RegistrationRequest {
            phone: "0812-3456-7890".to_string(),
            ..other_applicant()
        };
        assert!(matches!(
            orchestrator.register(same_phone).await,
            Err(RegistrationError::DuplicatePhone(_))
        ));

        let same_national_id = RegistrationRequest {
            national_id: "3175031234567890".to_string(),
            ..other_applicant()
        };
        assert!(matches!(
            orchestrator.register(same_national_id).await,
            Err(RegistrationError::DuplicateNationalId(_))
        ));
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_concurrent_same_national_id_only_one_wins() {
        // Pre-checks see nothing, so only the store constraint can stop the second writer
        let store = Arc::new(InMemoryCustomerStore::new().with_stale_prechecks());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedRegistry::verified_without_fields()));

        let racer = RegistrationRequest {
            national_id: "3175031234567890".to_string(),
            ..other_applicant()
        };
        let (first, second) = tokio::join!(orchestrator.register(request()), orchestrator.register(racer));

        let results = [first, second];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RegistrationError::DuplicateNationalId(_)))));
        assert_eq!(store.counts().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_partial_guardian_is_not_stored() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedRegistry::verified_without_fields()));

        let partial = RegistrationRequest {
            guardian: Some(Guardian {
                full_name: "Siti Aminah".to_string(),
                relationship: "Mother".to_string(),
                phone: "081200000000".to_string(),
                address: " ".to_string(),
                occupation: "Nurse".to_string(),
            }),
            ..request()
        };
        orchestrator.register(partial).await.unwrap();
        let stored = store.find_by_national_id("3175031234567890").await.unwrap().unwrap();
        assert_eq!(stored.guardian, None);

        let complete_guardian = Guardian {
            full_name: "Siti Aminah".to_string(),
            relationship: "Mother".to_string(),
            phone: "081200000000".to_string(),
            address: "Jl. Melati 5".to_string(),
            occupation: "Nurse".to_string(),
        };
        let complete = RegistrationRequest {
            guardian: Some(complete_guardian.clone()),
            ..other_applicant()
        };
        orchestrator.register(complete).await.unwrap();
        let stored = store.find_by_national_id("3175039999999999").await.unwrap().unwrap();
        assert_eq!(stored.guardian, Some(complete_guardian));
    }

    #[tokio::test]
    async fn test_unknown_tier_uses_base_tier() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let summary = orchestrator(store, Arc::new(ScriptedRegistry::verified_without_fields()))
            .register(RegistrationRequest {
                card_tier: Some("Diamond".to_string()),
                ..request()
            })
            .await
            .unwrap();

        assert_eq!(summary.card_tier, "Silver");
        assert!(summary.card_number.starts_with("4101 "));
        assert!(summary.account_code.starts_with("10"));
    }

    #[tokio::test]
    async fn test_supplied_account_code_kept_or_rejected() {
        let store = Arc::new(InMemoryCustomerStore::new());
        let orchestrator = orchestrator(store.clone(), Arc::new(ScriptedRegistry::verified_without_fields()));

        let summary = orchestrator
            .register(RegistrationRequest {
                account_code: Some(2026105555),
                ..request()
            })
            .await
            .unwrap();
        assert_eq!(summary.account_code, "2026105555");

        let err = orchestrator
            .register(RegistrationRequest {
                account_code: Some(2026105555),
                ..other_applicant()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateAccountCode(2026105555)));
    }

    /// Rejects the first `clashes` inserts as card-number duplicates
    struct CardNumberClashStore {
        inner: InMemoryCustomerStore,
        clashes: AtomicU32,
        rejected_cards: Mutex<Vec<String>>,
    }

    impl CardNumberClashStore {
        fn new(clashes: u32) -> Self {
            Self {
                inner: InMemoryCustomerStore::new(),
                clashes: AtomicU32::new(clashes),
                rejected_cards: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CustomerStore for CardNumberClashStore {
        async fn insert_customer(&self, customer: &Customer) -> Result<(), StoreError> {
            let remaining = self.clashes.load(Ordering::SeqCst);
            if remaining > 0 {
                self.clashes.store(remaining - 1, Ordering::SeqCst);
                self.rejected_cards.lock().unwrap().push(customer.card_number.clone());
                return Err(StoreError::UniqueViolation(UniqueField::CardNumber));
            }
            self.inner.insert_customer(customer).await
        }

        async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
            self.inner.email_exists(email).await
        }

        async fn phone_exists(&self, phone: &str) -> Result<bool, StoreError> {
            self.inner.phone_exists(phone).await
        }

        async fn national_id_exists(&self, national_id: &str) -> Result<bool, StoreError> {
            self.inner.national_id_exists(national_id).await
        }

        async fn account_code_exists(&self, account_code: i64) -> Result<bool, StoreError> {
            self.inner.account_code_exists(account_code).await
        }

        async fn card_number_exists(&self, card_number: &str) -> Result<bool, StoreError> {
            self.inner.card_number_exists(card_number).await
        }

        async fn find_by_email(&self, email: &str) -> Result<Option<Customer>, StoreError> {
            self.inner.find_by_email(email).await
        }

        async fn find_by_national_id(&self, national_id: &str) -> Result<Option<Customer>, StoreError> {
            self.inner.find_by_national_id(national_id).await
        }

        async fn find_by_account_code(&self, account_code: i64) -> Result<Option<Customer>, StoreError> {
            self.inner.find_by_account_code(account_code).await
        }

        async fn record_failed_login(
            &self,
            customer_id: Uuid,
            update: FailedLoginUpdate,
        ) -> Result<LockoutState, StoreError> {
            self.inner.record_failed_login(customer_id, update).await
        }

        async fn reset_failed_logins(&self, customer_id: Uuid) -> Result<(), StoreError> {
            self.inner.reset_failed_logins(customer_id).await
        }

        async fn mark_email_verified(&self, email: &str) -> Result<bool, StoreError> {
            self.inner.mark_email_verified(email).await
        }

        async fn counts(&self) -> Result<CustomerCounts, StoreError> {
            self.inner.counts().await
        }

        async fn ping(&self) -> Result<(), StoreError> {
            self.inner.ping().await
        }
    }

    fn orchestrator_over(store: Arc<CardNumberClashStore>) -> RegistrationOrchestrator {
        RegistrationOrchestrator::new(
            store,
            Arc::new(ScriptedRegistry::verified_without_fields()),
            PasswordHasher::new(&fast_password_settings()).unwrap(),
            CardTier::BASE,
            Arc::new(Metrics::new().unwrap()),
        )
    }

    #[tokio::test]
    async fn test_card_number_clash_at_write_allocates_again() {
        let store = Arc::new(CardNumberClashStore::new(1));
        let summary = orchestrator_over(store.clone()).register(request()).await.unwrap();

        assert!(card_number_is_well_formed(&summary.card_number, "4102"));
        assert_eq!(store.counts().await.unwrap().total, 1);

        let stored = store.find_by_email("john@example.com").await.unwrap().unwrap();
        assert_eq!(stored.card_number, summary.card_number);
        assert_eq!(store.rejected_cards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_clashes_at_write_exhaust_attempts() {
        let store = Arc::new(CardNumberClashStore::new(MAX_WRITE_ATTEMPTS + 1));
        let err = orchestrator_over(store.clone()).register(request()).await.unwrap_err();

        assert!(matches!(err, RegistrationError::IdentifiersExhausted(3)));
        assert_eq!(err.class(), ErrorClass::System);
        assert_eq!(store.counts().await.unwrap().total, 0);
        assert_eq!(store.rejected_cards.lock().unwrap().len(), MAX_WRITE_ATTEMPTS as usize);
    }

    #[test]
    fn test_violation_on_generated_identifier_reallocates() {
        let customer = crate::persistence::fixtures::customer("a@b.co", "3175031234567890", "0811111111");

        assert!(matches!(
            on_unique_violation(UniqueField::CardNumber, &customer, false),
            ViolationAction::Reallocate
        ));
        assert!(matches!(
            on_unique_violation(UniqueField::AccountCode, &customer, false),
            ViolationAction::Reallocate
        ));
        assert!(matches!(
            on_unique_violation(UniqueField::AccountCode, &customer, true),
            ViolationAction::Fail(RegistrationError::DuplicateAccountCode(2026101234))
        ));
        assert!(matches!(
            on_unique_violation(UniqueField::Email, &customer, false),
            ViolationAction::Fail(RegistrationError::DuplicateEmail(ref email)) if email == "a@b.co"
        ));
    }

    #[test]
    fn test_system_errors_hide_detail() {
        let err = RegistrationError::IdentifiersExhausted(MAX_WRITE_ATTEMPTS);
        assert_eq!(err.class(), ErrorClass::System);
        assert!(!err.public_message().contains("write attempts"));
    }
}
