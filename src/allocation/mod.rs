use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use std::sync::Arc;

use crate::domain::customer::CardTier;
use crate::metrics::Metrics;
use crate::persistence::{CustomerStore, StoreError};

// ============================================================================
// Unique Code Allocator
// ============================================================================
//
// Account code:  tier prefix (2) | yyMM (4) | random (4)  -> 10-digit integer
//   fallback:    tier prefix * 1_000_000 + random 6 digits, not re-checked
// Card number:   tier card prefix (4) | random (12), shown as 4 groups of 4
//   fallback:    last generated value, not re-checked
//
// Both loops are bounded by MAX_ALLOCATION_ATTEMPTS. The storage unique
// index still rejects a duplicate that slips through a fallback.
// All randomness comes from the operating system CSPRNG.
//
// ============================================================================

pub const MAX_ALLOCATION_ATTEMPTS: u32 = 5;

const ACCOUNT_CODE_DIGITS: usize = 10;
const CARD_NUMBER_DIGITS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Generated {identifier} has unexpected shape: {value}")]
    Malformed { identifier: &'static str, value: String },

    #[error("Uniqueness check failed: {0}")]
    Lookup(#[from] StoreError),
}

/// Uniqueness check for generated identifiers
#[async_trait]
pub trait IdentifierLookup: Send + Sync {
    async fn account_code_taken(&self, account_code: i64) -> Result<bool, StoreError>;
    async fn card_number_taken(&self, card_number: &str) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: CustomerStore + ?Sized> IdentifierLookup for S {
    async fn account_code_taken(&self, account_code: i64) -> Result<bool, StoreError> {
        self.account_code_exists(account_code).await
    }

    async fn card_number_taken(&self, card_number: &str) -> Result<bool, StoreError> {
        self.card_number_exists(card_number).await
    }
}

pub struct UniqueCodeAllocator {
    metrics: Arc<Metrics>,
}

impl UniqueCodeAllocator {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self { metrics }
    }

    pub async fn allocate_account_code<L: IdentifierLookup + ?Sized>(
        &self,
        lookup: &L,
        tier: CardTier,
    ) -> Result<i64, AllocationError> {
        let today = Utc::now().date_naive();

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            let code = generate_account_code(tier, today)?;
            if !lookup.account_code_taken(code).await? {
                return Ok(code);
            }
            tracing::debug!(attempt, tier = %tier, "Account code collision, regenerating");
            self.metrics.record_collision("account_code");
        }

        let code = fallback_account_code(tier);
        tracing::warn!(
            attempts = MAX_ALLOCATION_ATTEMPTS,
            tier = %tier,
            "Account code retries exhausted, using fallback scheme without re-check"
        );
        self.metrics.record_fallback("account_code");
        Ok(code)
    }

    pub async fn allocate_card_number<L: IdentifierLookup + ?Sized>(
        &self,
        lookup: &L,
        tier: CardTier,
    ) -> Result<String, AllocationError> {
        let mut card_number = generate_card_number(tier)?;

        for attempt in 1..=MAX_ALLOCATION_ATTEMPTS {
            if !lookup.card_number_taken(&card_number).await? {
                return Ok(card_number);
            }
            tracing::debug!(attempt, tier = %tier, "Card number collision");
            self.metrics.record_collision("card_number");

            if attempt < MAX_ALLOCATION_ATTEMPTS {
                card_number = generate_card_number(tier)?;
            }
        }

        tracing::warn!(
            attempts = MAX_ALLOCATION_ATTEMPTS,
            tier = %tier,
            "Card number retries exhausted, keeping last candidate without re-check"
        );
        self.metrics.record_fallback("card_number");
        Ok(card_number)
    }
}

pub fn generate_account_code(tier: CardTier, today: NaiveDate) -> Result<i64, AllocationError> {
    let random: u32 = OsRng.gen_range(0..10_000);
    let code = format!(
        "{:02}{:02}{:02}{:04}",
        tier.account_prefix(),
        today.year().rem_euclid(100),
        today.month(),
        random
    );

    if code.len() != ACCOUNT_CODE_DIGITS {
        return Err(AllocationError::Malformed { identifier: "account_code", value: code });
    }
    code.parse()
        .map_err(|_| AllocationError::Malformed { identifier: "account_code", value: code.clone() })
}

pub fn fallback_account_code(tier: CardTier) -> i64 {
    i64::from(tier.account_prefix()) * 1_000_000 + OsRng.gen_range(100_000..1_000_000)
}

pub fn generate_card_number(tier: CardTier) -> Result<String, AllocationError> {
    let mut digits = String::with_capacity(CARD_NUMBER_DIGITS);
    digits.push_str(tier.card_prefix());
    for _ in 0..(CARD_NUMBER_DIGITS - digits.len()) {
        digits.push(char::from(b'0' + OsRng.gen_range(0..10u8)));
    }
    format_card_number(&digits)
}

/// "4102123456789012" -> "4102 1234 5678 9012"
pub fn format_card_number(digits: &str) -> Result<String, AllocationError> {
    if digits.len() != CARD_NUMBER_DIGITS || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AllocationError::Malformed {
            identifier: "card_number",
            value: digits.to_string(),
        });
    }

    let groups: Vec<&str> = (0..CARD_NUMBER_DIGITS)
        .step_by(4)
        .map(|start| &digits[start..start + 4])
        .collect();
    Ok(groups.join(" "))
}
