use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::customer::{Address, CustomerError, Email, Guardian, NationalId, PhoneNumber};

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Registration form as submitted by the applicant
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub full_name: String,
    pub national_id: String,
    pub mother_maiden_name: String,
    #[serde(default)]
    pub birth_place: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub religion: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub account_type: String,
    #[serde(default)]
    pub card_tier: Option<String>,
    #[serde(default)]
    pub account_code: Option<i64>,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub guardian: Option<Guardian>,
}

/// Normalized identifiers extracted from a request that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedIdentifiers {
    pub email: Email,
    pub phone: PhoneNumber,
    pub national_id: NationalId,
}

impl RegistrationRequest {
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedIdentifiers, CustomerError> {
        if self.full_name.trim().is_empty() {
            return Err(CustomerError::EmptyFullName);
        }
        if self.mother_maiden_name.trim().is_empty() {
            return Err(CustomerError::EmptyMotherMaidenName);
        }
        if self.account_type.trim().is_empty() {
            return Err(CustomerError::EmptyAccountType);
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CustomerError::PasswordTooShort(MIN_PASSWORD_LENGTH));
        }
        if self.birth_date > today {
            return Err(CustomerError::BirthDateInFuture);
        }
        if let Some(code) = self.account_code.filter(|code| *code <= 0) {
            return Err(CustomerError::InvalidAccountCode(code));
        }

        Ok(ValidatedIdentifiers {
            email: Email::parse(&self.email)?,
            phone: PhoneNumber::parse(&self.phone)?,
            national_id: NationalId::parse(&self.national_id)?,
        })
    }

    /// The guardian is kept only when every field is filled in
    pub fn complete_guardian(&self) -> Option<Guardian> {
        self.guardian.clone().filter(Guardian::is_complete)
    }
}

/// Returned to the caller after a successful registration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationSummary {
    #[serde(rename = "jenisKartu")]
    pub card_tier: String,
    #[serde(rename = "namaLengkap")]
    pub full_name: String,
    #[serde(rename = "noRekening")]
    pub account_code: String,
    #[serde(rename = "jenisTabungan")]
    pub account_type: String,
    #[serde(rename = "nomorKartu")]
    pub card_number: String,
}
