use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::CustomerError;

// ============================================================================
// Customer Value Objects
// ============================================================================

pub const NATIONAL_ID_LENGTH: usize = 16;

/// Customer email address, stored lower-cased so uniqueness is case-insensitive
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, CustomerError> {
        let email = raw.trim();
        if email.is_empty() {
            return Err(CustomerError::EmptyEmail);
        }
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => {
                Ok(Self(email.to_lowercase()))
            }
            _ => Err(CustomerError::InvalidEmail(email.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Customer phone number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn parse(raw: &str) -> Result<Self, CustomerError> {
        let phone: String = raw.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
        let digits = phone.strip_prefix('+').unwrap_or(&phone);
        if digits.len() < 8 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(CustomerError::InvalidPhone(raw.to_string()));
        }
        Ok(Self(phone))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed-length numeric national identity number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NationalId(String);

impl NationalId {
    pub fn parse(raw: &str) -> Result<Self, CustomerError> {
        let id = raw.trim();
        if id.len() != NATIONAL_ID_LENGTH || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(CustomerError::InvalidNationalId);
        }
        Ok(Self(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NationalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Card product tier. Controls the numeric prefixes of generated identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CardTier {
    Silver,
    Gold,
    Platinum,
    Gpn,
}

impl CardTier {
    pub const BASE: CardTier = CardTier::Silver;

    /// Case-insensitive lookup by product name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "silver" => Some(Self::Silver),
            "gold" => Some(Self::Gold),
            "platinum" => Some(Self::Platinum),
            "gpn" => Some(Self::Gpn),
            _ => None,
        }
    }

    /// Unknown names fall back to the base tier
    pub fn from_name_or_base(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::BASE)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Silver => "Silver",
            Self::Gold => "Gold",
            Self::Platinum => "Platinum",
            Self::Gpn => "GPN",
        }
    }

    /// Two-digit prefix of the account code
    pub fn account_prefix(&self) -> u32 {
        match self {
            Self::Silver => 10,
            Self::Gold => 20,
            Self::Platinum => 30,
            Self::Gpn => 40,
        }
    }

    /// Four-digit issuer prefix of the virtual card number
    pub fn card_prefix(&self) -> &'static str {
        match self {
            Self::Silver => "4101",
            Self::Gold => "4102",
            Self::Platinum => "4103",
            Self::Gpn => "5104",
        }
    }
}

impl fmt::Display for CardTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Residential address, owned by exactly one customer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub street: String,
    pub village: String,
    pub district: String,
    pub city: String,
    pub province: String,
    pub postal_code: String,
}

/// Legal guardian of a minor account holder
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Guardian {
    pub full_name: String,
    pub relationship: String,
    pub phone: String,
    pub address: String,
    pub occupation: String,
}

impl Guardian {
    /// A guardian counts only when every descriptive field is filled in.
    /// A partially filled guardian is treated the same as no guardian.
    pub fn is_complete(&self) -> bool {
        [
            &self.full_name,
            &self.relationship,
            &self.phone,
            &self.address,
            &self.occupation,
        ]
        .iter()
        .all(|field| !field.trim().is_empty())
    }
}

/// Keep only the last four characters visible, for log output
pub fn mask(value: &str) -> String {
    let visible = value.chars().rev().take(4).collect::<Vec<_>>();
    let hidden = value.chars().count().saturating_sub(visible.len());
    let mut masked = "*".repeat(hidden);
    masked.extend(visible.into_iter().rev());
    masked
}
