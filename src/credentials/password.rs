use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use crate::config::PasswordSettings;

// ============================================================================
// Password Hashing - Argon2id with a random salt per password
// ============================================================================
//
// Hashes are stored as PHC strings, so verification reads its parameters
// from the stored hash. Both operations run on the blocking pool.
//
// A login for an unknown email verifies against a throwaway hash made with
// the same parameters, so both branches cost one Argon2 run.
//
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Invalid Argon2 parameters: {0}")]
    InvalidParams(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Stored password hash is unreadable: {0}")]
    CorruptHash(String),

    #[error("Hashing worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: String,
}

fn hash_with(params: Params, password: &[u8]) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| PasswordError::Hash(e.to_string()))
}

impl PasswordHasher {
    pub fn new(settings: &PasswordSettings) -> Result<Self, PasswordError> {
        let params = Params::new(settings.memory_kib, settings.iterations, settings.parallelism, None)
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;
        let dummy_hash = hash_with(params.clone(), b"no-such-account")?;
        Ok(Self { params, dummy_hash })
    }

    pub async fn hash(&self, password: String) -> Result<String, PasswordError> {
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || hash_with(params, password.as_bytes())).await?
    }

    /// Same cost as `verify`, result discarded. Used when no account matched.
    pub async fn verify_dummy(&self, password: String) -> Result<(), PasswordError> {
        self.verify(password, self.dummy_hash.clone()).await.map(|_| ())
    }

    pub async fn verify(&self, password: String, stored_hash: String) -> Result<bool, PasswordError> {
        tokio::task::spawn_blocking(move || {
            let parsed = PasswordHash::new(&stored_hash)
                .map_err(|e| PasswordError::CorruptHash(e.to_string()))?;
            match Argon2::default().verify_password(password.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(PasswordError::CorruptHash(e.to_string())),
            }
        })
        .await?
    }
}
