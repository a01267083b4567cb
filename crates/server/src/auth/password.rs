//! Password hashing and verification.
//!
//! Uses Argon2id with a configurable work factor. Both operations are CPU
//! heavy on purpose and run on the blocking pool.

use crate::config::PasswordConfig;
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("Invalid Argon2 parameters: {0}")]
    Params(argon2::Error),
    #[error("Hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
    #[error("Hashing task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Argon2id hasher holding the configured work factor.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
    /// Verified against when the account does not exist so both login
    /// failure paths cost one hash.
    dummy_digest: String,
}

impl PasswordHasher {
    pub fn new(config: &PasswordConfig) -> Result<Self, HashingError> {
        let params = Params::new(
            config.memory_kib,
            config.iterations,
            config.parallelism,
            None,
        )
        .map_err(HashingError::Params)?;
        let dummy_digest = hash_with(&params, "commerce-auth-dummy-password")?;
        Ok(Self {
            params,
            dummy_digest,
        })
    }

    /// Hash a password, returning the PHC string suitable for storage.
    pub async fn hash(&self, password: &str) -> Result<String, HashingError> {
        let params = self.params.clone();
        let password = password.to_owned();
        tokio::task::spawn_blocking(move || hash_with(&params, &password)).await?
    }

    /// Never fails: a malformed digest or a panicked worker is a mismatch.
    pub async fn verify(&self, password: &str, digest: &str) -> bool {
        let password = password.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || verify_password(&password, &digest))
            .await
            .unwrap_or(false)
    }

    /// Burns one verification against the dummy digest.
    pub async fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_digest).await;
    }
}

fn argon2(params: &Params) -> Argon2<'static> {
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
}

fn hash_with(params: &Params, password: &str) -> Result<String, HashingError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2(params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(HashingError::Hash)?;
    Ok(hash.to_string())
}

/// Verify a password against a stored hash.
///
/// The digest carries its own parameters, so hashes made under an older work
/// factor still verify.
pub fn verify_password(password: &str, digest: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(digest) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
