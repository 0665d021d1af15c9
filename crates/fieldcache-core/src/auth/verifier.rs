//! Pluggable secret verification for login.
//!
//! `AnyNonEmptySecret` reproduces the demo behaviour of accepting any
//! non-empty password. `Argon2Verifier` checks the secret against a PHC
//! hash stored on the user record.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::warn;

use crate::error::StoreError;
use crate::resources::Record;

/// Record field holding the Argon2 PHC string
pub const PASSWORD_HASH_FIELD: &str = "password_hash";

/// Decides whether `secret` unlocks `record`.
pub trait SecretVerifier: Send + Sync {
    fn verify(&self, record: &Record, secret: &str) -> bool;
}

/// Accepts any non-empty secret.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyNonEmptySecret;

impl SecretVerifier for AnyNonEmptySecret {
    fn verify(&self, _record: &Record, secret: &str) -> bool {
        !secret.is_empty()
    }
}

/// Verifies against an Argon2 hash in the record's `password_hash` field.
///
/// Records without a hash, or with an unparseable one, never verify.
#[derive(Debug, Clone)]
pub struct Argon2Verifier {
    field: String,
}

impl Argon2Verifier {
    pub fn new() -> Self {
        Self {
            field: PASSWORD_HASH_FIELD.to_string(),
        }
    }

    pub fn with_field(field: impl Into<String>) -> Self {
        Self { field: field.into() }
    }
}

impl Default for Argon2Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretVerifier for Argon2Verifier {
    fn verify(&self, record: &Record, secret: &str) -> bool {
        let Some(hash) = record.get_str(&self.field) else {
            return false;
        };
        match verify_password(secret, hash) {
            Ok(matches) => matches,
            Err(e) => {
                warn!(record_id = record.id, error = %e, "Stored password hash is invalid");
                false
            }
        }
    }
}

/// Hash a password using Argon2id, returning the PHC string.
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Validation(format!("Failed to hash password: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, StoreError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| StoreError::Validation(format!("Invalid password hash format: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}
