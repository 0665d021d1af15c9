use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::token::{self, Expiry};
use crate::storage::{namespaced_key, Storage};

/// Canonical key (inside the namespace) holding the credential
const CREDENTIAL_KEY: &str = "auth_token";

/// Un-namespaced keys earlier builds stored the credential under
pub const LEGACY_CREDENTIAL_KEYS: &[&str] = &["token", "authToken", "accessToken", "jwt"];

/// Single authoritative home of the bearer credential.
///
/// Every operation is total: storage failures are logged and reported as
/// "did not persist" (`false` / `None`) rather than returned as errors.
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
    key: String,
    /// Where earlier builds left the credential; usually `storage` itself
    legacy_storage: Arc<dyn Storage>,
    legacy_keys: Vec<String>,
    migrated: AtomicBool,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>, namespace: &str) -> Self {
        Self {
            legacy_storage: Arc::clone(&storage),
            storage,
            key: namespaced_key(namespace, CREDENTIAL_KEY),
            legacy_keys: LEGACY_CREDENTIAL_KEYS.iter().map(|k| k.to_string()).collect(),
            migrated: AtomicBool::new(false),
        }
    }

    pub fn with_legacy_keys(mut self, keys: Vec<String>) -> Self {
        self.legacy_keys = keys;
        self
    }

    /// Look for legacy keys in `storage` instead of the credential's own
    /// backend (e.g. when the credential now lives in the keychain).
    pub fn with_legacy_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.legacy_storage = storage;
        self
    }

    /// Sanitize and persist `raw`. Returns false, leaving any prior value in
    /// place, when the result isn't a well-formed credential or the write
    /// fails.
    pub fn set(&self, raw: &str) -> bool {
        let value = token::sanitize(raw);
        if !token::is_well_formed(&value) {
            debug!("Rejected malformed credential");
            return false;
        }

        let encoded = match serde_json::to_string(&value) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "Failed to encode credential");
                return false;
            }
        };

        match self.storage.set_item(&self.key, &encoded) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to persist credential");
                false
            }
        }
    }

    /// Read the credential. A stored value that fails the structural check is
    /// deleted and reported as absent.
    pub fn get(&self) -> Option<String> {
        let stored = match self.storage.get_item(&self.key) {
            Ok(stored) => stored?,
            Err(e) => {
                warn!(error = %e, "Failed to read credential");
                return None;
            }
        };

        // Stored JSON-encoded; older writers stored the bare string
        let decoded = serde_json::from_str::<String>(&stored).unwrap_or(stored);
        let value = token::sanitize(&decoded);

        if token::is_well_formed(&value) {
            Some(value)
        } else {
            info!("Discarding corrupt stored credential");
            self.remove();
            None
        }
    }

    pub fn remove(&self) {
        if let Err(e) = self.storage.remove_item(&self.key) {
            warn!(error = %e, "Failed to remove credential");
        }
    }

    /// Expiry state of the stored credential; `Unknown` when none is stored.
    pub fn expiry(&self) -> Expiry {
        self.get()
            .map(|value| token::expiry(&value))
            .unwrap_or(Expiry::Unknown)
    }

    /// Fails open: an undecodable payload is not expired.
    pub fn is_expired(&self) -> bool {
        self.expiry().is_expired()
    }

    pub fn has_valid(&self) -> bool {
        match self.get() {
            Some(value) => !token::expiry(&value).is_expired(),
            None => false,
        }
    }

    /// `"Bearer <credential>"`, or an empty string when there is none.
    pub fn as_auth_header(&self) -> String {
        self.get()
            .map(|value| format!("Bearer {}", value))
            .unwrap_or_default()
    }

    /// Record id the stored credential authorizes.
    pub fn subject(&self) -> Option<u64> {
        self.get().and_then(|value| token::subject(&value))
    }

    /// Move a credential left under a legacy key into the canonical key.
    ///
    /// Runs at most once per store; later calls return false. Only migrates
    /// when the canonical key is empty. Returns true when a value was moved.
    pub fn migrate_legacy(&self) -> bool {
        if self.migrated.swap(true, Ordering::SeqCst) {
            return false;
        }

        if self.get().is_some() {
            return false;
        }

        for legacy in &self.legacy_keys {
            let value = match self.legacy_storage.get_item(legacy) {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(key = %legacy, error = %e, "Failed to read legacy credential");
                    continue;
                }
            };

            let decoded = serde_json::from_str::<String>(&value).unwrap_or(value);
            if self.set(&decoded) {
                if let Err(e) = self.legacy_storage.remove_item(legacy) {
                    warn!(key = %legacy, error = %e, "Failed to remove legacy credential");
                }
                info!(key = %legacy, "Migrated legacy credential");
                return true;
            }
            debug!(key = %legacy, "Legacy credential is malformed, skipping");
        }

        false
    }
}
