use anyhow::{Context, Result};
use keyring::Entry;

use super::Storage;

/// OS keychain backend. Each key becomes one keychain entry under
/// `service`.
///
/// The keychain cannot be enumerated, so `keys()` always reports nothing.
/// Only suited to small secrets such as the session credential.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Storage for KeyringStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve value from keychain"),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store value in keychain")
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete value from keychain"),
        }
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}
