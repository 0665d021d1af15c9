//! Key-value persistence shared by every component.
//!
//! This module provides:
//! - `Storage`: the local-storage style trait the stores persist through
//! - `MemoryStorage`: process-local map, used by tests and ephemeral runs
//! - `FileStorage`: one JSON file per key inside a data directory
//! - `KeyringStorage`: OS keychain entries, used for the credential
//!
//! Keys are namespaced (`"<namespace>:<key>"`) so several logical stores can
//! share one backend without colliding.

#[cfg(test)]
pub(crate) mod faulty;
pub mod file;
pub mod keychain;
pub mod memory;

use anyhow::Result;

pub use file::FileStorage;
pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;

/// A string-keyed, string-valued store with browser local-storage semantics.
///
/// Writes are visible to every reader as soon as `set_item` returns.
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> Result<()>;

    fn keys(&self) -> Result<Vec<String>>;
}

/// Build the fully-qualified key for `key` inside `namespace`.
pub fn namespaced_key(namespace: &str, key: &str) -> String {
    if namespace.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", namespace, key)
    }
}

/// Prefix shared by every collection key in `namespace`.
pub fn collection_prefix(namespace: &str) -> String {
    namespaced_key(namespace, "collection:")
}

/// Key holding a resource collection.
pub fn collection_key(namespace: &str, collection: &str) -> String {
    format!("{}{}", collection_prefix(namespace), collection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_key() {
        assert_eq!(namespaced_key("fieldcache", "auth_token"), "fieldcache:auth_token");
        assert_eq!(namespaced_key("", "token"), "token");
    }

    #[test]
    fn test_collection_key() {
        assert_eq!(collection_key("fieldcache", "members"), "fieldcache:collection:members");
        assert!(collection_key("ns", "users").starts_with(&collection_prefix("ns")));
    }
}
