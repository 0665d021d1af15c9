use thiserror::Error;

/// Failure taxonomy shared by every component of the store.
///
/// `Validation` and `NotFound` are routine outcomes callers branch on.
/// `Storage` and `Fetch` are normally absorbed at component boundaries and
/// turned into a fallback; they only surface from the resource store, where
/// "the write did not persist" has to be reported to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Record {id} not found in {collection}")]
    NotFound { collection: String, id: u64 },

    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Configuration fetch failed: {0}")]
    Fetch(String),

    #[error("Serialization failure: {0}")]
    Serialization(String),
}

/// Maximum length for error details carried inside a `StoreError`
const MAX_ERROR_DETAIL_LENGTH: usize = 200;

impl StoreError {
    /// Truncate a detail message so a corrupt payload doesn't flood the logs
    fn truncate_detail(detail: &str) -> String {
        if detail.len() <= MAX_ERROR_DETAIL_LENGTH {
            detail.to_string()
        } else {
            let cut: String = detail.chars().take(MAX_ERROR_DETAIL_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, detail.len())
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        StoreError::Storage(Self::truncate_detail(&err.to_string()))
    }

    pub fn fetch(err: impl std::fmt::Display) -> Self {
        StoreError::Fetch(Self::truncate_detail(&err.to_string()))
    }

    pub fn not_found(collection: &str, id: u64) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(Self::truncate_detail(&err.to_string()))
    }
}
