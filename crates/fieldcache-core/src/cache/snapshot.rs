use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::format_age_minutes;

/// Configuration payload served to the UI (navigation, menus, options).
/// Opaque to the cache.
pub type Manifest = Map<String, Value>;

/// Where the value handed to a caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotOrigin {
    /// Just fetched from the source
    Fetched,
    /// Served from memory (or the persisted copy) within the TTL
    #[default]
    Cached,
    /// Past the TTL, served because a refresh failed
    Stale,
    /// Built-in fallback; nothing was ever fetched successfully
    Default,
}

/// A value plus the instant it was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
    #[serde(skip)]
    pub origin: SnapshotOrigin,
}

pub type ConfigSnapshot = CachedData<Manifest>;

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
            origin: SnapshotOrigin::Fetched,
        }
    }

    pub fn with_origin(mut self, origin: SnapshotOrigin) -> Self {
        self.origin = origin;
        self
    }

    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.cached_at
    }

    pub fn age_minutes(&self) -> i64 {
        self.age().num_minutes()
    }

    pub fn age_display(&self) -> String {
        format_age_minutes(self.age_minutes())
    }

    /// Older than `ttl`. A capture time in the future (clock skew) is fresh.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => self.age() > ttl,
            Err(_) => false,
        }
    }

    pub fn is_default(&self) -> bool {
        self.origin == SnapshotOrigin::Default
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn manifest() -> Manifest {
        let mut manifest = Manifest::new();
        manifest.insert("features".to_string(), serde_json::json!({ "exports": true }));
        manifest
    }

    #[test]
    fn test_new_snapshot_is_fetched_and_fresh() {
        let snapshot = ConfigSnapshot::new(manifest());
        assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
        assert_eq!(snapshot.age_display(), "just now");
        assert!(!snapshot.is_default());
    }

    #[test]
    fn test_snapshot_goes_stale_after_ttl() {
        let ttl = Duration::from_secs(300);
        let mut snapshot = ConfigSnapshot::new(manifest());
        assert!(!snapshot.is_stale(ttl));

        snapshot.cached_at = Utc::now() - ChronoDuration::minutes(6);
        assert!(snapshot.is_stale(ttl));
        assert_eq!(snapshot.age_minutes(), 6);
        assert_eq!(snapshot.age_display(), "6m ago");
    }

    #[test]
    fn test_future_capture_is_fresh() {
        let mut skewed = CachedData::new(());
        skewed.cached_at = Utc::now() + ChronoDuration::minutes(10);
        assert!(!skewed.is_stale(Duration::from_secs(1)));
        assert_eq!(skewed.age_display(), "just now");
    }

    #[test]
    fn test_serialized_shape() {
        let cached = CachedData::new(7).with_origin(SnapshotOrigin::Stale);
        let value = serde_json::to_value(&cached).unwrap();
        assert_eq!(value["data"], 7);
        assert!(value.get("cached_at").is_some());
        assert!(value.get("origin").is_none());

        let back: CachedData<i32> = serde_json::from_value(value).unwrap();
        assert_eq!(back.origin, SnapshotOrigin::Cached);
    }
}
