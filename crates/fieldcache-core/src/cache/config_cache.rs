//! TTL cache around the configuration manifest.
//!
//! Resolution order for `get()`:
//! 1. a snapshot younger than the TTL, served without I/O
//! 2. a fresh fetch from the `ManifestSource`
//! 3. the last snapshot, however old, when the fetch fails
//! 4. the built-in fallback manifest
//!
//! Only one fetch is ever in flight. Callers arriving while it runs
//! subscribe to its result instead of starting their own. The fetch runs as
//! a detached task, so a caller that stops waiting doesn't cancel it.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::snapshot::{CachedData, ConfigSnapshot, Manifest, SnapshotOrigin};
use super::source::{fallback_manifest, ManifestSource};
use crate::error::StoreError;
use crate::storage::{namespaced_key, Storage};

/// Key (inside the namespace) of the persisted snapshot
const MANIFEST_KEY: &str = "manifest";

pub struct ConfigCache<S: ManifestSource> {
    inner: Arc<Inner<S>>,
}

impl<S: ManifestSource> Clone for ConfigCache<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    source: S,
    storage: Arc<dyn Storage>,
    key: String,
    ttl: Duration,
    snapshot: RwLock<Option<ConfigSnapshot>>,
    /// Bumped by `clear`; a fetch started before it doesn't store its result
    generation: AtomicU64,
    /// Present while a fetch runs; waiters subscribe to it
    in_flight: Mutex<Option<broadcast::Sender<ConfigSnapshot>>>,
}

impl<S: ManifestSource> ConfigCache<S> {
    /// Build the cache, loading any snapshot persisted by an earlier run.
    pub fn new(source: S, storage: Arc<dyn Storage>, namespace: &str, ttl: Duration) -> Self {
        let key = namespaced_key(namespace, MANIFEST_KEY);
        let persisted = load_persisted(storage.as_ref(), &key);
        if let Some(ref snapshot) = persisted {
            debug!(age = %snapshot.age_display(), "Loaded persisted configuration snapshot");
        }

        Self {
            inner: Arc::new(Inner {
                source,
                storage,
                key,
                ttl,
                snapshot: RwLock::new(persisted),
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
        }
    }

    /// Current configuration. Never fails.
    pub async fn get(&self) -> ConfigSnapshot {
        if let Some(snapshot) = self.inner.fresh_snapshot() {
            return snapshot.with_origin(SnapshotOrigin::Cached);
        }
        self.fetch(true).await
    }

    /// Bypass the TTL and fetch now. Joins a fetch that is already running.
    pub async fn refresh(&self) -> ConfigSnapshot {
        self.fetch(false).await
    }

    /// Drop the in-memory and persisted snapshots. A fetch already running
    /// still answers its waiters but leaves the cache empty.
    pub fn clear(&self) {
        let mut snapshot = self.inner.write_snapshot();
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        *snapshot = None;
        if let Err(e) = self.inner.storage.remove_item(&self.inner.key) {
            warn!(error = %e, "Failed to remove persisted configuration snapshot");
        }
        drop(snapshot);
        info!("Configuration cache cleared");
    }

    /// The held snapshot regardless of age, without fetching.
    pub fn peek(&self) -> Option<ConfigSnapshot> {
        self.inner.read_snapshot().clone()
    }

    pub fn is_fresh(&self) -> bool {
        self.inner.fresh_snapshot().is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    async fn fetch(&self, accept_fresh: bool) -> ConfigSnapshot {
        let mut rx = {
            let mut in_flight = self.inner.lock_in_flight();

            // A fetch may have completed between the TTL check and taking the lock
            if accept_fresh {
                if let Some(snapshot) = self.inner.fresh_snapshot() {
                    return snapshot.with_origin(SnapshotOrigin::Cached);
                }
            }

            match in_flight.as_ref() {
                Some(tx) => {
                    debug!("Joining in-flight configuration fetch");
                    tx.subscribe()
                }
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    *in_flight = Some(tx);
                    self.spawn_fetch();
                    rx
                }
            }
        };

        match rx.recv().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Configuration fetch ended without a result");
                self.inner.fallback()
            }
        }
    }

    fn spawn_fetch(&self) {
        let inner = Arc::clone(&self.inner);
        let generation = inner.generation.load(Ordering::SeqCst);
        tokio::spawn(async move {
            let started = Instant::now();
            let result = AssertUnwindSafe(inner.source.fetch())
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(StoreError::Fetch("manifest source panicked".to_string())));

            let snapshot = inner.complete(result, generation);
            debug!(
                duration_ms = started.elapsed().as_millis() as u64,
                origin = ?snapshot.origin,
                "Configuration fetch finished"
            );

            // Taken after the snapshot is stored so late arrivals see it as fresh
            let tx = inner.lock_in_flight().take();
            if let Some(tx) = tx {
                // No receivers just means every caller stopped waiting
                let _ = tx.send(snapshot);
            }
        });
    }
}

impl<S> Inner<S> {
    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, Option<ConfigSnapshot>> {
        self.snapshot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_snapshot(&self) -> std::sync::RwLockWriteGuard<'_, Option<ConfigSnapshot>> {
        self.snapshot.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, Option<broadcast::Sender<ConfigSnapshot>>> {
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh_snapshot(&self) -> Option<ConfigSnapshot> {
        self.read_snapshot()
            .as_ref()
            .filter(|s| !s.is_stale(self.ttl))
            .cloned()
    }

    /// Store a successful fetch, or fall back after a failed one. A result
    /// from before the last `clear` is handed to waiters but not stored.
    fn complete(&self, result: Result<Manifest, StoreError>, generation: u64) -> ConfigSnapshot {
        match result {
            Ok(manifest) => {
                let snapshot = CachedData::new(manifest);
                let mut held = self.write_snapshot();
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!("Cache cleared during fetch, discarding result");
                    return snapshot;
                }
                *held = Some(snapshot.clone());
                self.persist(&snapshot);
                snapshot
            }
            Err(e) => {
                warn!(error = %e, "Configuration fetch failed, serving fallback");
                self.fallback()
            }
        }
    }

    /// Last snapshot marked stale, or the built-in default.
    fn fallback(&self) -> ConfigSnapshot {
        match self.read_snapshot().as_ref() {
            Some(snapshot) => snapshot.clone().with_origin(SnapshotOrigin::Stale),
            None => CachedData::new(fallback_manifest()).with_origin(SnapshotOrigin::Default),
        }
    }

    fn persist(&self, snapshot: &ConfigSnapshot) {
        let result = serde_json::to_string(snapshot)
            .map_err(StoreError::from)
            .and_then(|contents| {
                self.storage
                    .set_item(&self.key, &contents)
                    .map_err(StoreError::storage)
            });
        if let Err(e) = result {
            warn!(error = %e, "Configuration snapshot not persisted");
        }
    }
}

fn load_persisted(storage: &dyn Storage, key: &str) -> Option<ConfigSnapshot> {
    let contents = match storage.get_item(key) {
        Ok(contents) => contents?,
        Err(e) => {
            warn!(error = %e, "Failed to read persisted configuration snapshot");
            return None;
        }
    };
    match serde_json::from_str::<ConfigSnapshot>(&contents) {
        Ok(snapshot) => Some(snapshot.with_origin(SnapshotOrigin::Cached)),
        Err(e) => {
            warn!(error = %e, "Ignoring corrupt persisted configuration snapshot");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::source::{builtin_manifest, StaticManifest};
    use crate::storage::faulty::FaultyStorage;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    /// Counts fetches; can be switched to failing and made slow
    #[derive(Clone, Default)]
    struct TestSource {
        calls: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
        delay: Duration,
        version: u64,
    }

    impl TestSource {
        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn fail(&self) {
            self.failing.store(true, Ordering::SeqCst);
        }
    }

    impl ManifestSource for TestSource {
        async fn fetch(&self) -> Result<Manifest, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::fetch("server unreachable"));
            }
            let mut manifest = Manifest::new();
            manifest.insert("version".to_string(), json!(self.version));
            Ok(manifest)
        }
    }

    struct PanickingSource;

    impl ManifestSource for PanickingSource {
        async fn fetch(&self) -> Result<Manifest, StoreError> {
            panic!("boom")
        }
    }

    fn persist_snapshot(storage: &MemoryStorage, version: u64, age: chrono::Duration) {
        let mut data = Manifest::new();
        data.insert("version".to_string(), json!(version));
        let contents = json!({ "data": data, "cached_at": Utc::now() - age }).to_string();
        storage.set_item("test:manifest", &contents).unwrap();
    }

    #[tokio::test]
    async fn test_get_within_ttl_fetches_once() {
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), Arc::new(MemoryStorage::new()), "test", TTL);

        let first = cache.get().await;
        let second = cache.get().await;

        assert_eq!(source.calls(), 1);
        assert_eq!(first.origin, SnapshotOrigin::Fetched);
        assert_eq!(second.origin, SnapshotOrigin::Cached);
        assert_eq!(first.cached_at, second.cached_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_gets_coalesce() {
        let source = TestSource::slow(Duration::from_millis(500));
        let cache = ConfigCache::new(source.clone(), Arc::new(MemoryStorage::new()), "test", TTL);

        let results = futures::future::join_all((0..10).map(|_| cache.get())).await;

        assert_eq!(source.calls(), 1);
        assert!(results.iter().all(|s| s.cached_at == results[0].cached_at));
        assert!(results.iter().all(|s| s.data == results[0].data));
    }

    #[tokio::test]
    async fn test_failure_without_snapshot_returns_default() {
        let source = TestSource::default();
        source.fail();
        let cache = ConfigCache::new(source, Arc::new(MemoryStorage::new()), "test", TTL);

        let snapshot = cache.get().await;
        assert!(snapshot.is_default());
        assert_eq!(snapshot.data, fallback_manifest());
        // The default is never cached as if it were real
        assert!(cache.peek().is_none());
    }

    #[tokio::test]
    async fn test_failure_with_stale_snapshot_returns_stale() {
        let storage = Arc::new(MemoryStorage::new());
        persist_snapshot(&storage, 7, chrono::Duration::minutes(10));
        let source = TestSource::default();
        source.fail();
        let cache = ConfigCache::new(source.clone(), storage, "test", TTL);

        let snapshot = cache.get().await;
        assert_eq!(source.calls(), 1);
        assert_eq!(snapshot.origin, SnapshotOrigin::Stale);
        assert_eq!(snapshot.data["version"], 7);
    }

    #[tokio::test]
    async fn test_stale_after_refresh_failure() {
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), Arc::new(MemoryStorage::new()), "test", TTL);
        let fetched = cache.get().await;

        source.fail();
        let refreshed = cache.refresh().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(refreshed.origin, SnapshotOrigin::Stale);
        assert_eq!(refreshed.data, fetched.data);
    }

    #[tokio::test]
    async fn test_fresh_persisted_snapshot_skips_fetch() {
        let storage = Arc::new(MemoryStorage::new());
        persist_snapshot(&storage, 3, chrono::Duration::minutes(1));
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), storage, "test", TTL);

        let snapshot = cache.get().await;
        assert_eq!(source.calls(), 0);
        assert_eq!(snapshot.origin, SnapshotOrigin::Cached);
        assert_eq!(snapshot.data["version"], 3);
    }

    #[tokio::test]
    async fn test_stale_persisted_snapshot_is_refreshed() {
        let storage = Arc::new(MemoryStorage::new());
        persist_snapshot(&storage, 3, chrono::Duration::minutes(6));
        let source = TestSource {
            version: 4,
            ..TestSource::default()
        };
        let cache = ConfigCache::new(source.clone(), storage.clone(), "test", TTL);

        let snapshot = cache.get().await;
        assert_eq!(source.calls(), 1);
        assert_eq!(snapshot.data["version"], 4);

        let persisted: serde_json::Value =
            serde_json::from_str(&storage.get_item("test:manifest").unwrap().unwrap()).unwrap();
        assert_eq!(persisted["data"]["version"], 4);
        assert!(persisted.get("cached_at").is_some());
    }

    #[tokio::test]
    async fn test_refresh_always_fetches() {
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), Arc::new(MemoryStorage::new()), "test", TTL);

        cache.get().await;
        let refreshed = cache.refresh().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(refreshed.origin, SnapshotOrigin::Fetched);
    }

    #[tokio::test]
    async fn test_clear_drops_both_copies() {
        let storage = Arc::new(MemoryStorage::new());
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), storage.clone(), "test", TTL);
        cache.get().await;
        assert!(storage.get_item("test:manifest").unwrap().is_some());

        cache.clear();
        assert!(cache.peek().is_none());
        assert!(storage.get_item("test:manifest").unwrap().is_none());

        cache.get().await;
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_during_fetch_stays_cleared() {
        let storage = Arc::new(MemoryStorage::new());
        let source = TestSource::slow(Duration::from_millis(500));
        let cache = ConfigCache::new(source.clone(), storage.clone(), "test", TTL);

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        cache.clear();

        let snapshot = waiter.await.unwrap();
        assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
        assert!(cache.peek().is_none());
        assert!(!cache.is_fresh());
        assert!(storage.get_item("test:manifest").unwrap().is_none());

        // The next get fetches again and is stored as usual
        cache.get().await;
        assert_eq!(source.calls(), 2);
        assert!(cache.is_fresh());
        assert!(storage.get_item("test:manifest").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_persist_failure_still_serves_fetch() {
        let storage = Arc::new(FaultyStorage::new());
        storage.set_fail_writes(true);
        let source = TestSource::default();
        let cache = ConfigCache::new(source.clone(), storage.clone(), "test", TTL);

        let snapshot = cache.get().await;
        assert_eq!(snapshot.origin, SnapshotOrigin::Fetched);
        assert!(cache.is_fresh());
        assert!(storage.get_item("test:manifest").unwrap().is_none());

        // Held in memory, so the next get is served without a fetch
        assert_eq!(cache.get().await.origin, SnapshotOrigin::Cached);
        assert_eq!(source.calls(), 1);

        // A failing remove leaves clear effective in memory
        cache.clear();
        assert!(cache.peek().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_persisted_snapshot_is_ignored() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item("test:manifest", "{broken").unwrap();
        let cache = ConfigCache::new(TestSource::default(), storage, "test", TTL);
        assert!(cache.peek().is_none());
        assert_eq!(cache.get().await.origin, SnapshotOrigin::Fetched);
    }

    #[tokio::test]
    async fn test_panicking_source_falls_back() {
        let cache = ConfigCache::new(PanickingSource, Arc::new(MemoryStorage::new()), "test", TTL);
        let snapshot = cache.get().await;
        assert!(snapshot.is_default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_get_still_completes_fetch() {
        let source = TestSource::slow(Duration::from_millis(500));
        let cache = ConfigCache::new(source.clone(), Arc::new(MemoryStorage::new()), "test", TTL);

        let waiter = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        waiter.abort();

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(cache.is_fresh());
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_static_builtin_source() {
        let cache = ConfigCache::new(StaticManifest::builtin(), Arc::new(MemoryStorage::new()), "test", TTL);
        assert_eq!(cache.get().await.data, builtin_manifest());
    }
}
