//! Configuration caching.
//!
//! This module provides the `ConfigCache`, which shields the application
//! from the latency and failures of fetching the configuration manifest.
//! Snapshots are persisted as `{ "data": ..., "cached_at": ... }` and
//! considered stale after the configured TTL (5 minutes by default).
//!
//! Manifest sources:
//! - `StaticManifest`: built-in manifest behind simulated latency
//! - `FileManifest`: JSON document read from disk

pub mod config_cache;
pub mod snapshot;
pub mod source;

pub use config_cache::ConfigCache;
pub use snapshot::{CachedData, ConfigSnapshot, Manifest, SnapshotOrigin};
pub use source::{
    builtin_manifest, fallback_manifest, ConfiguredManifest, FileManifest, ManifestSource, StaticManifest,
};
