//! Fieldcache Core - client-side session and configuration cache.
//!
//! This crate holds everything the dashboard needs before a real backend
//! exists: a validated store for the bearer credential, a local emulation of
//! a paginated collection API, a TTL cache for the configuration manifest,
//! and a session facade tying credentials to user records.
//!
//! Components are built explicitly from [`Settings`] by [`Services`]; there
//! is no global state.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod latency;
pub mod resources;
pub mod seed;
pub mod services;
pub mod storage;
pub mod utils;

// Re-export commonly used types at crate root
pub use auth::{
    AnyNonEmptySecret, Argon2Verifier, CredentialStore, Expiry, LoginOutcome, SecretVerifier,
    SessionFacade, SessionState, USERS_COLLECTION,
};
pub use cache::{CachedData, ConfigCache, ConfigSnapshot, Manifest, ManifestSource, SnapshotOrigin};
pub use config::{CredentialBackend, LatencyBand, Settings};
pub use error::StoreError;
pub use resources::{ListQuery, Page, Record, ResourceStore};
pub use services::{BootstrapReport, Services, MEMBERS_COLLECTION};
pub use storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};
