//! Wiring of the stores from `Settings`.
//!
//! Everything is constructed here and handed to the caller; nothing in the
//! crate holds process-wide state.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::auth::{AnyNonEmptySecret, CredentialStore, SecretVerifier, SessionFacade, USERS_COLLECTION};
use crate::cache::{ConfigCache, ConfiguredManifest, FileManifest, SnapshotOrigin, StaticManifest};
use crate::config::{CredentialBackend, Settings};
use crate::error::StoreError;
use crate::latency;
use crate::resources::ResourceStore;
use crate::seed;
use crate::storage::{FileStorage, KeyringStorage, MemoryStorage, Storage};

/// Collection the demo farmer members are seeded into
pub const MEMBERS_COLLECTION: &str = "members";

const DEMO_MEMBER_COUNT: usize = 24;

/// What happened during `Services::bootstrap`.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapReport {
    pub migrated_credential: bool,
    pub config_origin: SnapshotOrigin,
}

pub struct Services {
    pub settings: Settings,
    pub storage: Arc<dyn Storage>,
    pub credentials: Arc<CredentialStore>,
    pub resources: Arc<ResourceStore>,
    pub config: ConfigCache<ConfiguredManifest>,
    pub session: SessionFacade,
}

impl Services {
    /// Build every component over the given backends.
    ///
    /// `credential_storage` may be the same backend as `storage`; legacy
    /// credential keys are always looked up in `storage`.
    pub fn build(
        settings: Settings,
        storage: Arc<dyn Storage>,
        credential_storage: Arc<dyn Storage>,
        verifier: Arc<dyn SecretVerifier>,
    ) -> Self {
        let namespace = settings.namespace.clone();
        let delay = latency::from_settings(&settings);

        let credentials = Arc::new(
            CredentialStore::new(credential_storage, &namespace).with_legacy_storage(Arc::clone(&storage)),
        );

        let resources = Arc::new(
            ResourceStore::new(Arc::clone(&storage), &namespace)
                .with_delay(Arc::clone(&delay))
                .with_search_fields(settings.search_fields.clone()),
        );

        let source = match &settings.manifest_path {
            Some(path) => ConfiguredManifest::File(FileManifest::new(path.clone())),
            None => ConfiguredManifest::Builtin(StaticManifest::builtin().with_delay(delay)),
        };
        let config = ConfigCache::new(source, Arc::clone(&storage), &namespace, settings.config_ttl());

        let session = SessionFacade::new(Arc::clone(&credentials), Arc::clone(&resources), verifier)
            .with_identifier_field(settings.identifier_field.clone())
            .with_session_ttl(settings.session_ttl());

        Self {
            settings,
            storage,
            credentials,
            resources,
            config,
            session,
        }
    }

    /// File-backed services at `settings.data_dir` (or the platform data
    /// directory), with the credential in the keychain when configured. The
    /// keychain service is named after the namespace.
    pub fn open(settings: Settings) -> Result<Self> {
        let files = match &settings.data_dir {
            Some(dir) => FileStorage::new(dir.clone()),
            None => FileStorage::default_location(),
        }
        .context("Failed to open data directory")?;
        debug!(data_dir = %files.data_dir().display(), "Opened file storage");

        let storage: Arc<dyn Storage> = Arc::new(files);
        let credential_storage: Arc<dyn Storage> = match settings.credential_backend {
            CredentialBackend::Storage => Arc::clone(&storage),
            CredentialBackend::Keyring => Arc::new(KeyringStorage::with_service(settings.namespace.clone())),
        };

        Ok(Self::build(settings, storage, credential_storage, Arc::new(AnyNonEmptySecret)))
    }

    /// Services over a fresh in-memory store.
    pub fn in_memory(settings: Settings) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        Self::build(settings, Arc::clone(&storage), storage, Arc::new(AnyNonEmptySecret))
    }

    /// One-time startup work: migrate a legacy credential and warm the
    /// configuration cache. Never fails; the config falls back as usual.
    pub async fn bootstrap(&self) -> BootstrapReport {
        let migrated_credential = self.credentials.migrate_legacy();
        let snapshot = self.config.get().await;

        info!(
            migrated_credential,
            config_origin = ?snapshot.origin,
            "Bootstrap complete"
        );

        BootstrapReport {
            migrated_credential,
            config_origin: snapshot.origin,
        }
    }

    /// Seed demo users and members into empty collections. Returns the number
    /// of records written.
    pub async fn seed_demo_data(&self) -> Result<usize, StoreError> {
        let users = self.resources.seed(USERS_COLLECTION, seed::demo_users()).await?;
        let members = self
            .resources
            .seed(MEMBERS_COLLECTION, seed::demo_members(DEMO_MEMBER_COUNT))
            .await?;
        info!(users, members, "Seeded demo data");
        Ok(users + members)
    }
}
