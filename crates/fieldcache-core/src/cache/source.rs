//! Where configuration manifests come from.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use super::snapshot::Manifest;
use crate::error::StoreError;
use crate::latency::{self, DelayStrategy, NoDelay, Operation};

/// A slow, fallible "fetch configuration" operation.
pub trait ManifestSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<Manifest, StoreError>> + Send;
}

/// Serves a fixed manifest behind the simulated network delay. This is what
/// the dashboard's development server would return.
pub struct StaticManifest {
    manifest: Manifest,
    delay: Arc<dyn DelayStrategy>,
}

impl StaticManifest {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest,
            delay: Arc::new(NoDelay),
        }
    }

    /// The built-in dashboard manifest.
    pub fn builtin() -> Self {
        Self::new(builtin_manifest())
    }

    pub fn with_delay(mut self, delay: Arc<dyn DelayStrategy>) -> Self {
        self.delay = delay;
        self
    }
}

impl ManifestSource for StaticManifest {
    async fn fetch(&self) -> Result<Manifest, StoreError> {
        latency::simulate(self.delay.as_ref(), Operation::Read).await;
        Ok(self.manifest.clone())
    }
}

/// Reads the manifest from a JSON file on every fetch.
pub struct FileManifest {
    path: PathBuf,
}

impl FileManifest {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ManifestSource for FileManifest {
    async fn fetch(&self) -> Result<Manifest, StoreError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| StoreError::fetch(format!("{}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), bytes = contents.len(), "Read manifest file");
        parse_manifest(&contents)
    }
}

/// The source chosen by settings: a manifest file when one is configured,
/// otherwise the built-in manifest.
pub enum ConfiguredManifest {
    Builtin(StaticManifest),
    File(FileManifest),
}

impl ManifestSource for ConfiguredManifest {
    async fn fetch(&self) -> Result<Manifest, StoreError> {
        match self {
            ConfiguredManifest::Builtin(source) => source.fetch().await,
            ConfiguredManifest::File(source) => source.fetch().await,
        }
    }
}

/// Parse a manifest document; it must be a JSON object.
pub fn parse_manifest(contents: &str) -> Result<Manifest, StoreError> {
    match serde_json::from_str::<Value>(contents).map_err(StoreError::fetch)? {
        Value::Object(manifest) => Ok(manifest),
        other => Err(StoreError::Fetch(format!(
            "manifest must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn as_manifest(value: Value) -> Manifest {
    match value {
        Value::Object(manifest) => manifest,
        _ => Manifest::new(),
    }
}

/// Manifest served by the development source.
pub fn builtin_manifest() -> Manifest {
    as_manifest(json!({
        "app": { "name": "Extension Dashboard", "version": "1.4.0" },
        "navigation": [
            { "key": "dashboard", "label": "Dashboard", "path": "/" },
            { "key": "members", "label": "Farmer Members", "path": "/members" },
            { "key": "trainings", "label": "Training Sessions", "path": "/trainings" },
            { "key": "vsla", "label": "VSLA Groups", "path": "/vsla" },
            { "key": "reports", "label": "Reports", "path": "/reports" },
            { "key": "settings", "label": "Settings", "path": "/settings" }
        ],
        "options": {
            "crop_types": ["maize", "sorghum", "cassava", "groundnut", "cowpea"],
            "regions": ["North", "Central", "South"],
            "training_topics": ["soil health", "post-harvest handling", "savings groups"]
        },
        "features": { "exports": true, "offline_sync": false }
    }))
}

/// Configuration served when nothing has ever been fetched. Enough for the
/// shell of the dashboard to render.
pub fn fallback_manifest() -> Manifest {
    as_manifest(json!({
        "app": { "name": "Extension Dashboard", "version": "0.0.0" },
        "navigation": [
            { "key": "dashboard", "label": "Dashboard", "path": "/" },
            { "key": "settings", "label": "Settings", "path": "/settings" }
        ],
        "options": {},
        "features": {}
    }))
}
