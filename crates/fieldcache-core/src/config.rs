//! Application settings.
//!
//! This module handles loading and saving the tunables of the store: the
//! configuration-cache TTL, the simulated latency bands, the storage
//! namespace and location, and the session lifetime.
//!
//! Settings are stored at `~/.config/fieldcache/config.json`. A missing file
//! yields the defaults; missing fields inside the file also fall back to
//! their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config directory paths
const APP_NAME: &str = "fieldcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Configuration snapshots older than this are refreshed before use.
const DEFAULT_CONFIG_TTL_SECS: u64 = 5 * 60;

/// Minted credentials stay valid for a day.
const DEFAULT_SESSION_TTL_MINUTES: i64 = 24 * 60;

/// Longest session lifetime accepted from the settings file (ten years)
const MAX_SESSION_TTL_MINUTES: i64 = 10 * 366 * 24 * 60;

/// Inclusive millisecond range a simulated delay is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyBand {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl LatencyBand {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// Band with `min <= max` guaranteed.
    pub fn normalized(self) -> Self {
        if self.min_ms <= self.max_ms {
            self
        } else {
            Self::new(self.max_ms, self.min_ms)
        }
    }
}

/// Where the session credential is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialBackend {
    /// Same backend as the resource collections
    #[default]
    Storage,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix for every persisted key
    pub namespace: String,
    /// Directory for file-backed storage; platform data dir when unset
    pub data_dir: Option<PathBuf>,
    pub config_ttl_secs: u64,
    /// Delay every resource and manifest operation to mimic a network
    pub simulate_latency: bool,
    pub read_latency_ms: LatencyBand,
    pub write_latency_ms: LatencyBand,
    pub session_ttl_minutes: i64,
    /// Field of a `users` record matched against the login identifier
    pub identifier_field: String,
    /// Per-collection fields searched by `list`; all scalar fields when absent
    pub search_fields: HashMap<String, Vec<String>>,
    pub credential_backend: CredentialBackend,
    /// Read the manifest from this file instead of the built-in one
    pub manifest_path: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut search_fields = HashMap::new();
        search_fields.insert(
            "users".to_string(),
            vec!["name".to_string(), "email".to_string(), "role".to_string()],
        );
        search_fields.insert(
            "members".to_string(),
            vec!["name".to_string(), "village".to_string(), "group".to_string()],
        );

        Self {
            namespace: APP_NAME.to_string(),
            data_dir: None,
            config_ttl_secs: DEFAULT_CONFIG_TTL_SECS,
            simulate_latency: cfg!(debug_assertions),
            read_latency_ms: LatencyBand::new(200, 800),
            write_latency_ms: LatencyBand::new(300, 1000),
            session_ttl_minutes: DEFAULT_SESSION_TTL_MINUTES,
            identifier_field: "email".to_string(),
            search_fields,
            credential_backend: CredentialBackend::default(),
            manifest_path: None,
            log_dir: None,
        }
    }
}

impl Settings {
    /// Load settings from the user config directory
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse settings: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn config_ttl(&self) -> Duration {
        Duration::from_secs(self.config_ttl_secs)
    }

    /// Session lifetime clamped to between one minute and ten years.
    pub fn session_ttl(&self) -> chrono::Duration {
        let minutes = self.session_ttl_minutes.clamp(1, MAX_SESSION_TTL_MINUTES);
        chrono::Duration::try_minutes(minutes).unwrap_or_else(|| chrono::Duration::days(1))
    }

    pub fn search_fields_for(&self, collection: &str) -> Option<&[String]> {
        self.search_fields.get(collection).map(|f| f.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.namespace, "fieldcache");
        assert_eq!(settings.config_ttl(), Duration::from_secs(300));
        assert_eq!(settings.read_latency_ms, LatencyBand::new(200, 800));
        assert_eq!(settings.write_latency_ms, LatencyBand::new(300, 1000));
        assert_eq!(settings.identifier_field, "email");
        assert_eq!(settings.search_fields_for("members").map(|f| f.len()), Some(3));
        assert_eq!(settings.search_fields_for("trainings"), None);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"config_ttl_secs": 60, "credential_backend": "keyring"}"#).unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.config_ttl_secs, 60);
        assert_eq!(settings.credential_backend, CredentialBackend::Keyring);
        assert_eq!(settings.namespace, "fieldcache");
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings.session_ttl_minutes, 24 * 60);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let mut settings = Settings::default();
        settings.namespace = "demo".to_string();
        settings.save_to(&path).unwrap();

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.namespace, "demo");
    }

    #[test]
    fn test_session_ttl_is_clamped() {
        let mut settings = Settings::default();
        assert_eq!(settings.session_ttl(), chrono::Duration::hours(24));

        settings.session_ttl_minutes = 1_000_000_000_000;
        assert_eq!(
            settings.session_ttl(),
            chrono::Duration::minutes(MAX_SESSION_TTL_MINUTES)
        );

        settings.session_ttl_minutes = i64::MIN;
        assert_eq!(settings.session_ttl(), chrono::Duration::minutes(1));
    }

    #[test]
    fn test_latency_band_normalized() {
        assert_eq!(LatencyBand::new(900, 100).normalized(), LatencyBand::new(100, 900));
    }
}
