use std::{
    fs,
    path::{Path, PathBuf}
};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use crate::{
    adapter::storage::StoreType,
    domain::{constant::config, error::WorkflowError}
};

/// Overrides the per-user configuration directory
pub const CONFIG_DIR_ENV: &str = "HRFLOW_CONFIG_DIR";

const CONFIG_FILE: &str = "config.yaml";

/// Persisted settings, stored as `config.yaml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Storage backend
    pub storage:       StoreType,
    /// RocksDB directory; defaults to `rocksdb/` under the config dir
    pub database_path: Option<PathBuf>,
    /// Default tracing filter, overridden by RUST_LOG
    pub log_level:     String
}

impl Default for Settings {
    fn default() -> Self {
        Self { storage: StoreType::RocksDb, database_path: None, log_level: "info".to_string() }
    }
}

/// Application configuration for storage and runtime settings
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Base configuration directory
    pub config_dir: PathBuf,
    pub settings:   Settings
}

impl AppConfig {
    /// Resolve the config directory and load its settings
    pub fn init() -> Result<Self, WorkflowError> {
        let config_dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("org", "hrflow", "hrflow")
                .map(|dirs| dirs.config_dir().to_path_buf())
                .ok_or_else(|| WorkflowError::FileSystem("Failed to determine project directories".to_string()))?
        };
        Ok(Self::load_from(config_dir)?)
    }

    /// Load settings from `config_dir`, falling back to defaults when no file exists
    pub fn load_from(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        let config_path = config_dir.join(CONFIG_FILE);

        let settings = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            let settings: Settings = serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
            event!(Level::DEBUG, event = config::CONFIG_LOADED, path = %config_path.display(), storage = settings.storage.as_str());
            settings
        } else {
            event!(Level::DEBUG, event = config::CONFIG_DEFAULTED, path = %config_path.display());
            Settings::default()
        };

        Ok(Self { config_dir, settings })
    }

    pub fn config_path(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    pub fn database_path(&self) -> PathBuf {
        self.settings.database_path.clone().unwrap_or_else(|| self.config_dir.join("rocksdb"))
    }

    pub fn storage(&self) -> StoreType {
        self.settings.storage
    }

    /// Persist the current settings
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.config_dir)
            .with_context(|| format!("Failed to create config directory {}", self.config_dir.display()))?;

        let content = serde_yaml::to_string(&self.settings).context("Failed to serialize config")?;
        let config_path = self.config_path();
        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file {}", config_path.display()))?;

        event!(Level::DEBUG, event = config::CONFIG_SAVED, path = %config_path.display());
        Ok(())
    }

    /// Set the storage backend and persist it
    pub fn set_storage(&mut self, storage: StoreType) -> Result<(), WorkflowError> {
        self.settings.storage = storage;
        Ok(self.save()?)
    }

    /// Create the config directory (and the database parent) if missing
    pub fn ensure_dirs_exist(&self) -> Result<(), WorkflowError> {
        fs::create_dir_all(&self.config_dir)?;
        if let Some(parent) = self.database_path().parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        Ok(())
    }
}

fn ensure_dir(path: &Path) -> Result<(), WorkflowError> {
    fs::create_dir_all(path).map_err(|e| WorkflowError::FileSystem(format!("Failed to create {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.settings, Settings::default());
        assert_eq!(config.database_path(), dir.path().join("rocksdb"));
        assert!(!config.config_path().exists());
    }

    #[test]
    fn settings_round_trip_through_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::load_from(dir.path()).unwrap();
        config.settings.log_level = "debug".to_string();
        config.set_storage(StoreType::InMemory).unwrap();

        let reloaded = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(reloaded.storage(), StoreType::InMemory);
        assert_eq!(reloaded.settings.log_level, "debug");

        let raw = fs::read_to_string(reloaded.config_path()).unwrap();
        assert!(raw.contains("storage: inmemory"));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "database_path: /var/lib/hrflow\n").unwrap();

        let config = AppConfig::load_from(dir.path()).unwrap();
        assert_eq!(config.storage(), StoreType::RocksDb);
        assert_eq!(config.database_path(), PathBuf::from("/var/lib/hrflow"));
        assert_eq!(config.settings.log_level, "info");
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE), "storage: [unclosed").unwrap();

        let err: WorkflowError = AppConfig::load_from(dir.path()).unwrap_err().into();
        assert!(matches!(err, WorkflowError::Configuration(message) if message.contains("Failed to parse config file")));
    }
}
