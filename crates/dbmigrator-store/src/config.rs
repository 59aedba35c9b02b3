//! Store configuration
//!
//! Read from an optional TOML file (section `[store]`) overlaid by
//! `DBMIGRATOR__STORE__*` environment variables. Missing values fall back
//! to defaults.

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::errors::{config_error, Result};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_FILE: &str = "config/dbmigrator.toml";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "DBMIGRATOR";

/// SQLite journal mode applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    #[default]
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file
    pub path: PathBuf,
    /// How long a connection waits on a locked database
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("dbmigrator.db"),
            busy_timeout_ms: 5_000,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Load from [`DEFAULT_CONFIG_FILE`] and the environment
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a source exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    /// Load from `file` (optional) and the environment
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if a source exists but cannot be parsed.
    pub fn load_from(file: impl AsRef<Path>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(file.as_ref()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        match settings.get::<StoreConfig>("store") {
            Ok(cfg) => {
                tracing::debug!(path = %cfg.path.display(), "loaded store configuration");
                Ok(cfg)
            }
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(err) => Err(config_error(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbmigrator_core::errors::ErrorKind;
    use std::io::Write;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StoreConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, StoreConfig::default());
    }

    #[test]
    fn test_file_section_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbmigrator.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[store]\npath = \"app.db\"\njournal_mode = \"delete\"").unwrap();

        let cfg = StoreConfig::load_from(&path).unwrap();
        assert_eq!(cfg.path, PathBuf::from("app.db"));
        assert_eq!(cfg.journal_mode, JournalMode::Delete);
        assert_eq!(cfg.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_bad_value_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbmigrator.toml");
        std::fs::write(&path, "[store]\njournal_mode = \"sideways\"\n").unwrap();

        let err = StoreConfig::load_from(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
