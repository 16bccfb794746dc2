//! Store configuration.
//!
//! Loaded from TOML, with `ORDO_*` environment variables layered on top:
//!
//! ```toml
//! database = "/var/lib/ordo/records.db"   # or ":memory:"
//! busy_timeout_ms = 5000
//! id_mode = "precise"                     # "standard" (default) or "precise"
//! wal = true
//! foreign_keys = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use ordo_types::IdMode;

/// Path value selecting an in-memory database.
pub const IN_MEMORY: &str = ":memory:";

pub const ENV_DATABASE: &str = "ORDO_DATABASE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "ORDO_BUSY_TIMEOUT_MS";
pub const ENV_ID_MODE: &str = "ORDO_ID_MODE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file, or `:memory:`.
    pub database: PathBuf,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
    /// Mode for entity and audit-entry identities.
    pub id_mode: IdMode,
    /// Write-ahead logging for file databases.
    pub wal: bool,
    /// Enforce foreign keys on every connection.
    pub foreign_keys: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("ordo.db"),
            busy_timeout_ms: 5000,
            id_mode: IdMode::Standard,
            wal: true,
            foreign_keys: true,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            database: PathBuf::from(IN_MEMORY),
            ..Self::default()
        }
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            database: path.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.database.as_os_str() == IN_MEMORY
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Read a TOML file. Missing keys take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env(|var| std::env::var(var).ok())
    }

    /// Overlay `ORDO_*` values supplied by `lookup`.
    pub fn with_env(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database = PathBuf::from(db);
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                var: ENV_BUSY_TIMEOUT_MS,
                value: value.clone(),
            })?;
        }
        if let Some(value) = lookup(ENV_ID_MODE) {
            self.id_mode = IdMode::from_str(value.trim()).ok_or_else(|| ConfigError::InvalidEnv {
                var: ENV_ID_MODE,
                value: value.clone(),
            })?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.id_mode, IdMode::Standard);
        assert!(config.wal);
        assert!(config.foreign_keys);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str("id_mode = \"precise\"\n").unwrap();
        assert_eq!(config.id_mode, IdMode::Precise);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.database, PathBuf::from("ordo.db"));
    }

    #[test]
    fn test_bad_toml() {
        let err = StoreConfig::from_toml_str("id_mode = \"counter\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordo.toml");
        let text = "database = \":memory:\"\n\
                    busy_timeout_ms = 250\n\
                    wal = false\n\
                    foreign_keys = false\n";
        std::fs::write(&path, text).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.busy_timeout_ms, 250);
        assert!(!config.wal);
        assert!(!config.foreign_keys);
    }

    #[test]
    fn test_load_missing_file() {
        let err = StoreConfig::load("/nonexistent/ordo.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_env_overlay() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DATABASE, "/tmp/records.db"),
            (ENV_BUSY_TIMEOUT_MS, " 900 "),
            (ENV_ID_MODE, "Precise"),
        ]);
        let config = StoreConfig::default()
            .with_env(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.database, PathBuf::from("/tmp/records.db"));
        assert_eq!(config.busy_timeout_ms, 900);
        assert_eq!(config.id_mode, IdMode::Precise);
    }

    #[test]
    fn test_env_rejects_bad_values() {
        let err = StoreConfig::default()
            .with_env(|var| (var == ENV_ID_MODE).then(|| "counter".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_ID_MODE, .. }));

        let err = StoreConfig::default()
            .with_env(|var| (var == ENV_BUSY_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var: ENV_BUSY_TIMEOUT_MS, .. }));
    }
}
