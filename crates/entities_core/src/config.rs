//! Store configuration.
//!
//! # Responsibility
//! - Describe where the entities database lives and how logging is set up.
//! - Load settings from JSON with environment variable overrides.
//!
//! # Invariants
//! - Missing JSON fields fall back to defaults.
//! - Environment overrides win over JSON values.

use crate::db::{open_db_in_memory, open_db_with_timeout, DbResult, DEFAULT_BUSY_TIMEOUT};
use crate::logging::default_log_level;
use rusqlite::Connection;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DB_PATH: &str = "ENTITIES_DB_PATH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "ENTITIES_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "ENTITIES_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "ENTITIES_LOG_DIR";

/// Errors raised while loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    InvalidValue { key: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::InvalidValue { .. } => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Settings for opening the store and initializing logs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file. `None` means an in-memory store.
    pub database_path: Option<PathBuf>,
    pub busy_timeout_ms: u64,
    pub log_level: String,
    /// Absolute log directory. `None` leaves logging uninitialized.
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT.as_millis() as u64,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// Parses a JSON document; absent fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Applies `ENTITIES_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary lookup; empty values are ignored.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(path) = read(ENV_DB_PATH) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(value) = read(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = value.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_BUSY_TIMEOUT_MS,
                value: value.clone(),
            })?;
        }
        if let Some(level) = read(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(dir) = read(ENV_LOG_DIR) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        Ok(self)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Opens the configured database with migrations applied.
    pub fn open_db(&self) -> DbResult<Connection> {
        match &self.database_path {
            Some(path) => open_db_with_timeout(path, self.busy_timeout()),
            None => open_db_in_memory(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, ENV_BUSY_TIMEOUT_MS, ENV_DB_PATH};
    use std::collections::HashMap;
    use std::path::PathBuf;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = StoreConfig::from_json_str(r#"{"database_path": "/tmp/entities.db"}"#)
            .expect("partial config should parse");
        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/tmp/entities.db"))
        );
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn overrides_win_and_blank_values_are_ignored() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DB_PATH, "/data/override.db"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
            ("ENTITIES_LOG_DIR", "  "),
        ]);
        let config = StoreConfig::default()
            .with_overrides(|key| env.get(key).map(|value| value.to_string()))
            .expect("overrides should apply");

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/data/override.db"))
        );
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        let err = StoreConfig::default()
            .with_overrides(|key| (key == ENV_BUSY_TIMEOUT_MS).then(|| "soon".to_string()))
            .expect_err("timeout must be numeric");
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: ENV_BUSY_TIMEOUT_MS,
                ..
            }
        ));
    }

    #[test]
    fn unknown_json_is_a_parse_error() {
        let err = StoreConfig::from_json_str("{not json").expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
