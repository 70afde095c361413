//! idbkit configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CoreError;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Schema bookkeeping in process memory, nothing persisted
    #[default]
    Memory,
    /// One SQLite file per database under `data_dir`
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host engine backing the connections
    pub backend: Backend,
    /// Directory holding SQLite database files
    pub data_dir: PathBuf,
    /// Database declared as the default on startup
    pub default_database: Option<String>,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            backend: Backend::Memory,
            data_dir,
            default_database: None,
        }
    }

    pub fn sqlite(data_dir: PathBuf) -> Self {
        Self {
            backend: Backend::Sqlite,
            ..Self::new(data_dir)
        }
    }

    /// Platform local data directory joined with `idbkit`
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|d| d.join("idbkit"))
            .unwrap_or_else(|| PathBuf::from(".idbkit"))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(name) = &self.default_database {
            if name.trim().is_empty() {
                return Err(CoreError::Config(
                    "default_database cannot be empty".to_string(),
                ));
            }
        }

        if self.backend == Backend::Sqlite && self.data_dir.as_os_str().is_empty() {
            return Err(CoreError::Config(
                "data_dir is required for the sqlite backend".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Self::data_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_memory() {
        let config = Config::default();
        assert_eq!(config.backend, Backend::Memory);
        assert!(config.default_database.is_none());
        assert!(config.data_dir.ends_with("idbkit") || config.data_dir.ends_with(".idbkit"));
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json_str(
            r#"{"backend": "sqlite", "data_dir": "/var/lib/app", "default_database": "shop"}"#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/app"));
        assert_eq!(config.default_database.as_deref(), Some("shop"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(r#"{"default_database": "shop"}"#).unwrap();
        assert_eq!(config.backend, Backend::Memory);
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Config::from_json_str(r#"{"default_database": " "}"#),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"backend": "sqlite", "data_dir": ""}"#),
            Err(CoreError::Config(_))
        ));
        assert!(matches!(
            Config::from_json_str(r#"{"backend": "redis"}"#),
            Err(CoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idbkit.json");
        std::fs::write(&path, r#"{"backend": "memory"}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.backend, Backend::Memory);

        assert!(matches!(
            Config::load(dir.path().join("missing.json")),
            Err(CoreError::Io(_))
        ));
    }
}
