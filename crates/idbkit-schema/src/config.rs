//! Database configuration
//!
//! Holds the upgrade callbacks of one database keyed by version. The
//! version map is a `BTreeMap`, so its keys are the ascending, deduplicated
//! list of versions that have at least one callback.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use idbkit_host::{UpgradeTransaction, VersionChangeEvent};

use crate::version::{IntoSchemaVersion, SchemaVersion};
use crate::Result;

/// Migration step run inside the version-upgrade transaction
pub type UpgradeCallback =
    Arc<dyn Fn(&VersionChangeEvent, &mut dyn UpgradeTransaction) -> anyhow::Result<()> + Send + Sync>;

/// Callbacks registered for one version, in registration order
#[derive(Clone)]
pub struct UpgradeStep {
    pub version: SchemaVersion,
    pub callbacks: Vec<UpgradeCallback>,
}

impl fmt::Debug for UpgradeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpgradeStep")
            .field("version", &self.version)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[derive(Default)]
struct VersionTable {
    callbacks: BTreeMap<SchemaVersion, Vec<UpgradeCallback>>,
    max_version: SchemaVersion,
}

pub struct DatabaseConfig {
    name: String,
    is_default: AtomicBool,
    versions: RwLock<VersionTable>,
}

impl DatabaseConfig {
    /// Standalone configuration; use `SchemaRegistry::declare` to make it
    /// reachable by name.
    pub fn new(name: impl Into<String>, is_default: bool) -> Self {
        Self {
            name: name.into(),
            is_default: AtomicBool::new(is_default),
            versions: RwLock::new(VersionTable::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this database is selected when a caller omits a name
    pub fn is_default(&self) -> bool {
        self.is_default.load(Ordering::SeqCst)
    }

    pub(crate) fn set_default(&self, is_default: bool) {
        self.is_default.store(is_default, Ordering::SeqCst);
    }

    /// Register `callback` to run when the database is upgraded to `version`
    pub fn register_upgrade<V, F>(&self, version: V, callback: F) -> Result<&Self>
    where
        V: IntoSchemaVersion,
        F: Fn(&VersionChangeEvent, &mut dyn UpgradeTransaction) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        let version = version.into_schema_version()?;

        let mut table = self.versions.write();
        table
            .callbacks
            .entry(version)
            .or_default()
            .push(Arc::new(callback));
        table.max_version = table.max_version.max(version);

        tracing::debug!(
            database = %self.name,
            version = version.get(),
            "Registered upgrade callback"
        );

        Ok(self)
    }

    /// Highest registered version, 1 when nothing is registered
    pub fn max_version(&self) -> SchemaVersion {
        self.versions.read().max_version
    }

    /// Versions with at least one callback, ascending
    pub fn ordered_version_numbers(&self) -> Vec<SchemaVersion> {
        self.versions.read().callbacks.keys().copied().collect()
    }

    pub fn callback_count(&self, version: SchemaVersion) -> usize {
        self.versions
            .read()
            .callbacks
            .get(&version)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Steps for every version strictly newer than `old_version`, ascending
    pub fn steps_after(&self, old_version: u32) -> Vec<UpgradeStep> {
        self.versions
            .read()
            .callbacks
            .iter()
            .filter(|(version, _)| version.get() > old_version)
            .map(|(version, callbacks)| UpgradeStep {
                version: *version,
                callbacks: callbacks.clone(),
            })
            .collect()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("name", &self.name)
            .field("is_default", &self.is_default())
            .field("ordered_version_numbers", &self.ordered_version_numbers())
            .field("max_version", &self.max_version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &VersionChangeEvent, _: &mut dyn UpgradeTransaction) -> anyhow::Result<()> {
        Ok(())
    }

    fn versions(config: &DatabaseConfig) -> Vec<u32> {
        config
            .ordered_version_numbers()
            .into_iter()
            .map(SchemaVersion::get)
            .collect()
    }

    #[test]
    fn test_empty_config_defaults_to_version_one() {
        let config = DatabaseConfig::new("shop", false);
        assert_eq!(config.max_version().get(), 1);
        assert!(config.ordered_version_numbers().is_empty());
        assert!(config.steps_after(0).is_empty());
    }

    #[test]
    fn test_versions_sorted_and_deduplicated() {
        let config = DatabaseConfig::new("shop", false);
        for version in [5u32, 2, 9, 2, 5, 1] {
            config.register_upgrade(version, noop).unwrap();
        }

        assert_eq!(versions(&config), vec![1, 2, 5, 9]);
        assert_eq!(config.max_version().get(), 9);
        assert_eq!(config.callback_count(SchemaVersion::new(2).unwrap()), 2);
        assert_eq!(config.callback_count(SchemaVersion::new(3).unwrap()), 0);
    }

    #[test]
    fn test_invalid_version_leaves_config_untouched() {
        let config = DatabaseConfig::new("shop", false);
        config.register_upgrade(3u32, noop).unwrap();

        assert!(config.register_upgrade(0u32, noop).is_err());
        assert!(config.register_upgrade("three", noop).is_err());
        assert!(config.register_upgrade(-4i64, noop).is_err());

        assert_eq!(versions(&config), vec![3]);
        assert_eq!(config.max_version().get(), 3);
    }

    #[test]
    fn test_register_accepts_numeric_text() {
        let config = DatabaseConfig::new("shop", false);
        config
            .register_upgrade("4", noop)
            .unwrap()
            .register_upgrade(2u32, noop)
            .unwrap();

        assert_eq!(versions(&config), vec![2, 4]);
    }

    #[test]
    fn test_steps_after_skips_applied_versions() {
        let config = DatabaseConfig::new("shop", false);
        for version in [1u32, 2, 3, 4, 5] {
            config.register_upgrade(version, noop).unwrap();
        }
        config.register_upgrade(3u32, noop).unwrap();

        let steps = config.steps_after(2);
        let numbers: Vec<u32> = steps.iter().map(|s| s.version.get()).collect();
        assert_eq!(numbers, vec![3, 4, 5]);
        assert_eq!(steps[0].callbacks.len(), 2);

        assert!(config.steps_after(5).is_empty());
    }
}
