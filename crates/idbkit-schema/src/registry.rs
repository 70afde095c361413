//! Schema Registry
//!
//! Name → configuration map plus the default database name.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::SchemaError;
use crate::Result;

#[derive(Default)]
pub struct SchemaRegistry {
    configs: Arc<RwLock<HashMap<String, Arc<DatabaseConfig>>>>,
    default_name: Arc<RwLock<Option<String>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the configuration for `name`, creating it on first use.
    ///
    /// The first database ever declared becomes the default, as does any
    /// database declared with `is_default`.
    pub fn declare(&self, name: &str, is_default: bool) -> Result<Arc<DatabaseConfig>> {
        if name.trim().is_empty() {
            return Err(SchemaError::InvalidArgument(
                "database name cannot be empty".to_string(),
            ));
        }

        let config = {
            let mut configs = self.configs.write();
            match configs.get(name) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let config = Arc::new(DatabaseConfig::new(name, false));
                    configs.insert(name.to_string(), Arc::clone(&config));
                    tracing::info!(database = %name, is_default, "Declared database");
                    config
                }
            }
        };

        let mut default_name = self.default_name.write();
        if (default_name.is_none() || is_default) && default_name.as_deref() != Some(name) {
            if let Some(previous) = default_name.as_deref().and_then(|n| self.get(n)) {
                previous.set_default(false);
            }
            config.set_default(true);
            tracing::debug!(database = %name, "Default database set");
            *default_name = Some(name.to_string());
        }

        Ok(config)
    }

    pub fn get(&self, name: &str) -> Option<Arc<DatabaseConfig>> {
        self.configs.read().get(name).cloned()
    }

    pub fn default_name(&self) -> Option<String> {
        self.default_name.read().clone()
    }

    /// Explicit name, else the default
    pub fn resolve_name(&self, name: Option<&str>) -> Option<String> {
        match name {
            Some(name) => Some(name.to_string()),
            None => self.default_name(),
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Clone for SchemaRegistry {
    fn clone(&self) -> Self {
        Self {
            configs: Arc::clone(&self.configs),
            default_name: Arc::clone(&self.default_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_is_idempotent() {
        let registry = SchemaRegistry::new();

        let first = registry.declare("shop", false).unwrap();
        let second = registry.declare("shop", false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        first
            .register_upgrade(2u32, |_, _| Ok(()))
            .unwrap();
        assert_eq!(second.max_version().get(), 2);
        assert_eq!(registry.names(), vec!["shop".to_string()]);
    }

    #[test]
    fn test_first_declared_is_default() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.default_name(), None);

        let shop = registry.declare("shop", false).unwrap();
        let audit = registry.declare("audit", false).unwrap();

        assert_eq!(registry.default_name().as_deref(), Some("shop"));
        assert!(shop.is_default());
        assert!(!audit.is_default());
        assert_eq!(registry.resolve_name(None).as_deref(), Some("shop"));
        assert_eq!(registry.resolve_name(Some("audit")).as_deref(), Some("audit"));
    }

    #[test]
    fn test_explicit_default_wins() {
        let registry = SchemaRegistry::new();
        let shop = registry.declare("shop", false).unwrap();
        let audit = registry.declare("audit", true).unwrap();

        assert_eq!(registry.default_name().as_deref(), Some("audit"));
        assert!(audit.is_default());
        assert!(!shop.is_default());

        // Re-declaring an existing name as default switches back
        registry.declare("shop", true).unwrap();
        assert_eq!(registry.default_name().as_deref(), Some("shop"));
        assert!(shop.is_default());
        assert!(!audit.is_default());

        // Only one configuration is ever the default
        let defaults: Vec<String> = registry
            .names()
            .into_iter()
            .filter(|n| registry.get(n).is_some_and(|c| c.is_default()))
            .collect();
        assert_eq!(defaults, vec!["shop".to_string()]);
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.declare("  ", false),
            Err(SchemaError::InvalidArgument(_))
        ));
        assert_eq!(registry.default_name(), None);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = SchemaRegistry::new();
        let clone = registry.clone();

        let config = clone.declare("shop", false).unwrap();
        assert!(Arc::ptr_eq(&config, &registry.get("shop").unwrap()));
        assert_eq!(registry.default_name().as_deref(), Some("shop"));
    }
}
