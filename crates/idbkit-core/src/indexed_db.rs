//! Caller-facing database provider
//!
//! Owns one schema registry and one connection manager. Declarations are
//! expected during setup; connections are requested afterwards.

use std::sync::Arc;

use idbkit_connection::{ConnectionHandle, ConnectionManager};
use idbkit_host::{HostEngine, MemoryHost, SqliteHost};
use idbkit_schema::{DatabaseConfig, SchemaRegistry};

use crate::config::{Backend, Config};
use crate::Result;

pub struct IndexedDb {
    /// Configuration
    config: Config,
    /// Database declarations and upgrade callbacks
    registry: SchemaRegistry,
    /// Shared connection handles
    connections: ConnectionManager,
}

impl IndexedDb {
    /// Build a provider with the host engine selected by `config`
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let host: Arc<dyn HostEngine> = match config.backend {
            Backend::Memory => Arc::new(MemoryHost::new()),
            Backend::Sqlite => {
                std::fs::create_dir_all(&config.data_dir)?;
                Arc::new(SqliteHost::new(&config.data_dir))
            }
        };

        Self::with_host(config, host)
    }

    /// Build a provider on an explicit host engine
    pub fn with_host(config: Config, host: Arc<dyn HostEngine>) -> Result<Self> {
        let registry = SchemaRegistry::new();

        if let Some(name) = &config.default_database {
            registry.declare(name, true)?;
        }

        tracing::info!(
            host = host.kind(),
            default_database = ?config.default_database,
            "Initialized database provider"
        );

        let connections = ConnectionManager::new(registry.clone(), host);

        Ok(Self {
            config,
            registry,
            connections,
        })
    }

    /// Register or fetch the configuration of a named database
    pub fn declare_connection(
        &self,
        name: &str,
        is_default: bool,
    ) -> Result<Arc<DatabaseConfig>> {
        Ok(self.registry.declare(name, is_default)?)
    }

    /// Shared handle for `name`, or the default database when `None`
    pub fn open_connection(&self, name: Option<&str>) -> Result<ConnectionHandle> {
        Ok(self.connections.open(name)?)
    }

    /// Explicit creation path; returns the cached handle when one exists
    pub fn create_connection(&self, name: Option<&str>) -> Result<ConnectionHandle> {
        Ok(self.connections.connect(name)?)
    }

    /// Forget the cached handle for `name`, closing it if ready
    pub fn reset_connection(&self, name: &str) -> bool {
        self.connections.reset(name)
    }

    /// Close every connection
    pub fn shutdown(&self) {
        self.connections.close_all();
        tracing::info!("Database provider shut down");
    }

    pub fn default_connection_name(&self) -> Option<String> {
        self.registry.default_name()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Clone for IndexedDb {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            connections: self.connections.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use idbkit_connection::{ConnectionError, HandleStatus};
    use idbkit_host::{IndexParams, KeyPath, ObjectStoreParams};
    use parking_lot::Mutex;

    fn memory_db() -> (IndexedDb, MemoryHost) {
        let host = MemoryHost::new();
        let db = IndexedDb::with_host(Config::default(), Arc::new(host.clone())).unwrap();
        (db, host)
    }

    #[tokio::test]
    async fn test_declare_and_open() {
        let (db, host) = memory_db();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let shop = db.declare_connection("shop", false).unwrap();
        let again = db.declare_connection("shop", false).unwrap();
        assert!(Arc::ptr_eq(&shop, &again));

        let log = Arc::clone(&calls);
        shop.register_upgrade(1u32, move |_, tx| {
            log.lock().push(1);
            let mut params = ObjectStoreParams::new();
            params.key_path(Some(KeyPath::new_single("id")));
            tx.create_object_store("products", params)?;
            Ok(())
        })
        .unwrap();
        let log = Arc::clone(&calls);
        again
            .register_upgrade(2u32, move |_, tx| {
                log.lock().push(2);
                tx.create_index(
                    "products",
                    "by_sku",
                    KeyPath::new_single("sku"),
                    IndexParams::new().unique(true).clone(),
                )?;
                Ok(())
            })
            .unwrap();

        let handle = db.open_connection(None).unwrap();
        let connection = handle.wait().await.unwrap();

        assert_eq!(*calls.lock(), vec![1, 2]);
        assert_eq!(connection.name(), "shop");
        assert_eq!(connection.version(), 2);
        assert_eq!(connection.object_store_names(), vec!["products".to_string()]);
        assert_eq!(host.stored_indexes("shop", "products"), vec!["by_sku".to_string()]);

        let created = db.create_connection(Some("shop")).unwrap();
        assert!(ConnectionHandle::ptr_eq(&handle, &created));
        assert_eq!(created.status(), HandleStatus::Ready);
    }

    #[test]
    fn test_missing_default() {
        let (db, _) = memory_db();

        assert!(matches!(
            db.open_connection(None),
            Err(CoreError::Connection(ConnectionError::MissingConnectionName))
        ));
        assert!(matches!(
            db.create_connection(None),
            Err(CoreError::Connection(ConnectionError::MissingConnectionName))
        ));
    }

    #[test]
    fn test_invalid_upgrade_version() {
        let (db, _) = memory_db();
        let shop = db.declare_connection("shop", false).unwrap();

        let err = shop.register_upgrade("v2", |_, _| Ok(())).unwrap_err();
        assert!(err.to_string().contains("should be a number"));
        assert_eq!(shop.max_version().get(), 1);
    }

    #[tokio::test]
    async fn test_default_database_from_config() {
        let mut config = Config::default();
        config.default_database = Some("audit".to_string());
        let db = IndexedDb::new(config).unwrap();

        db.declare_connection("shop", false).unwrap();
        assert_eq!(db.default_connection_name().as_deref(), Some("audit"));

        let connection = db.open_connection(None).unwrap().await.unwrap();
        assert_eq!(connection.name(), "audit");
    }

    #[tokio::test]
    async fn test_reset_and_shutdown() {
        let (db, _) = memory_db();
        db.declare_connection("shop", true).unwrap();

        let first = db.open_connection(None).unwrap().await.unwrap();
        assert!(db.reset_connection("shop"));
        assert!(first.is_closed());

        let second = db.open_connection(None).unwrap().await.unwrap();
        db.shutdown();
        assert!(second.is_closed());
        assert!(db.connections().cached_names().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_backend_persists_versions() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));

        let declare = |db: &IndexedDb, calls: &Arc<Mutex<Vec<u32>>>| {
            let shop = db.declare_connection("shop", false).unwrap();
            for version in [1u32, 2] {
                let log = Arc::clone(calls);
                shop.register_upgrade(version, move |_, tx| {
                    log.lock().push(version);
                    if version == 1 {
                        tx.create_object_store("orders", ObjectStoreParams::new())?;
                    }
                    Ok(())
                })
                .unwrap();
            }
        };

        let db = IndexedDb::new(Config::sqlite(dir.path().to_path_buf())).unwrap();
        declare(&db, &calls);
        let connection = db.open_connection(None).unwrap().await.unwrap();
        assert_eq!(connection.version(), 2);
        assert_eq!(connection.object_store_names(), vec!["orders".to_string()]);
        db.shutdown();

        // A fresh provider on the same directory sees version 2 on disk
        let reopened = IndexedDb::new(Config::sqlite(dir.path().to_path_buf())).unwrap();
        declare(&reopened, &calls);
        let connection = reopened.open_connection(None).unwrap().await.unwrap();
        assert_eq!(connection.version(), 2);
        assert_eq!(*calls.lock(), vec![1, 2]);
        reopened.shutdown();
    }
}
