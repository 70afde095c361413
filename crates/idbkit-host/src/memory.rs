//! In-memory host engine
//!
//! Keeps only schema bookkeeping (version, object stores, indexes) per
//! database name. Used by tests and by embedders without persistence.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::engine::{
    HostDatabase, HostEngine, IndexParams, KeyPath, ObjectStoreParams, OpenOutcome,
    UpgradeTransaction, VersionChangeEvent,
};
use crate::error::HostError;
use crate::event::RequestErrorEvent;
use crate::Result;

#[derive(Debug, Clone)]
struct StoreSchema {
    params: ObjectStoreParams,
    indexes: BTreeMap<String, (KeyPath, IndexParams)>,
}

#[derive(Debug, Clone, Default)]
struct StoredDatabase {
    version: u32,
    stores: BTreeMap<String, StoreSchema>,
}

#[derive(Default)]
struct MemoryState {
    databases: HashMap<String, StoredDatabase>,
    live: HashMap<String, Vec<Weak<MemoryDatabase>>>,
    opens: HashMap<String, usize>,
}

impl MemoryState {
    fn has_live_connection(&mut self, name: &str) -> bool {
        match self.live.get_mut(name) {
            Some(connections) => {
                connections.retain(|c| c.upgrade().is_some_and(|db| !db.is_closed()));
                !connections.is_empty()
            }
            None => false,
        }
    }

    fn connect(&mut self, name: &str) -> Arc<MemoryDatabase> {
        let stored = self.databases.get(name).cloned().unwrap_or_default();
        let database = Arc::new(MemoryDatabase {
            name: name.to_string(),
            version: stored.version,
            stores: stored.stores.keys().cloned().collect(),
            closed: AtomicBool::new(false),
        });
        self.live
            .entry(name.to_string())
            .or_default()
            .push(Arc::downgrade(&database));
        database
    }
}

#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a database was already stored at `version` by an earlier session
    pub fn seed(&self, name: &str, version: u32, stores: &[&str]) {
        let stores = stores
            .iter()
            .map(|store| {
                (
                    store.to_string(),
                    StoreSchema {
                        params: ObjectStoreParams::default(),
                        indexes: BTreeMap::new(),
                    },
                )
            })
            .collect();

        self.state
            .lock()
            .databases
            .insert(name.to_string(), StoredDatabase { version, stores });
    }

    pub fn stored_version(&self, name: &str) -> Option<u32> {
        self.state.lock().databases.get(name).map(|db| db.version)
    }

    pub fn stored_stores(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(name)
            .map(|db| db.stores.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stored_indexes(&self, name: &str, store: &str) -> Vec<String> {
        self.state
            .lock()
            .databases
            .get(name)
            .and_then(|db| db.stores.get(store))
            .map(|schema| schema.indexes.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn stored_store_params(&self, name: &str, store: &str) -> Option<ObjectStoreParams> {
        self.state
            .lock()
            .databases
            .get(name)
            .and_then(|db| db.stores.get(store))
            .map(|schema| schema.params.clone())
    }

    /// Number of open requests received for `name`
    pub fn open_count(&self, name: &str) -> usize {
        self.state.lock().opens.get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl HostEngine for MemoryHost {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn open(&self, name: &str, version: u32) -> OpenOutcome {
        let mut state = self.state.lock();
        *state.opens.entry(name.to_string()).or_insert(0) += 1;

        if version == 0 {
            return OpenOutcome::Error(HostError::InvalidVersion(version).into());
        }

        let existing = state.databases.get(name).map(|db| db.version).unwrap_or(0);

        if version < existing {
            return OpenOutcome::Error(
                HostError::VersionTooLow {
                    requested: version,
                    existing,
                }
                .into(),
            );
        }

        if version == existing {
            return OpenOutcome::Success(state.connect(name));
        }

        if state.has_live_connection(name) {
            tracing::warn!(database = %name, "Open blocked by a live connection");
            return OpenOutcome::Blocked(RequestErrorEvent::blocked());
        }

        let working = state
            .databases
            .get(name)
            .map(|db| db.stores.clone())
            .unwrap_or_default();

        OpenOutcome::UpgradeNeeded(Box::new(MemoryUpgrade {
            state: Arc::clone(&self.state),
            event: VersionChangeEvent {
                database: name.to_string(),
                old_version: existing,
                new_version: version,
            },
            stores: working,
        }))
    }
}

struct MemoryUpgrade {
    state: Arc<Mutex<MemoryState>>,
    event: VersionChangeEvent,
    stores: BTreeMap<String, StoreSchema>,
}

#[async_trait]
impl UpgradeTransaction for MemoryUpgrade {
    fn event(&self) -> &VersionChangeEvent {
        &self.event
    }

    fn object_store_names(&self) -> Vec<String> {
        self.stores.keys().cloned().collect()
    }

    fn create_object_store(&mut self, name: &str, params: ObjectStoreParams) -> Result<()> {
        if self.stores.contains_key(name) {
            return Err(HostError::StoreExists(name.to_string()));
        }
        self.stores.insert(
            name.to_string(),
            StoreSchema {
                params,
                indexes: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn delete_object_store(&mut self, name: &str) -> Result<()> {
        self.stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| HostError::StoreNotFound(name.to_string()))
    }

    fn create_index(
        &mut self,
        store: &str,
        index: &str,
        key_path: KeyPath,
        params: IndexParams,
    ) -> Result<()> {
        let schema = self
            .stores
            .get_mut(store)
            .ok_or_else(|| HostError::StoreNotFound(store.to_string()))?;

        if schema.indexes.contains_key(index) {
            return Err(HostError::IndexExists {
                store: store.to_string(),
                index: index.to_string(),
            });
        }
        schema.indexes.insert(index.to_string(), (key_path, params));
        Ok(())
    }

    async fn commit(
        self: Box<Self>,
    ) -> std::result::Result<Arc<dyn HostDatabase>, RequestErrorEvent> {
        let MemoryUpgrade {
            state,
            event,
            stores,
        } = *self;

        let mut state = state.lock();
        state.databases.insert(
            event.database.clone(),
            StoredDatabase {
                version: event.new_version,
                stores,
            },
        );
        let database: Arc<dyn HostDatabase> = state.connect(&event.database);
        Ok(database)
    }

    fn abort(self: Box<Self>) {
        tracing::debug!(
            database = %self.event.database,
            version = self.event.new_version,
            "Upgrade transaction aborted"
        );
    }
}

struct MemoryDatabase {
    name: String,
    version: u32,
    stores: Vec<String>,
    closed: AtomicBool,
}

impl HostDatabase for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn object_store_names(&self) -> Vec<String> {
        self.stores.clone()
    }

    fn create_object_store(&self, name: &str, _params: &ObjectStoreParams) -> Result<()> {
        if self.is_closed() {
            return Err(HostError::Closed(self.name.clone()));
        }
        Err(HostError::InvalidState(format!(
            "cannot create object store '{}' outside a version change",
            name
        )))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
