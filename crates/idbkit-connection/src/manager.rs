//! Connection Manager
//!
//! Maps database names to their current connection handle. Lookup and
//! insert happen under one lock, so concurrent first requests for a name
//! still share a single handle.

use futures_util::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use idbkit_host::{HostEngine, OpenOutcome, VersionChangeEvent};
use idbkit_schema::{DatabaseConfig, SchemaRegistry};

use crate::error::{normalize_error, ConnectionError};
use crate::handle::{Connection, ConnectionHandle, HandleMap};
use crate::migration::{panic_message, run_migrations};
use crate::Result;

pub struct ConnectionManager {
    registry: SchemaRegistry,
    host: Arc<dyn HostEngine>,
    /// Current handle per database name
    handles: Arc<HandleMap>,
}

impl ConnectionManager {
    pub fn new(registry: SchemaRegistry, host: Arc<dyn HostEngine>) -> Self {
        Self {
            registry,
            host,
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Get the shared handle for `name` (or the default database),
    /// starting the open on first request.
    ///
    /// An existing handle is returned as is, including a failed one.
    pub fn open(&self, name: Option<&str>) -> Result<ConnectionHandle> {
        let name = self
            .registry
            .resolve_name(name)
            .ok_or(ConnectionError::MissingConnectionName)?;
        if name.trim().is_empty() {
            return Err(ConnectionError::EmptyConnectionName);
        }

        let handle = {
            let mut handles = self.handles.lock();
            if let Some(existing) = handles.get(&name) {
                return Ok(existing.clone());
            }

            let handle = self.create_handle(name.clone());
            handles.insert(name, handle.clone());
            handle
        };

        // Drive the open eagerly when a runtime is around; otherwise the
        // first awaiter drives it.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(handle.outcome());
        }

        Ok(handle)
    }

    /// Same caching as [`open`](Self::open)
    pub fn connect(&self, name: Option<&str>) -> Result<ConnectionHandle> {
        self.open(name)
    }

    /// Current handle for `name` without creating one
    pub fn handle(&self, name: &str) -> Option<ConnectionHandle> {
        self.handles.lock().get(name).cloned()
    }

    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handles.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop the cached handle for `name` so the next open starts over.
    /// A ready connection is closed. Returns whether a handle was removed.
    pub fn reset(&self, name: &str) -> bool {
        let removed = self.handles.lock().remove(name);

        match removed {
            Some(handle) => {
                if let Some(connection) = handle.connection() {
                    connection.close();
                }
                tracing::info!(
                    database = %name,
                    status = %handle.status(),
                    "Reset connection handle"
                );
                true
            }
            None => false,
        }
    }

    /// Close every ready connection and forget all handles
    pub fn close_all(&self) {
        let handles: Vec<ConnectionHandle> =
            self.handles.lock().drain().map(|(_, handle)| handle).collect();

        for handle in &handles {
            if let Some(connection) = handle.connection() {
                connection.close();
            }
        }

        if !handles.is_empty() {
            tracing::info!(count = handles.len(), "Closed all connection handles");
        }
    }

    fn create_handle(&self, name: String) -> ConnectionHandle {
        let config = self
            .registry
            .get(&name)
            .unwrap_or_else(|| Arc::new(DatabaseConfig::new(name.clone(), false)));
        let id = Uuid::new_v4();
        let upgrade = Arc::new(Mutex::new(None));

        let request = OpenRequest {
            id,
            name: name.clone(),
            config: Arc::clone(&config),
            host: Arc::clone(&self.host),
            upgrade: Arc::clone(&upgrade),
            handles: Arc::downgrade(&self.handles),
        };

        // A panic inside the open would poison the shared outcome
        let failed_name = name.clone();
        let open = AssertUnwindSafe(request.run())
            .catch_unwind()
            .map(move |outcome| {
                outcome.unwrap_or_else(|payload| {
                    let message = format!("open panicked: {}", panic_message(payload.as_ref()));
                    tracing::error!(database = %failed_name, error = %message, "Open failed");
                    Err(ConnectionError::failed(&failed_name, message))
                })
            })
            .boxed();

        ConnectionHandle::new(id, name, config, upgrade, open)
    }
}

impl Clone for ConnectionManager {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            host: Arc::clone(&self.host),
            handles: Arc::clone(&self.handles),
        }
    }
}

struct OpenRequest {
    id: Uuid,
    name: String,
    config: Arc<DatabaseConfig>,
    host: Arc<dyn HostEngine>,
    upgrade: Arc<Mutex<Option<VersionChangeEvent>>>,
    handles: Weak<HandleMap>,
}

impl OpenRequest {
    async fn run(self) -> Result<Connection> {
        let version = self.config.max_version().get();

        tracing::info!(
            database = %self.name,
            version,
            host = self.host.kind(),
            handle_id = %self.id,
            "Opening database"
        );

        let database = match self.host.open(&self.name, version).await {
            OpenOutcome::Success(database) => database,
            OpenOutcome::UpgradeNeeded(mut tx) => {
                let event = tx.event().clone();
                *self.upgrade.lock() = Some(event.clone());

                let migrated = run_migrations(&self.config, tx.as_mut());
                let report = match migrated {
                    Ok(report) => report,
                    Err(e) => {
                        tx.abort();
                        *self.upgrade.lock() = None;
                        tracing::error!(database = %self.name, error = %e, "Upgrade failed");
                        return Err(ConnectionError::failed(&self.name, e.to_string()));
                    }
                };

                let committed = tx.commit().await;
                *self.upgrade.lock() = None;

                match committed {
                    Ok(database) => {
                        tracing::info!(
                            database = %self.name,
                            old_version = event.old_version,
                            new_version = event.new_version,
                            callbacks = report.callbacks_run,
                            "Upgraded database"
                        );
                        database
                    }
                    Err(event) => {
                        let message = normalize_error(&event);
                        tracing::error!(
                            database = %self.name,
                            error = %message,
                            "Upgrade commit failed"
                        );
                        return Err(ConnectionError::failed(&self.name, message));
                    }
                }
            }
            OpenOutcome::Error(event) => {
                let message = normalize_error(&event);
                tracing::error!(
                    database = %self.name,
                    error = %message,
                    "Failed to open database"
                );
                return Err(ConnectionError::failed(&self.name, message));
            }
            OpenOutcome::Blocked(event) => {
                let message = normalize_error(&event);
                tracing::warn!(database = %self.name, error = %message, "Database open blocked");
                return Err(ConnectionError::failed(&self.name, message));
            }
        };

        tracing::info!(
            database = %self.name,
            version = database.version(),
            "Opened database"
        );

        Ok(Connection::new(self.id, self.name, database, self.handles))
    }
}
