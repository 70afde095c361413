//! Connection handles
//!
//! ```text
//! Pending
//!   ↓ upgradeneeded
//! Upgrading
//!   ↓ success        ↘ error / blocked
//! Ready              Failed
//! ```
//!
//! `Ready` and `Failed` are terminal. The outcome is a shared future, so
//! every clone of a handle observes the same resolved value.

use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::IntoFuture;
use std::sync::{Arc, Weak};
use uuid::Uuid;

use idbkit_host::{HostDatabase, ObjectStoreParams, VersionChangeEvent};
use idbkit_schema::DatabaseConfig;

use crate::error::ConnectionError;
use crate::Result;

pub(crate) type HandleMap = Mutex<HashMap<String, ConnectionHandle>>;
pub(crate) type OpenFuture = BoxFuture<'static, Result<Connection>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleStatus {
    /// Waiting for the host engine
    Pending,
    /// Upgrade callbacks are running on the version change
    Upgrading { old_version: u32, new_version: u32 },
    /// Opened and fully upgraded
    Ready,
    /// Open or upgrade failed; stays cached until reset
    Failed,
}

impl HandleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandleStatus::Ready | HandleStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HandleStatus::Pending => "pending",
            HandleStatus::Upgrading { .. } => "upgrading",
            HandleStatus::Ready => "ready",
            HandleStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for HandleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

struct HandleInner {
    id: Uuid,
    name: String,
    config: Arc<DatabaseConfig>,
    upgrade: Arc<Mutex<Option<VersionChangeEvent>>>,
    outcome: Shared<OpenFuture>,
}

/// Shared, resolve-once handle to a database open
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<HandleInner>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        id: Uuid,
        name: String,
        config: Arc<DatabaseConfig>,
        upgrade: Arc<Mutex<Option<VersionChangeEvent>>>,
        open: OpenFuture,
    ) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id,
                name,
                config,
                upgrade,
                outcome: futures_util::FutureExt::shared(open),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration the database is opened against
    pub fn config(&self) -> &Arc<DatabaseConfig> {
        &self.inner.config
    }

    pub fn status(&self) -> HandleStatus {
        match self.inner.outcome.peek() {
            Some(Ok(_)) => HandleStatus::Ready,
            Some(Err(_)) => HandleStatus::Failed,
            None => match self.inner.upgrade.lock().as_ref() {
                Some(event) => HandleStatus::Upgrading {
                    old_version: event.old_version,
                    new_version: event.new_version,
                },
                None => HandleStatus::Pending,
            },
        }
    }

    /// The resolved connection, if the handle is ready
    pub fn connection(&self) -> Option<Connection> {
        match self.inner.outcome.peek() {
            Some(Ok(connection)) => Some(connection.clone()),
            _ => None,
        }
    }

    /// The failure, if the handle has failed
    pub fn error(&self) -> Option<ConnectionError> {
        match self.inner.outcome.peek() {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Wait for the open to finish
    pub async fn wait(&self) -> Result<Connection> {
        self.inner.outcome.clone().await
    }

    /// Whether both values refer to the same handle
    pub fn ptr_eq(a: &ConnectionHandle, b: &ConnectionHandle) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn outcome(&self) -> Shared<OpenFuture> {
        self.inner.outcome.clone()
    }
}

impl IntoFuture for ConnectionHandle {
    type Output = Result<Connection>;
    type IntoFuture = Shared<OpenFuture>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome()
    }
}

impl IntoFuture for &ConnectionHandle {
    type Output = Result<Connection>;
    type IntoFuture = Shared<OpenFuture>;

    fn into_future(self) -> Self::IntoFuture {
        self.outcome()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .finish()
    }
}

struct ConnectionInner {
    handle_id: Uuid,
    name: String,
    database: Arc<dyn HostDatabase>,
    opened_at: DateTime<Utc>,
    handles: Weak<HandleMap>,
}

/// An opened, fully upgraded database
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(
        handle_id: Uuid,
        name: String,
        database: Arc<dyn HostDatabase>,
        handles: Weak<HandleMap>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                handle_id,
                name,
                database,
                opened_at: Utc::now(),
                handles,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn version(&self) -> u32 {
        self.inner.database.version()
    }

    pub fn database(&self) -> &Arc<dyn HostDatabase> {
        &self.inner.database
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.inner.opened_at
    }

    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.database.object_store_names()
    }

    /// Pass-through to the host database
    pub fn create_object_store(
        &self,
        name: &str,
        params: &ObjectStoreParams,
    ) -> idbkit_host::Result<()> {
        self.inner.database.create_object_store(name, params)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.database.is_closed()
    }

    /// Close the database and drop the cached handle that produced it.
    ///
    /// A handle created after a reset is left alone.
    pub fn close(&self) {
        let was_open = !self.inner.database.is_closed();
        self.inner.database.close();

        if let Some(handles) = self.inner.handles.upgrade() {
            let mut handles = handles.lock();
            if handles
                .get(&self.inner.name)
                .is_some_and(|h| h.id() == self.inner.handle_id)
            {
                handles.remove(&self.inner.name);
            }
        }

        if was_open {
            tracing::info!(database = %self.inner.name, "Closed connection");
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.inner.name)
            .field("version", &self.version())
            .field("opened_at", &self.inner.opened_at)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    fn handle_with(open: OpenFuture) -> (ConnectionHandle, Arc<Mutex<Option<VersionChangeEvent>>>) {
        let upgrade = Arc::new(Mutex::new(None));
        let handle = ConnectionHandle::new(
            Uuid::new_v4(),
            "shop".to_string(),
            Arc::new(DatabaseConfig::new("shop", false)),
            Arc::clone(&upgrade),
            open,
        );
        (handle, upgrade)
    }

    #[tokio::test]
    async fn test_failed_handle_is_terminal() {
        let (handle, _) = handle_with(
            async { Err(ConnectionError::failed("shop", "Error: Operation pending")) }.boxed(),
        );
        assert_eq!(handle.status(), HandleStatus::Pending);

        let err = handle.wait().await.unwrap_err();
        assert_eq!(err, ConnectionError::failed("shop", "Error: Operation pending"));
        assert_eq!(handle.status(), HandleStatus::Failed);
        assert!(handle.status().is_terminal());
        assert_eq!(handle.error(), Some(err));
        assert!(handle.connection().is_none());

        // Awaiting again yields the same outcome without re-running
        assert!((&handle).await.is_err());
    }

    #[tokio::test]
    async fn test_upgrading_status() {
        let (handle, upgrade) =
            handle_with(futures_util::future::pending::<Result<Connection>>().boxed());

        *upgrade.lock() = Some(VersionChangeEvent {
            database: "shop".to_string(),
            old_version: 1,
            new_version: 3,
        });
        assert_eq!(
            handle.status(),
            HandleStatus::Upgrading {
                old_version: 1,
                new_version: 3
            }
        );
        assert_eq!(handle.status().to_string(), "upgrading");
        assert!(!handle.status().is_terminal());
    }

    #[test]
    fn test_clones_are_the_same_handle() {
        let (handle, _) =
            handle_with(futures_util::future::pending::<Result<Connection>>().boxed());
        let other = handle.clone();
        assert!(ConnectionHandle::ptr_eq(&handle, &other));
        assert_eq!(handle.id(), other.id());
        assert_eq!(handle.name(), "shop");
        assert_eq!(handle.config().name(), "shop");
    }
}
