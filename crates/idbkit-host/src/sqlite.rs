//! SQLite host engine
//!
//! One database file per name under a data directory. The schema version
//! lives in `PRAGMA user_version`; object stores are tables and their
//! definitions are recorded in `_idbkit_stores` / `_idbkit_indexes`.
//!
//! rusqlite calls block, so opens and commits run on the blocking pool when
//! a tokio runtime is available.

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{
    HostDatabase, HostEngine, IndexParams, KeyPath, ObjectStoreParams, OpenOutcome,
    UpgradeTransaction, VersionChangeEvent,
};
use crate::error::HostError;
use crate::event::RequestErrorEvent;
use crate::Result;

const METADATA_SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS _idbkit_stores (
        name TEXT PRIMARY KEY,
        key_path TEXT,
        auto_increment INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS _idbkit_indexes (
        store TEXT NOT NULL,
        name TEXT NOT NULL,
        key_path TEXT NOT NULL,
        is_unique INTEGER NOT NULL DEFAULT 0,
        multi_entry INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (store, name),
        FOREIGN KEY (store) REFERENCES _idbkit_stores(name) ON DELETE CASCADE
    );
"#;

#[derive(Debug, Clone)]
pub struct SqliteHost {
    data_dir: PathBuf,
}

impl SqliteHost {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// File backing `name`. Distinct names always map to distinct files.
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{}.sqlite3", encode_file_stem(name)))
    }

    fn open_connection(&self, name: &str) -> Result<Connection> {
        std::fs::create_dir_all(&self.data_dir)?;
        let conn = Connection::open(self.database_path(name))?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        Ok(conn)
    }

    fn open_request(&self, name: &str, version: u32) -> Result<OpenOutcome> {
        if version == 0 {
            return Err(HostError::InvalidVersion(version));
        }

        let conn = self.open_connection(name)?;
        let existing: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < existing {
            return Err(HostError::VersionTooLow {
                requested: version,
                existing,
            });
        }

        if version == existing {
            let database: Arc<dyn HostDatabase> =
                Arc::new(SqliteDatabase::new(name, existing, conn));
            return Ok(OpenOutcome::Success(database));
        }

        conn.execute_batch("BEGIN IMMEDIATE")?;
        if let Err(e) = conn.execute_batch(METADATA_SCHEMA) {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }

        Ok(OpenOutcome::UpgradeNeeded(Box::new(SqliteUpgrade {
            conn,
            event: VersionChangeEvent {
                database: name.to_string(),
                old_version: existing,
                new_version: version,
            },
        })))
    }
}

#[async_trait]
impl HostEngine for SqliteHost {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn open(&self, name: &str, version: u32) -> OpenOutcome {
        let host = self.clone();
        let owned = name.to_string();
        let opened = run_blocking(move || host.open_request(&owned, version)).await;

        match opened {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(database = %name, error = %e, "SQLite open failed");
                OpenOutcome::Error(e.into())
            }
        }
    }
}

struct SqliteUpgrade {
    conn: Connection,
    event: VersionChangeEvent,
}

#[async_trait]
impl UpgradeTransaction for SqliteUpgrade {
    fn event(&self) -> &VersionChangeEvent {
        &self.event
    }

    fn object_store_names(&self) -> Vec<String> {
        store_names(&self.conn).unwrap_or_else(|e| {
            tracing::warn!(
                database = %self.event.database,
                error = %e,
                "Failed to list object stores"
            );
            Vec::new()
        })
    }

    fn create_object_store(&mut self, name: &str, params: ObjectStoreParams) -> Result<()> {
        if store_names(&self.conn)?.iter().any(|s| s == name) {
            return Err(HostError::StoreExists(name.to_string()));
        }

        let key_column = if params.auto_increment {
            "key INTEGER PRIMARY KEY AUTOINCREMENT"
        } else {
            "key BLOB PRIMARY KEY"
        };
        self.conn.execute_batch(&format!(
            "CREATE TABLE {} ({}, value TEXT NOT NULL)",
            quote_ident(name),
            key_column
        ))?;

        let key_path = params
            .key_path
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| HostError::InvalidState(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO _idbkit_stores (name, key_path, auto_increment) VALUES (?1, ?2, ?3)",
            rusqlite::params![name, key_path, params.auto_increment as i32],
        )?;

        Ok(())
    }

    fn delete_object_store(&mut self, name: &str) -> Result<()> {
        if !store_names(&self.conn)?.iter().any(|s| s == name) {
            return Err(HostError::StoreNotFound(name.to_string()));
        }

        self.conn
            .execute_batch(&format!("DROP TABLE {}", quote_ident(name)))?;
        self.conn
            .execute("DELETE FROM _idbkit_stores WHERE name = ?1", [name])?;
        Ok(())
    }

    fn create_index(
        &mut self,
        store: &str,
        index: &str,
        key_path: KeyPath,
        params: IndexParams,
    ) -> Result<()> {
        if !store_names(&self.conn)?.iter().any(|s| s == store) {
            return Err(HostError::StoreNotFound(store.to_string()));
        }

        let exists: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM _idbkit_indexes WHERE store = ?1 AND name = ?2",
            [store, index],
            |row| row.get(0),
        )?;
        if exists > 0 {
            return Err(HostError::IndexExists {
                store: store.to_string(),
                index: index.to_string(),
            });
        }

        let columns = key_path
            .paths()
            .iter()
            .map(|path| format!("json_extract(value, '$.{}')", path.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        self.conn.execute_batch(&format!(
            "CREATE {}INDEX {} ON {} ({})",
            if params.unique { "UNIQUE " } else { "" },
            quote_ident(&format!("{}__{}", store, index)),
            quote_ident(store),
            columns
        ))?;

        let key_path_json =
            serde_json::to_string(&key_path).map_err(|e| HostError::InvalidState(e.to_string()))?;
        self.conn.execute(
            "INSERT INTO _idbkit_indexes (store, name, key_path, is_unique, multi_entry)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                store,
                index,
                key_path_json,
                params.unique as i32,
                params.multi_entry as i32,
            ],
        )?;

        Ok(())
    }

    async fn commit(
        self: Box<Self>,
    ) -> std::result::Result<Arc<dyn HostDatabase>, RequestErrorEvent> {
        let SqliteUpgrade { conn, event } = *self;
        let version = event.new_version;

        let conn = run_blocking(move || {
            let committed = conn
                .pragma_update(None, "user_version", version)
                .and_then(|_| conn.execute_batch("COMMIT"));

            match committed {
                Ok(()) => Ok(conn),
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    Err(HostError::from(e))
                }
            }
        })
        .await
        .map_err(|e| {
            tracing::warn!(database = %event.database, error = %e, "SQLite commit failed");
            RequestErrorEvent::from(e)
        })?;

        tracing::debug!(
            database = %event.database,
            version = event.new_version,
            "SQLite upgrade committed"
        );

        let database: Arc<dyn HostDatabase> =
            Arc::new(SqliteDatabase::new(&event.database, event.new_version, conn));
        Ok(database)
    }

    fn abort(self: Box<Self>) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            tracing::warn!(database = %self.event.database, error = %e, "Rollback failed");
        }
    }
}

struct SqliteDatabase {
    name: String,
    version: u32,
    conn: Mutex<Option<Connection>>,
}

impl SqliteDatabase {
    fn new(name: &str, version: u32, conn: Connection) -> Self {
        Self {
            name: name.to_string(),
            version,
            conn: Mutex::new(Some(conn)),
        }
    }
}

impl HostDatabase for SqliteDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn object_store_names(&self) -> Vec<String> {
        match self.conn.lock().as_ref() {
            Some(conn) => store_names(conn).unwrap_or_else(|e| {
                tracing::warn!(
                    database = %self.name,
                    error = %e,
                    "Failed to list object stores"
                );
                Vec::new()
            }),
            None => Vec::new(),
        }
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
        if let Some(conn) = self.conn.lock().take() {
            if let Err((_, e)) = conn.close() {
                tracing::warn!(database = %self.name, error = %e, "SQLite close failed");
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

fn store_names(conn: &Connection) -> Result<Vec<String>> {
    let has_metadata: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_idbkit_stores'",
        [],
        |row| row.get(0),
    )?;
    if has_metadata == 0 {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare("SELECT name FROM _idbkit_stores ORDER BY name")?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(names)
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(runtime) => runtime
            .spawn_blocking(f)
            .await
            .map_err(|e| HostError::Task(e.to_string()))?,
        Err(_) => f(),
    }
}

// Lowercase letters, digits and '-' are kept; every other byte becomes
// `_XX`. Uppercase is escaped too, for case-insensitive file systems.
fn encode_file_stem(name: &str) -> String {
    if name.is_empty() {
        return "_".to_string();
    }

    let mut stem = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'a'..=b'z' | b'0'..=b'9' | b'-' => stem.push(byte as char),
            _ => stem.push_str(&format!("_{:02X}", byte)),
        }
    }
    stem
}
