//! Host engine traits
//!
//! An open request has exactly one terminal outcome. When the stored
//! version is older than the requested one the engine hands back an
//! [`UpgradeTransaction`] instead of a database; committing it produces the
//! database.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::event::RequestErrorEvent;
use crate::Result;

/// Version change carried by an upgrade transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionChangeEvent {
    pub database: String,
    /// Version stored before this open, 0 for a newly created database
    pub old_version: u32,
    pub new_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    Single(String),
    Array(Vec<String>),
}

impl KeyPath {
    pub fn new_single(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }

    pub fn new_array<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        KeyPath::Array(paths.into_iter().map(Into::into).collect())
    }

    pub fn paths(&self) -> Vec<&str> {
        match self {
            KeyPath::Single(path) => vec![path.as_str()],
            KeyPath::Array(paths) => paths.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStoreParams {
    pub key_path: Option<KeyPath>,
    pub auto_increment: bool,
}

impl ObjectStoreParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_path(&mut self, key_path: Option<KeyPath>) -> &mut Self {
        self.key_path = key_path;
        self
    }

    pub fn auto_increment(&mut self, auto_increment: bool) -> &mut Self {
        self.auto_increment = auto_increment;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexParams {
    pub unique: bool,
    pub multi_entry: bool,
}

impl IndexParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&mut self, unique: bool) -> &mut Self {
        self.unique = unique;
        self
    }

    pub fn multi_entry(&mut self, multi_entry: bool) -> &mut Self {
        self.multi_entry = multi_entry;
        self
    }
}

/// An opened database
pub trait HostDatabase: Send + Sync {
    fn name(&self) -> &str;

    fn version(&self) -> u32;

    fn object_store_names(&self) -> Vec<String>;

    /// Only valid while a version change is running; engines reject it
    /// with `InvalidState` on an opened database.
    fn create_object_store(&self, name: &str, params: &ObjectStoreParams) -> Result<()>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// The version-upgrade transaction of an open request
#[async_trait]
pub trait UpgradeTransaction: Send {
    fn event(&self) -> &VersionChangeEvent;

    fn object_store_names(&self) -> Vec<String>;

    fn create_object_store(&mut self, name: &str, params: ObjectStoreParams) -> Result<()>;

    fn delete_object_store(&mut self, name: &str) -> Result<()>;

    fn create_index(
        &mut self,
        store: &str,
        index: &str,
        key_path: KeyPath,
        params: IndexParams,
    ) -> Result<()>;

    /// Persist the schema changes and the new version
    async fn commit(self: Box<Self>) -> std::result::Result<Arc<dyn HostDatabase>, RequestErrorEvent>;

    /// Discard the schema changes; the stored version is left untouched
    fn abort(self: Box<Self>);
}

/// Terminal outcome of an open request
pub enum OpenOutcome {
    Success(Arc<dyn HostDatabase>),
    UpgradeNeeded(Box<dyn UpgradeTransaction>),
    Error(RequestErrorEvent),
    Blocked(RequestErrorEvent),
}

impl OpenOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            OpenOutcome::Success(_) => "success",
            OpenOutcome::UpgradeNeeded(_) => "upgradeneeded",
            OpenOutcome::Error(_) => "error",
            OpenOutcome::Blocked(_) => "blocked",
        }
    }
}

impl std::fmt::Debug for OpenOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenOutcome::Error(event) | OpenOutcome::Blocked(event) => {
                f.debug_tuple(self.kind()).field(event).finish()
            }
            OpenOutcome::UpgradeNeeded(tx) => {
                f.debug_tuple(self.kind()).field(tx.event()).finish()
            }
            OpenOutcome::Success(db) => f
                .debug_struct(self.kind())
                .field("name", &db.name())
                .field("version", &db.version())
                .finish(),
        }
    }
}

/// Storage engine able to open named, versioned databases
#[async_trait]
pub trait HostEngine: Send + Sync {
    /// Engine identifier used in log fields
    fn kind(&self) -> &'static str;

    async fn open(&self, name: &str, version: u32) -> OpenOutcome;
}
