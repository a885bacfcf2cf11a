// SPDX-License-Identifier: Apache-2.0

//! Persistence for source cursors.
//!
//! The relational store is the production backend. A JSON file store and an
//! in-memory store satisfy the same contract for single-host and test setups.

mod json_file;
mod sqlite;
mod store;

pub use json_file::JsonFilePositionStore;
pub use sqlite::{DEFAULT_MAX_CONNECTIONS, SqlitePositionStore};
pub use store::{MemoryPositionStore, PositionStore};

use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::source::{Cursor, SourceIdentity};

/// Position store selected at startup
pub enum AnyPositionStore {
    Sqlite(SqlitePositionStore),
    JsonFile(JsonFilePositionStore),
    Memory(MemoryPositionStore),
}

impl AnyPositionStore {
    /// Open the store named by `location`: `memory`, a `sqlite:` URL, or a
    /// path ending in `.json`
    pub async fn open(location: &str, max_connections: u32) -> Result<Self> {
        if location == "memory" {
            return Ok(Self::Memory(MemoryPositionStore::new()));
        }
        if location.starts_with("sqlite:") {
            return Ok(Self::Sqlite(
                SqlitePositionStore::connect(location, max_connections).await?,
            ));
        }
        if location.ends_with(".json") {
            return Ok(Self::JsonFile(JsonFilePositionStore::open(location)?));
        }

        Err(Error::Config(format!(
            "unsupported position store location: {}",
            location
        )))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Sqlite(_) => "sqlite",
            Self::JsonFile(_) => "json_file",
            Self::Memory(_) => "memory",
        }
    }
}

impl PositionStore for AnyPositionStore {
    async fn load(&self, identity: &SourceIdentity) -> Result<Option<Cursor>> {
        match self {
            Self::Sqlite(s) => s.load(identity).await,
            Self::JsonFile(s) => s.load(identity).await,
            Self::Memory(s) => s.load(identity).await,
        }
    }

    async fn save(&self, cursor: &Cursor) -> Result<()> {
        match self {
            Self::Sqlite(s) => s.save(cursor).await,
            Self::JsonFile(s) => s.save(cursor).await,
            Self::Memory(s) => s.save(cursor).await,
        }
    }
}
