// SPDX-License-Identifier: Apache-2.0

//! Single-file position store for hosts without a database.
//!
//! The whole cursor table is rewritten on every save: serialized into a
//! sibling temp file, synced, then renamed over the old table.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::persistence::PositionStore;
use crate::receivers::gamelog::source::{Cursor, SourceIdentity};

const TABLE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CursorTable {
    version: u32,
    cursors: BTreeMap<String, Cursor>,
}

impl Default for CursorTable {
    fn default() -> Self {
        Self {
            version: TABLE_VERSION,
            cursors: BTreeMap::new(),
        }
    }
}

#[derive(Clone)]
pub struct JsonFilePositionStore {
    path: PathBuf,
    table: Arc<RwLock<CursorTable>>,
}

impl JsonFilePositionStore {
    /// Load the cursor table at `path`. A missing file starts an empty table
    /// and its parent directory is created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let table = match fs::read(&path) {
            Ok(content) => serde_json::from_slice::<CursorTable>(&content).map_err(|e| {
                Error::Persistence(format!("{} is not a cursor table: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir).map_err(|e| {
                        Error::Persistence(format!("cannot create {}: {}", dir.display(), e))
                    })?;
                }
                CursorTable::default()
            }
            Err(e) => {
                return Err(Error::Persistence(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        debug!(path = ?path, cursors = table.cursors.len(), "Loaded cursor table");
        Ok(Self {
            path,
            table: Arc::new(RwLock::new(table)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PositionStore for JsonFilePositionStore {
    async fn load(&self, identity: &SourceIdentity) -> Result<Option<Cursor>> {
        let table = self
            .table
            .read()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(table.cursors.get(&identity.key()).cloned())
    }

    async fn save(&self, cursor: &Cursor) -> Result<()> {
        let mut table = self
            .table
            .write()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        table.cursors.insert(cursor.key(), cursor.clone());

        // the lock is held until the rename so saves land in order
        replace_file(&self.path, &table)
            .map_err(|e| Error::Persistence(format!("cannot write {}: {}", self.path.display(), e)))
    }
}

fn replace_file(path: &Path, table: &CursorTable) -> io::Result<()> {
    let content = serde_json::to_vec_pretty(table)?;

    let mut staging = path.as_os_str().to_owned();
    staging.push(".staging");
    let staging = PathBuf::from(staging);

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&staging)?;
    file.write_all(&content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&staging, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn cursor(log: &str, offset: u64) -> Cursor {
        let day = NaiveDate::from_ymd_opt(2021, 4, 20).unwrap();
        let mut c = Cursor::new(SourceIdentity::new(1, 1, log), "tlog", day);
        c.commit(offset, 1);
        c
    }

    #[tokio::test]
    async fn test_persist_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("positions.json");

        {
            let store = JsonFilePositionStore::open(&path).unwrap();
            store.save(&cursor("Login", 100)).await.unwrap();
            store.save(&cursor("Logout", 42)).await.unwrap();
            store.save(&cursor("Login", 200)).await.unwrap();
        }

        let store = JsonFilePositionStore::open(&path).unwrap();
        let login = store
            .load(&SourceIdentity::new(1, 1, "Login"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(login.byte_offset, 200);

        let logout = store
            .load(&SourceIdentity::new(1, 1, "Logout"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(logout.byte_offset, 42);
    }

    #[tokio::test]
    async fn test_no_staging_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions.json");

        let store = JsonFilePositionStore::open(&path).unwrap();
        for i in 0..5 {
            store.save(&cursor("Login", i)).await.unwrap();
        }

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("positions.json")]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("positions.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(
            JsonFilePositionStore::open(&path),
            Err(Error::Persistence(_))
        ));
    }
}
