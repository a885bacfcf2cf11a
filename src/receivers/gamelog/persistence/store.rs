// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::receivers::gamelog::error::{Error, Result};
use crate::receivers::gamelog::source::{Cursor, SourceIdentity};

/// Durable mapping from a source to its read cursor.
///
/// `save` is an upsert keyed by `SourceIdentity::key`. A failed save must be
/// treated as fatal by callers: resuming from a stale cursor after a restart
/// would re-send data, and skipping ahead would lose it.
pub trait PositionStore: Send + Sync {
    /// Returns `None` when the source has never been registered
    fn load(&self, identity: &SourceIdentity) -> impl Future<Output = Result<Option<Cursor>>> + Send;

    fn save(&self, cursor: &Cursor) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local store, used for dry runs and tests
#[derive(Default)]
pub struct MemoryPositionStore {
    data: Mutex<HashMap<String, Cursor>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryPositionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Make every following save fail
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Snapshot of the stored cursor for `identity`
    pub fn get(&self, identity: &SourceIdentity) -> Option<Cursor> {
        self.data
            .lock()
            .ok()
            .and_then(|data| data.get(&identity.key()).cloned())
    }
}

impl PositionStore for MemoryPositionStore {
    async fn load(&self, identity: &SourceIdentity) -> Result<Option<Cursor>> {
        let data = self
            .data
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        Ok(data.get(&identity.key()).cloned())
    }

    async fn save(&self, cursor: &Cursor) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Persistence(format!(
                "save rejected for {}",
                cursor.identity
            )));
        }

        let mut data = self
            .data
            .lock()
            .map_err(|e| Error::Persistence(e.to_string()))?;
        data.insert(cursor.key(), cursor.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
