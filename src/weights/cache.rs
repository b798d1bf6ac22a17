//! Process-wide memoized weight tables.
//!
//! - **Key**: (source path, object name).
//! - **Value**: `Arc<WeightTable>`; every requester shares the one loaded copy
//!   and the cache keeps it alive for the process lifetime.
//! - **Loading**: performed while holding the map lock, so a key is loaded at
//!   most once even if pipelines are ever evaluated from several threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{Result, SelectError};
use crate::weights::provider::{JsonTableProvider, TableProvider};
use crate::weights::table::WeightTable;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub path: String,
    pub name: String,
}

pub struct WeightSourceCache {
    provider: Box<dyn TableProvider + Send + Sync>,
    entries: Mutex<HashMap<SourceKey, Arc<WeightTable>>>,
    loads: AtomicU64,
}

static GLOBAL: OnceLock<WeightSourceCache> = OnceLock::new();

impl WeightSourceCache {
    pub fn new(provider: Box<dyn TableProvider + Send + Sync>) -> Self {
        Self {
            provider,
            entries: Mutex::new(HashMap::new()),
            loads: AtomicU64::new(0),
        }
    }

    /// Shared cache backed by JSON files under `DATA_DIR`.
    pub fn global() -> &'static WeightSourceCache {
        GLOBAL.get_or_init(|| WeightSourceCache::new(Box::new(JsonTableProvider::from_env())))
    }

    pub fn get(&self, path: &str, name: &str) -> Result<Arc<WeightTable>> {
        let key = SourceKey {
            path: path.to_string(),
            name: name.to_string(),
        };
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SelectError::weight_source(path, name, "cache lock poisoned"))?;
        if let Some(table) = entries.get(&key) {
            return Ok(Arc::clone(table));
        }
        let table = Arc::new(self.provider.load(path, name)?);
        self.loads.fetch_add(1, Ordering::SeqCst);
        entries.insert(key, Arc::clone(&table));
        Ok(table)
    }

    /// Like [`get`](Self::get) but a missing object yields `None`.
    /// Unreadable or malformed sources still fail.
    pub fn get_optional(&self, path: &str, name: &str) -> Result<Option<Arc<WeightTable>>> {
        if !self.names(path)?.iter().any(|n| n == name) {
            return Ok(None);
        }
        self.get(path, name).map(Some)
    }

    pub fn names(&self, path: &str) -> Result<Vec<String>> {
        self.provider.names(path)
    }

    /// Number of provider loads performed so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
