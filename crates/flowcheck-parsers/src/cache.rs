//! Run-scoped extraction cache.
//!
//! Owned by one validation run (or one batch) and dropped with it. Entries
//! are keyed by path, role, and content hash, so a changed file is simply a
//! miss; nothing relies on the cache for correctness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use flowcheck_core::types::{Contract, Role};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub file_path: String,
    pub role: Role,
    pub content_hash: u64,
}

#[derive(Debug, Default)]
pub struct ExtractionCache {
    entries: Mutex<HashMap<CacheKey, Vec<Contract>>>,
    hits: AtomicU32,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<Contract>> {
        let entries = self.entries.lock().ok()?;
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put(&self, key: CacheKey, contracts: Vec<Contract>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key, contracts);
        }
    }

    pub fn hits(&self) -> u32 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
