use lru::LruCache;
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::Mutex;
use serde::Serialize;
use crate::core::error::Result;
use crate::core::types::{Row, RowId};
use crate::storage::store::RowStore;

/// Rows touched by one commit, grouped by table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Invalidation {
    pub tables: BTreeMap<String, BTreeSet<RowId>>,
}

impl Invalidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: &str, id: RowId) {
        self.tables.entry(table.to_string()).or_default().insert(id);
    }

    pub fn contains(&self, table: &str, id: RowId) -> bool {
        self.tables.get(table).is_some_and(|ids| ids.contains(&id))
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// Receives the rows a successful commit changed.
pub trait CacheInvalidator: Send + Sync {
    fn invalidate(&self, changes: &Invalidation);
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct RowKey {
    pub table: String,
    pub id: RowId,
}

/// LRU cache of persisted rows
pub struct RowCache {
    pub cache: Mutex<LruCache<RowKey, Row>>,
    pub capacity: usize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
}

impl RowCache {
    /// `None` when `capacity` is 0.
    pub fn new(capacity: usize) -> Option<Self> {
        let cap = NonZeroUsize::new(capacity)?;
        Some(RowCache {
            cache: Mutex::new(LruCache::new(cap)),
            capacity,
            hit_count: AtomicUsize::new(0),
            miss_count: AtomicUsize::new(0),
        })
    }

    pub fn get(&self, table: &str, id: RowId) -> Option<Row> {
        let key = RowKey { table: table.to_string(), id };
        let mut cache = self.cache.lock();
        if let Some(row) = cache.get(&key) {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            Some(row.clone())
        } else {
            self.miss_count.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    pub fn put(&self, table: &str, row: Row) {
        let key = RowKey { table: table.to_string(), id: row.id };
        self.cache.lock().put(key, row);
    }

    /// Cached row, or load it from `store` and remember it.
    pub fn get_or_load(&self, store: &dyn RowStore, table: &str, id: RowId) -> Result<Option<Row>> {
        if let Some(row) = self.get(table, id) {
            return Ok(Some(row));
        }
        let loaded = store.load_row(table, id)?;
        if let Some(row) = &loaded {
            self.put(table, row.clone());
        }
        Ok(loaded)
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
            size: self.len(),
            capacity: self.capacity,
        }
    }
}

impl CacheInvalidator for RowCache {
    fn invalidate(&self, changes: &Invalidation) {
        let mut cache = self.cache.lock();
        for (table, ids) in &changes.tables {
            for &id in ids {
                cache.pop(&RowKey { table: table.clone(), id });
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hit_count: usize,
    pub miss_count: usize,
    pub size: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }
}
