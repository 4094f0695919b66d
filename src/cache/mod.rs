//! Content-addressed AST cache.
//!
//! Entries are keyed by path and only served when the stored content hash
//! matches the caller's hash and the entry is younger than the TTL. A changed
//! file is therefore a guaranteed miss even when its path is reused.

pub mod pool;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use xxhash_rust::xxh3::xxh3_64;

use crate::analysis::FileAst;

pub use pool::{ast_pool, ObjectPool, PoolStats, Poolable};

/// Default maximum number of cached trees.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(30 * 60);

/// Rough per-declaration footprint used by the memory estimate.
const ESTIMATED_DECL_BYTES: usize = 160;

/// Rough fixed cost of one entry (map slot, key, container header).
const ESTIMATED_ENTRY_BYTES: usize = 512;

/// Hash file content for cache validation.
///
/// xxh3 is fast and non-cryptographic; it only has to tell "same bytes"
/// from "changed bytes".
pub fn content_hash(content: &[u8]) -> u64 {
    xxh3_64(content)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    ast: Arc<FileAst>,
    hash: u64,
    inserted: Instant,
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheMetrics {
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: f64,
    pub hits: u64,
    pub misses: u64,
    /// Hits divided by lookups, 0 when there were no lookups.
    pub hit_rate: f64,
    pub evictions: u64,
    pub estimated_memory_bytes: usize,
}

/// Thread-safe TTL cache of parsed files.
pub struct AstCache {
    entries: RwLock<HashMap<PathBuf, CacheEntry>>,
    limits: RwLock<(usize, Duration)>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AstCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limits: RwLock::new((max_entries.max(1), ttl)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Change capacity and TTL. Takes effect on the next lookup or insert.
    pub fn configure(&self, max_entries: usize, ttl: Duration) {
        *self.limits.write().unwrap_or_else(PoisonError::into_inner) = (max_entries.max(1), ttl);
    }

    fn limits(&self) -> (usize, Duration) {
        *self.limits.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a tree for `path` whose content hashed to `hash`.
    pub fn get(&self, path: &Path, hash: u64) -> Option<Arc<FileAst>> {
        let (_, ttl) = self.limits();
        let found = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .get(path)
                .filter(|e| e.hash == hash && e.inserted.elapsed() < ttl)
                .map(|e| Arc::clone(&e.ast))
        };

        match found {
            Some(ast) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(ast)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a tree. The most recent writer for a path wins.
    pub fn put(&self, path: &Path, ast: Arc<FileAst>, hash: u64) {
        let (max_entries, ttl) = self.limits();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.len() >= max_entries && !entries.contains_key(path) {
            let evicted = evict(&mut entries, max_entries, ttl);
            self.evictions.fetch_add(evicted.len() as u64, Ordering::Relaxed);
            recycle(evicted);
        }

        let replaced = entries.insert(
            path.to_path_buf(),
            CacheEntry {
                ast,
                hash,
                inserted: Instant::now(),
            },
        );
        drop(entries);
        if let Some(old) = replaced {
            recycle(vec![old]);
        }
    }

    /// Remove expired entries.
    pub fn cleanup(&self) -> usize {
        let (_, ttl) = self.limits();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let expired: Vec<PathBuf> = entries
            .iter()
            .filter(|(_, e)| e.inserted.elapsed() >= ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let removed: Vec<CacheEntry> = expired.iter().filter_map(|k| entries.remove(k)).collect();
        drop(entries);

        let count = removed.len();
        if count > 0 {
            tracing::debug!(removed = count, "expired AST cache entries");
            self.evictions.fetch_add(count as u64, Ordering::Relaxed);
        }
        recycle(removed);
        count
    }

    /// Remove every entry.
    pub fn clear(&self) {
        let drained: Vec<CacheEntry> = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            entries.drain().map(|(_, e)| e).collect()
        };
        recycle(drained);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero the hit, miss and eviction counters.
    pub fn reset_metrics(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.evictions.store(0, Ordering::Relaxed);
    }

    pub fn metrics(&self) -> CacheMetrics {
        let (max_entries, ttl) = self.limits();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;

        let (entries, estimated_memory_bytes) = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let bytes = entries
                .values()
                .map(|e| ESTIMATED_ENTRY_BYTES + e.ast.declaration_count() * ESTIMATED_DECL_BYTES)
                .sum();
            (entries.len(), bytes)
        };

        CacheMetrics {
            entries,
            max_entries,
            ttl_secs: ttl.as_secs_f64(),
            hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                hits as f64 / lookups as f64
            },
            evictions: self.evictions.load(Ordering::Relaxed),
            estimated_memory_bytes,
        }
    }
}

impl Default for AstCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES, DEFAULT_TTL)
    }
}

/// Make room for one insert: drop expired entries, then the oldest half.
fn evict(
    entries: &mut HashMap<PathBuf, CacheEntry>,
    max_entries: usize,
    ttl: Duration,
) -> Vec<CacheEntry> {
    let mut evicted = Vec::new();

    let expired: Vec<PathBuf> = entries
        .iter()
        .filter(|(_, e)| e.inserted.elapsed() >= ttl)
        .map(|(k, _)| k.clone())
        .collect();
    evicted.extend(expired.iter().filter_map(|k| entries.remove(k)));

    if entries.len() >= max_entries {
        let mut by_age: Vec<(PathBuf, Instant)> =
            entries.iter().map(|(k, e)| (k.clone(), e.inserted)).collect();
        by_age.sort_by_key(|(_, inserted)| *inserted);

        let excess = entries.len() - max_entries / 2;
        evicted.extend(
            by_age
                .into_iter()
                .take(excess)
                .filter_map(|(k, _)| entries.remove(&k)),
        );
    }

    evicted
}

/// Return trees nobody else holds to the shared pool.
fn recycle(entries: Vec<CacheEntry>) {
    for entry in entries {
        if let Ok(ast) = Arc::try_unwrap(entry.ast) {
            ast_pool().release(ast);
        }
    }
}
