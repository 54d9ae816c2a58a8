//! Process-wide cache of compiled statements
//!
//! Preparing the same SQL text twice yields the same [`CompiledSql`]: the first
//! preparation compiles and stores it, later ones share it. The cache is keyed
//! by the exact SQL text and bounded both by entry count and by approximate
//! memory, evicting the least recently used entry first.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use fty_common_db::cache::{StatementCache, StatementCacheConfig};
//!
//! let cache = StatementCache::new(StatementCacheConfig::builder().max_entries(10).build());
//!
//! let first = cache.get_or_compile("SELECT * FROM t WHERE id = :id");
//! let second = cache.get_or_compile("SELECT * FROM t WHERE id = :id");
//! assert!(Arc::ptr_eq(&first, &second));
//!
//! let stats = cache.stats();
//! assert_eq!(stats.hits, 1);
//! assert_eq!(stats.misses, 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::query_builder::CompiledSql;

/// Default maximum number of cached statements
pub const DEFAULT_MAX_ENTRIES: usize = 128;

/// Default maximum total bytes held by the cache (256 KB)
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024;

/// Configuration for the statement cache
#[derive(Debug, Clone)]
pub struct StatementCacheConfig {
    max_entries: usize,
    max_bytes: Option<usize>,
    enabled: bool,
}

impl Default for StatementCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: Some(DEFAULT_MAX_BYTES),
            enabled: true,
        }
    }
}

impl StatementCacheConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration that compiles every statement afresh
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Create a builder for configuring the cache
    pub fn builder() -> StatementCacheConfigBuilder {
        StatementCacheConfigBuilder::default()
    }

    /// Get the maximum number of entries
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Get the maximum bytes (if set)
    pub fn max_bytes(&self) -> Option<usize> {
        self.max_bytes
    }

    /// Check if caching is enabled
    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Builder for [`StatementCacheConfig`]
#[derive(Debug, Default)]
pub struct StatementCacheConfigBuilder {
    max_entries: Option<usize>,
    max_bytes: Option<Option<usize>>,
    enabled: Option<bool>,
}

impl StatementCacheConfigBuilder {
    /// Set the maximum number of cache entries (at least one)
    pub fn max_entries(mut self, max: usize) -> Self {
        self.max_entries = Some(max.max(1));
        self
    }

    /// Set the maximum total bytes for the cache
    pub fn max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = Some(Some(max));
        self
    }

    /// Disable the byte limit
    pub fn no_byte_limit(mut self) -> Self {
        self.max_bytes = Some(None);
        self
    }

    /// Enable or disable caching
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    /// Build the configuration
    pub fn build(self) -> StatementCacheConfig {
        let default = StatementCacheConfig::default();
        StatementCacheConfig {
            max_entries: self.max_entries.unwrap_or(default.max_entries),
            max_bytes: self.max_bytes.unwrap_or(default.max_bytes),
            enabled: self.enabled.unwrap_or(default.enabled),
        }
    }
}

struct CacheEntry {
    compiled: Arc<CompiledSql>,
    last_access: AtomicU64,
}

#[derive(Default)]
struct Entries {
    map: HashMap<String, CacheEntry>,
    bytes: usize,
}

/// LRU cache of compiled statements keyed by SQL text
///
/// Safe for concurrent use; lookups only take the read lock.
pub struct StatementCache {
    config: StatementCacheConfig,
    entries: RwLock<Entries>,
    access_counter: AtomicU64,
    stats: CacheStats,
}

impl StatementCache {
    /// Create a new statement cache with the given configuration
    pub fn new(config: StatementCacheConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(Entries::default()),
            access_counter: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    /// Create a cache with default configuration
    pub fn with_defaults() -> Self {
        Self::new(StatementCacheConfig::default())
    }

    /// Get the cache configuration
    pub fn config(&self) -> &StatementCacheConfig {
        &self.config
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            insertions: self.stats.insertions.load(Ordering::Relaxed),
        }
    }

    /// Return the compiled form of `sql`, compiling and caching it on a miss
    pub fn get_or_compile(&self, sql: &str) -> Arc<CompiledSql> {
        if let Some(compiled) = self.get(sql) {
            return compiled;
        }
        let compiled = Arc::new(CompiledSql::parse(sql));
        self.insert(Arc::clone(&compiled))
    }

    /// Look up a cached statement
    pub fn get(&self, sql: &str) -> Option<Arc<CompiledSql>> {
        if !self.config.enabled {
            return None;
        }

        let entries = self.entries.read().ok()?;
        match entries.map.get(sql) {
            Some(entry) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                Some(Arc::clone(&entry.compiled))
            }
            None => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a compiled statement, returning the shared instance
    ///
    /// When another thread cached the same SQL first, its instance wins and
    /// is returned instead. Least recently used entries are evicted to stay
    /// within the configured limits.
    pub fn insert(&self, compiled: Arc<CompiledSql>) -> Arc<CompiledSql> {
        if !self.config.enabled {
            return compiled;
        }

        let mut entries = match self.entries.write() {
            Ok(e) => e,
            Err(_) => return compiled,
        };

        if let Some(existing) = entries.map.get(compiled.sql()) {
            existing.last_access.store(self.tick(), Ordering::Relaxed);
            return Arc::clone(&existing.compiled);
        }

        let size = compiled.size_bytes();
        while entries.map.len() >= self.config.max_entries {
            self.evict_lru(&mut entries);
        }
        if let Some(max_bytes) = self.config.max_bytes {
            while entries.bytes + size > max_bytes && !entries.map.is_empty() {
                self.evict_lru(&mut entries);
            }
        }

        entries.bytes += size;
        entries.map.insert(
            compiled.sql().to_string(),
            CacheEntry {
                compiled: Arc::clone(&compiled),
                last_access: AtomicU64::new(self.tick()),
            },
        );
        self.stats.insertions.fetch_add(1, Ordering::Relaxed);
        compiled
    }

    /// Check if a statement is cached
    pub fn contains(&self, sql: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.map.contains_key(sql))
            .unwrap_or(false)
    }

    /// Get the current number of cached entries
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.map.len()).unwrap_or(0)
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held by cached entries
    pub fn size_bytes(&self) -> usize {
        self.entries.read().map(|e| e.bytes).unwrap_or(0)
    }

    /// Drop every cached statement
    ///
    /// Statements already handed out keep their compiled form alive.
    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.map.clear();
            entries.bytes = 0;
        }
    }

    fn tick(&self) -> u64 {
        self.access_counter.fetch_add(1, Ordering::Relaxed)
    }

    fn evict_lru(&self, entries: &mut Entries) {
        let lru_key = entries
            .map
            .iter()
            .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
            .map(|(k, _)| k.clone());

        if let Some(entry) = lru_key.and_then(|key| entries.map.remove(&key)) {
            entries.bytes = entries.bytes.saturating_sub(entry.compiled.size_bytes());
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl std::fmt::Debug for StatementCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementCache")
            .field("config", &self.config)
            .field("len", &self.len())
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Default)]
struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    insertions: AtomicU64,
}

/// Snapshot of cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatsSnapshot {
    /// Number of cache hits
    pub hits: u64,
    /// Number of cache misses
    pub misses: u64,
    /// Number of entries evicted
    pub evictions: u64,
    /// Number of entries inserted
    pub insertions: u64,
}

impl CacheStatsSnapshot {
    /// Get the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
