//! LRU recall cache with TTL and generation-based invalidation.
//!
//! Keys carry the normalized query, the full filter set, the strategy and
//! the cap, so per-user isolation falls out of key construction: the cache
//! never short-circuits across users. Values are snapshots cloned on read;
//! callers cannot mutate cached state.
//!
//! Every write bumps the shared [`Generation`]; entries remember the
//! generation they were built at and any lookup observing a newer one
//! treats the entry as a miss and evicts it.

use crate::models::{MemoryContext, RecallFilters};
use crate::storage::Generation;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cache key: normalized query plus everything that shapes the result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Lowercased, whitespace-normalized query text.
    pub query: String,
    /// The full filter set.
    pub filters: RecallFilters,
    /// Strategy name.
    pub strategy: String,
    /// Result cap.
    pub max_memories: usize,
}

impl CacheKey {
    /// Builds a key, normalizing the query.
    #[must_use]
    pub fn new(
        query: &str,
        filters: &RecallFilters,
        strategy: &str,
        max_memories: usize,
    ) -> Self {
        Self {
            query: crate::text::canonical_content(query),
            filters: filters.clone(),
            strategy: strategy.to_string(),
            max_memories,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    context: MemoryContext,
    inserted_at: Instant,
    generation: u64,
}

/// Bounded recall cache.
pub struct RecallCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    ttl: Duration,
    generation: Arc<Generation>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for RecallCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecallCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish_non_exhaustive()
    }
}

impl RecallCache {
    /// Creates a cache with the given capacity and TTL, observing the
    /// shared write generation.
    #[must_use]
    pub fn new(capacity: usize, ttl_seconds: u64, generation: Arc<Generation>) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl: Duration::from_secs(ttl_seconds),
            generation,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, LruCache<CacheKey, CacheEntry>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                tracing::warn!("recall cache mutex was poisoned, recovering");
                poisoned.into_inner()
            },
        }
    }

    /// Looks up a context snapshot. TTL-expired and stale-generation
    /// entries are evicted and miss.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<MemoryContext> {
        let current_generation = self.generation.current();
        let mut entries = self.lock_entries();

        let stale = entries.get(key).map(|entry| {
            entry.generation < current_generation || entry.inserted_at.elapsed() > self.ttl
        });

        match stale {
            Some(false) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("recall_cache_hits_total").increment(1);
                entries.get(key).map(|entry| entry.context.clone())
            },
            Some(true) => {
                entries.pop(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("recall_cache_misses_total", "reason" => "stale").increment(1);
                None
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("recall_cache_misses_total", "reason" => "absent").increment(1);
                None
            },
        }
    }

    /// Stores a snapshot at the current generation.
    pub fn put(&self, key: CacheKey, context: MemoryContext) {
        let entry = CacheEntry {
            context,
            inserted_at: Instant::now(),
            generation: self.generation.current(),
        };
        self.lock_entries().put(key, entry);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lock_entries().clear();
    }

    /// Entries currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    /// True when nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache hits since construction.
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Cache misses since construction.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
