//! Storage layer: shared-database registry, connection pool, graph
//! adapter, schema, and the memory store.

pub mod adapter;
pub mod memory_store;
pub mod pool;
pub mod registry;
pub mod schema;

pub use adapter::GraphAdapter;
pub use memory_store::MemoryStore;
pub use pool::ConnectionPool;
pub use schema::SCHEMA_VERSION;

use once_cell::sync::Lazy;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic write generation.
///
/// Every store, delete, maintenance operation and archive restore bumps
/// it; the recall cache records the generation at insert time and treats
/// any entry older than the current generation as a miss. Access-count
/// bookkeeping deliberately does not bump it, or every recall would evict
/// its own cache.
#[derive(Debug, Default)]
pub struct Generation(AtomicU64);

/// The process-wide generation shared by every service instance, so two
/// in-process consumers of one database invalidate each other's caches.
/// Invalidation is coarse on purpose: a write to any store evicts cached
/// recalls everywhere, which is always safe.
pub fn shared_generation() -> Arc<Generation> {
    static SHARED: Lazy<Arc<Generation>> = Lazy::new(|| Arc::new(Generation::new()));
    Arc::clone(&SHARED)
}

impl Generation {
    /// Creates a counter at generation zero.
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Records a write, invalidating cache entries from earlier generations.
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    /// The current generation.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}
