//! Archive manager: restore, purge, and list pruning tombstones.

use crate::models::{ArchivedMemory, MemoryId};
use crate::storage::MemoryStore;
use crate::{Error, Result};
use tracing::instrument;

/// Manages the archive written by smart pruning and consolidation.
#[derive(Debug)]
pub struct ArchiveManager {
    store: MemoryStore,
}

impl ArchiveManager {
    /// Creates a manager over a store.
    #[must_use]
    pub const fn new(store: MemoryStore) -> Self {
        Self { store }
    }

    /// Restores an archived memory into the live graph and deletes the
    /// tombstone. Returns the restored memory id, or `None` when the
    /// archive id is unknown.
    ///
    /// Content, type, source, importance and `created_at` round-trip
    /// exactly. When live content with the same hash already exists the
    /// restore fails with `DuplicateContent` and the tombstone is kept.
    #[instrument(skip(self))]
    pub fn restore(&self, archive_id: &str) -> Result<Option<MemoryId>> {
        let Some(archive) = self.store.get_archive(archive_id)? else {
            return Ok(None);
        };

        let memory = archive.to_memory();
        match self.store.store_memory(&memory) {
            Ok(id) => {
                self.store.delete_archive(archive_id)?;
                tracing::info!(memory_id = %id, archive_id, "archive restored");
                metrics::counter!("archive_restores_total").increment(1);
                Ok(Some(id))
            },
            Err(e @ Error::DuplicateContent { .. }) => {
                tracing::warn!(archive_id, "restore blocked by live duplicate");
                Err(e)
            },
            Err(e) => Err(e),
        }
    }

    /// Deletes archives past their purge deadline. Returns the number
    /// purged.
    #[instrument(skip(self))]
    pub fn purge_expired(&self) -> Result<u64> {
        let purged = self.store.purge_expired_archives()?;
        if purged > 0 {
            tracing::info!(purged, "expired archives purged");
        }
        Ok(purged)
    }

    /// Most recent archives first.
    pub fn list_archives(&self, limit: usize) -> Result<Vec<ArchivedMemory>> {
        self.store.list_archives(limit)
    }
}
