//! Archived memory tombstones written by smart pruning.

use super::{Memory, MemoryId, MemoryType};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days an archive survives before it becomes purgeable.
pub const DEFAULT_ARCHIVE_LIFETIME_DAYS: i64 = 30;

/// A tombstone preserving enough of a pruned memory to restore it.
///
/// Written by smart pruning and consolidation; purged after `expires_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedMemory {
    /// Identifier of the archive node itself.
    pub archive_id: String,
    /// Id the memory had while live; reused on restore.
    pub original_id: MemoryId,
    /// The archived content.
    pub content: String,
    /// The archived memory type.
    pub memory_type: MemoryType,
    /// The archived source tag.
    pub source_type: String,
    /// The archived importance.
    pub importance: f64,
    /// Original creation instant, preserved across archive and restore.
    pub created_at: DateTime<Utc>,
    /// When the memory was archived.
    pub archived_at: DateTime<Utc>,
    /// When this archive becomes purgeable.
    pub expires_at: DateTime<Utc>,
    /// The retention score that condemned the memory (0 for consolidation
    /// archives).
    pub prune_score: f64,
}

impl ArchivedMemory {
    /// Builds a tombstone from a live memory.
    ///
    /// `expires_at` defaults to `archived_at + 30 days`.
    #[must_use]
    pub fn from_memory(memory: &Memory, prune_score: f64, archived_at: DateTime<Utc>) -> Self {
        Self {
            archive_id: uuid::Uuid::new_v4().to_string(),
            original_id: memory.id.clone(),
            content: memory.content.clone(),
            memory_type: memory.memory_type,
            source_type: memory.source_type.clone(),
            importance: memory.importance,
            created_at: memory.created_at,
            archived_at,
            expires_at: archived_at + Duration::days(DEFAULT_ARCHIVE_LIFETIME_DAYS),
            prune_score,
        }
    }

    /// Overrides the purge deadline.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Reconstructs a live memory from this tombstone.
    ///
    /// Content, type, source, importance and `created_at` round-trip
    /// exactly; access bookkeeping restarts from zero.
    #[must_use]
    pub fn to_memory(&self) -> Memory {
        let mut memory = Memory::new(
            self.content.clone(),
            self.memory_type,
            &self.source_type,
        )
        .with_importance(self.importance);
        memory.id = self.original_id.clone();
        memory.created_at = self.created_at;
        memory.valid_from = self.created_at;
        memory
    }

    /// Returns true if this archive is past its purge deadline.
    #[must_use]
    pub fn is_purgeable(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
