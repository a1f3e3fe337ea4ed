//! Memory service facade: the public contract.
//!
//! Coordinates extraction, deduplication, storage, recall, and
//! maintenance behind three primitives — `remember`, `recall`, and
//! `attach_memories` — plus statistics and lifecycle. Owns no state beyond
//! the wired components; every operation is expressible as a synchronous
//! call, so async adapters can wrap it on worker threads.
//!
//! # Example
//!
//! ```rust,ignore
//! use kuzu_memory::service::RememberOptions;
//! use kuzu_memory::{KuzuMemoryConfig, MemoryService, RecallFilters, RecallStrategy};
//!
//! let service = MemoryService::initialize(
//!     ".kuzu-memory/memories.db",
//!     KuzuMemoryConfig::default(),
//! )?;
//!
//! service.remember(
//!     "We decided to use PostgreSQL for primary storage.",
//!     "manual",
//!     &RememberOptions::default(),
//! )?;
//!
//! let context = service.attach_memories(
//!     "Which database does this project use?",
//!     None,
//!     RecallStrategy::Auto,
//!     &RecallFilters::new(),
//! )?;
//! println!("{}", context.enhanced_prompt);
//! service.close();
//! ```
//!
//! # Error translation
//!
//! | Facade behavior | Underlying condition |
//! |---|---|
//! | success with existing id | duplicate content on `remember` |
//! | empty context | no matches, or unknown project |
//! | `Validation` | empty content/query, malformed metadata |
//! | `Transient` category | pool exhausted, query timeout, write conflict |
//! | `Fatal` category | database unavailable, schema mismatch |

use crate::config::KuzuMemoryConfig;
use crate::dedup::{DedupDecision, DeduplicationEngine};
use crate::extraction::Extractor;
use crate::maintenance::{
    ArchiveManager, CleanupConfig, CleanupResult, CleanupRunner, ConsolidationConfig,
    ConsolidationResult, Consolidator, PruneResult, PruningConfig, SmartPruner,
};
use crate::models::{Memory, MemoryContext, MemoryId, MemoryType, RecallFilters};
use crate::recall::{RecallEngine, RecallStrategy};
use crate::storage::{self, GraphAdapter, MemoryStore};
use crate::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

/// Scoping and metadata options for `remember`.
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Session grouping tag.
    pub session_id: Option<String>,
    /// Agent scoping tag.
    pub agent_id: Option<String>,
    /// User scoping tag.
    pub user_id: Option<String>,
    /// Opaque JSON-shaped metadata attached to every stored record.
    pub metadata: Option<String>,
}

/// Point-in-time statistics over the store.
#[derive(Debug, Clone)]
pub struct MemoryStats {
    /// Live memories.
    pub live_memories: u64,
    /// Live memories per type.
    pub by_type: Vec<(String, u64)>,
    /// Live memories per source tag.
    pub by_source: Vec<(String, u64)>,
    /// Distinct entities in the graph.
    pub entities: u64,
    /// Archive tombstones awaiting purge.
    pub archives: u64,
    /// Recall cache hits since startup.
    pub cache_hits: u64,
    /// Recall cache misses since startup.
    pub cache_misses: u64,
    /// Current write generation.
    pub generation: u64,
}

/// The public memory service.
#[derive(Debug)]
pub struct MemoryService {
    adapter: Arc<GraphAdapter>,
    store: MemoryStore,
    extractor: Extractor,
    dedup: DeduplicationEngine,
    recall: RecallEngine,
    config: KuzuMemoryConfig,
}

impl MemoryService {
    /// Opens (or creates) the database at `db_path` and wires the
    /// components.
    pub fn initialize(db_path: impl AsRef<Path>, config: KuzuMemoryConfig) -> Result<Self> {
        config.validate()?;
        let adapter = Arc::new(GraphAdapter::open(db_path.as_ref(), &config)?);
        Self::seed_state_dir_notes(adapter.path());
        let store = MemoryStore::new(Arc::clone(&adapter), storage::shared_generation());
        let recall = RecallEngine::new(store.clone(), config.recall.clone(), config.performance.clone());
        Ok(Self {
            adapter,
            store,
            extractor: Extractor::new(config.extraction.clone()),
            dedup: DeduplicationEngine::default(),
            recall,
            config,
        })
    }

    /// Drops a short notes file into a freshly created `.kuzu-memory/`
    /// state directory. Best effort; an unwritable directory is not an
    /// initialization failure.
    fn seed_state_dir_notes(db_path: &Path) {
        let Some(state_dir) = db_path.parent() else {
            return;
        };
        if state_dir.file_name().and_then(|n| n.to_str())
            != Some(crate::project::STATE_DIR_NAME)
        {
            return;
        }
        let readme = state_dir.join("README.md");
        if readme.exists() {
            return;
        }
        let notes = "# Project memories\n\n\
            This directory holds this project's memory database and optional\n\
            per-project configuration (`config.yaml`). It is safe to commit;\n\
            delete it to forget everything.\n";
        if let Err(e) = std::fs::write(&readme, notes) {
            tracing::debug!(error = %e, "could not seed state directory notes");
        }
    }

    /// Resolves the project database from the environment and working
    /// directory, loading `.kuzu-memory/config.yaml` when present.
    pub fn initialize_from_env() -> Result<Self> {
        let cwd = std::env::current_dir().map_err(|e| Error::Storage {
            operation: "current_dir".to_string(),
            cause: e.to_string(),
        })?;
        let db_path = crate::project::resolve_db_path(&cwd);
        let config_path = db_path
            .parent()
            .map(|dir| dir.join(crate::project::CONFIG_FILE_NAME));
        let config = match config_path {
            Some(path) => KuzuMemoryConfig::load_from(&path)?,
            None => KuzuMemoryConfig::default(),
        }
        .with_env_overrides();
        Self::initialize(db_path, config)
    }

    /// The store, for maintenance wiring and tests.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &KuzuMemoryConfig {
        &self.config
    }

    /// Refcount on the shared database handle for this service's path.
    #[must_use]
    pub fn shared_refcount(&self) -> usize {
        self.adapter.shared_refcount()
    }

    /// Ingests free text: extracts candidates, deduplicates each, stores
    /// the survivors.
    ///
    /// Returns the id associated with the first candidate — the stored
    /// record, or the existing record it duplicated. `None` when the
    /// extractor produced no candidates from an otherwise valid input
    /// (logged, not raised).
    #[instrument(skip(self, content, options), fields(content_len = content.len(), source_type))]
    pub fn remember(
        &self,
        content: &str,
        source_type: &str,
        options: &RememberOptions,
    ) -> Result<Option<MemoryId>> {
        if content.trim().is_empty() {
            return Err(Error::Validation("content must not be empty".to_string()));
        }
        if let Some(metadata) = &options.metadata {
            serde_json::from_str::<serde_json::Value>(metadata).map_err(|e| {
                Error::Validation(format!("metadata must be JSON-shaped: {e}"))
            })?;
        }
        let started = Instant::now();

        if self.config.retention.enable_auto_cleanup {
            if let Err(e) = self.store.cleanup_expired() {
                tracing::warn!(error = %e, "opportunistic expiry sweep failed");
            }
        }

        let candidates = self.extractor.extract(content);
        if candidates.is_empty() {
            tracing::warn!(
                content_len = content.len(),
                "extraction produced no candidates"
            );
            return Ok(None);
        }

        let mut existing = self.store.all_live()?;
        let mut first_id: Option<MemoryId> = None;

        for candidate in candidates {
            let decision = self.dedup.decide(&candidate, &existing, None);
            let resolved_id = match decision {
                DedupDecision::Skip {
                    existing: existing_id,
                    similarity,
                    match_type,
                } => {
                    tracing::debug!(
                        existing = %existing_id,
                        similarity,
                        ?match_type,
                        "candidate skipped as duplicate"
                    );
                    Some(existing_id)
                },
                DedupDecision::Update { target, similarity } => {
                    tracing::debug!(target = %target, similarity, "candidate supersedes existing");
                    let stored = self.store_candidate(candidate, source_type, options)?;
                    if let Some(new_id) = &stored {
                        self.store.add_relates_to(new_id, &target, "update")?;
                    }
                    stored
                },
                DedupDecision::Store => self.store_candidate(candidate, source_type, options)?,
            };

            // Later candidates in this call dedup against what this call
            // already stored
            if let Some(id) = &resolved_id {
                if !existing.iter().any(|m| &m.id == id) {
                    if let Some(memory) = self.store.get_memory_by_id(id)? {
                        existing.push(memory);
                    }
                }
            }
            if first_id.is_none() {
                first_id = resolved_id;
            }
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if self.config.performance.enable_performance_monitoring
            && elapsed_ms > self.config.performance.max_generation_time_ms
        {
            tracing::warn!(
                elapsed_ms,
                budget_ms = self.config.performance.max_generation_time_ms,
                "remember exceeded its soft budget"
            );
        }

        // The ceiling is advisory: the store keeps accepting writes, but
        // operators get a nudge toward pruning
        let live = self.store.count_live()?;
        if live as usize > self.config.retention.max_total_memories {
            tracing::warn!(
                live,
                ceiling = self.config.retention.max_total_memories,
                "live memories exceed the configured ceiling; consider smart pruning"
            );
        }
        Ok(first_id)
    }

    fn store_candidate(
        &self,
        candidate: crate::extraction::Candidate,
        source_type: &str,
        options: &RememberOptions,
    ) -> Result<Option<MemoryId>> {
        let mut memory = candidate.into_memory(source_type, &self.config.retention);
        memory.session_id.clone_from(&options.session_id);
        memory.agent_id.clone_from(&options.agent_id);
        memory.user_id.clone_from(&options.user_id);
        memory.metadata.clone_from(&options.metadata);

        match self.store.store_memory(&memory) {
            Ok(id) => Ok(Some(id)),
            // A racing writer landed the same content first; that id wins
            Err(Error::DuplicateContent { existing_id, .. }) => {
                Ok(Some(existing_id.as_str().into()))
            },
            Err(e) => Err(e),
        }
    }

    /// Inserts pre-built records in order, silently skipping duplicates.
    /// Returns the ids actually inserted.
    pub fn batch_store(&self, memories: &[Memory]) -> Result<Vec<MemoryId>> {
        for memory in memories {
            if memory.content.trim().is_empty() {
                return Err(Error::Validation(
                    "batch contains a record with empty content".to_string(),
                ));
            }
        }
        self.store.batch_store_memories(memories)
    }

    /// Returns a composed context: recalled records interleaved with the
    /// prompt.
    pub fn attach_memories(
        &self,
        prompt: &str,
        max_memories: Option<usize>,
        strategy: RecallStrategy,
        filters: &RecallFilters,
    ) -> Result<MemoryContext> {
        let cap = max_memories.unwrap_or(self.config.recall.max_memories);
        self.recall.attach_memories(prompt, cap, strategy, filters)
    }

    /// Returns the ranked memories for a query.
    pub fn recall(
        &self,
        query: &str,
        max_memories: Option<usize>,
        strategy: RecallStrategy,
        filters: &RecallFilters,
    ) -> Result<Vec<Memory>> {
        Ok(self
            .attach_memories(query, max_memories, strategy, filters)?
            .memories)
    }

    /// Fetches one memory by id.
    pub fn get_memory(&self, id: &MemoryId) -> Result<Option<Memory>> {
        self.store.get_memory_by_id(id)
    }

    /// Most recent live memories.
    pub fn get_recent(&self, limit: usize, memory_type: Option<MemoryType>) -> Result<Vec<Memory>> {
        self.store.get_recent_memories(limit, memory_type)
    }

    /// Live memories grouped under a session, newest first.
    pub fn get_session_memories(&self, session_id: &str) -> Result<Vec<Memory>> {
        if session_id.trim().is_empty() {
            return Err(Error::Validation("session id must not be empty".to_string()));
        }
        self.store.memories_in_session(session_id)
    }

    /// Deletes a live memory. Returns true when one was removed.
    pub fn delete_memory(&self, id: &MemoryId) -> Result<bool> {
        self.store.delete_memory(id)
    }

    /// Number of live memories.
    pub fn count(&self) -> Result<u64> {
        self.store.count_live()
    }

    /// Sweeps memories whose validity window has closed.
    pub fn cleanup_expired(&self) -> Result<u64> {
        self.store.cleanup_expired()
    }

    /// Point-in-time statistics.
    pub fn stats(&self) -> Result<MemoryStats> {
        let (cache_hits, cache_misses) = self.recall.cache().map_or((0, 0), |cache| {
            (cache.hit_count(), cache.miss_count())
        });
        Ok(MemoryStats {
            live_memories: self.store.count_live()?,
            by_type: self.store.count_by_type()?,
            by_source: self.store.count_by_source()?,
            entities: self.store.entity_count()?,
            archives: self.store.archive_count()?,
            cache_hits,
            cache_misses,
            generation: self.store.generation().current(),
        })
    }

    /// Runs the cleanup passes (stale, duplicates, orphans).
    pub fn cleanup(&self, dry_run: bool) -> Vec<CleanupResult> {
        CleanupRunner::new(self.store.clone(), CleanupConfig::default()).run_all(dry_run)
    }

    /// Runs smart pruning with an optional threshold override.
    pub fn smart_prune(&self, threshold: Option<f64>, dry_run: bool) -> Result<PruneResult> {
        SmartPruner::new(self.store.clone(), PruningConfig::default()).prune(threshold, dry_run)
    }

    /// Consolidates clusters of similar old memories into summaries.
    pub fn consolidate(&self, dry_run: bool) -> Result<ConsolidationResult> {
        Consolidator::new(self.store.clone(), ConsolidationConfig::default()).consolidate(dry_run)
    }

    /// The archive manager for restore/purge/list.
    #[must_use]
    pub fn archive_manager(&self) -> ArchiveManager {
        ArchiveManager::new(self.store.clone())
    }

    /// Releases this service's reference on the shared database handle.
    pub fn close(&self) {
        self.adapter.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_service() -> (tempfile::TempDir, MemoryService) {
        let dir = tempfile::tempdir().unwrap();
        let service = MemoryService::initialize(
            dir.path().join(".kuzu-memory").join("memories.db"),
            KuzuMemoryConfig::default(),
        )
        .unwrap();
        (dir, service)
    }

    #[test]
    fn test_remember_and_get() {
        let (_dir, service) = open_service();
        let id = service
            .remember("My name is Alice.", "manual", &RememberOptions::default())
            .unwrap()
            .unwrap();
        let memory = service.get_memory(&id).unwrap().unwrap();
        assert_eq!(memory.content, "My name is Alice.");
        assert_eq!(memory.memory_type, MemoryType::Semantic);
        service.close();
    }

    #[test]
    fn test_remember_empty_content_rejected() {
        let (_dir, service) = open_service();
        for bad in ["", "   ", "\n\t"] {
            let err = service
                .remember(bad, "manual", &RememberOptions::default())
                .unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
        }
        service.close();
    }

    #[test]
    fn test_remember_rejects_malformed_metadata() {
        let (_dir, service) = open_service();
        let opts = RememberOptions {
            metadata: Some("not json".to_string()),
            ..RememberOptions::default()
        };
        let err = service
            .remember("We decided to use PostgreSQL.", "manual", &opts)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        service.close();
    }

    #[test]
    fn test_remember_duplicate_returns_existing_id() {
        let (_dir, service) = open_service();
        let opts = RememberOptions::default();
        let first = service
            .remember("My name is Alice.", "manual", &opts)
            .unwrap()
            .unwrap();
        let second = service
            .remember("my   name   is alice.", "manual", &opts)
            .unwrap()
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(service.count().unwrap(), 1);
        service.close();
    }

    #[test]
    fn test_remember_update_links_superseded() {
        let (_dir, service) = open_service();
        let opts = RememberOptions::default();
        let old = service
            .remember("I prefer Django.", "manual", &opts)
            .unwrap()
            .unwrap();
        let new = service
            .remember("Actually, I prefer FastAPI.", "manual", &opts)
            .unwrap()
            .unwrap();
        assert_ne!(old, new);

        let related = service.store().related_ids(&new).unwrap();
        assert!(related.contains(&old));

        let new_memory = service.get_memory(&new).unwrap().unwrap();
        assert!(new_memory.content.contains("FastAPI"));
        service.close();
    }

    #[test]
    fn test_remember_scoping_options() {
        let (_dir, service) = open_service();
        let opts = RememberOptions {
            session_id: Some("sess-7".to_string()),
            agent_id: Some("agent-1".to_string()),
            user_id: Some("alice".to_string()),
            metadata: Some(r#"{"origin":"test"}"#.to_string()),
        };
        let id = service
            .remember("We decided to adopt trunk-based development.", "manual", &opts)
            .unwrap()
            .unwrap();
        let memory = service.get_memory(&id).unwrap().unwrap();
        assert_eq!(memory.session_id.as_deref(), Some("sess-7"));
        assert_eq!(memory.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(memory.user_id.as_deref(), Some("alice"));
        assert!(memory.metadata.as_deref().unwrap().contains("origin"));
        service.close();
    }

    #[test]
    fn test_attach_memories_no_match_passthrough() {
        let (_dir, service) = open_service();
        let ctx = service
            .attach_memories(
                "completely unknown topic",
                None,
                RecallStrategy::Auto,
                &RecallFilters::new(),
            )
            .unwrap();
        assert!(ctx.memories.is_empty());
        assert_eq!(ctx.enhanced_prompt, ctx.original_prompt);
        service.close();
    }

    #[test]
    fn test_stats_shape() {
        let (_dir, service) = open_service();
        service
            .remember("The data team uses Python.", "manual", &RememberOptions::default())
            .unwrap();
        let stats = service.stats().unwrap();
        assert_eq!(stats.live_memories, 1);
        assert!(stats.generation >= 1);
        assert!(stats.entities >= 1);
        assert!(stats.by_source.contains(&("manual".to_string(), 1)));
        service.close();
    }

    #[test]
    fn test_session_grouping() {
        let (_dir, service) = open_service();
        let opts = RememberOptions {
            session_id: Some("pairing-session".to_string()),
            ..RememberOptions::default()
        };
        service
            .remember("We decided to split the billing module.", "ai-conversation", &opts)
            .unwrap();
        service
            .remember(
                "The data team uses Python for exports.",
                "ai-conversation",
                &RememberOptions::default(),
            )
            .unwrap();

        let grouped = service.get_session_memories("pairing-session").unwrap();
        assert_eq!(grouped.len(), 1);
        assert!(grouped[0].content.contains("billing"));

        let err = service.get_session_memories("  ").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        service.close();
    }

    #[test]
    fn test_state_dir_notes_seeded() {
        let (dir, service) = open_service();
        let readme = dir.path().join(".kuzu-memory").join("README.md");
        assert!(readme.exists());
        service.close();
    }

    #[test]
    fn test_batch_store_validation() {
        let (_dir, service) = open_service();
        let good = Memory::new("a good record", MemoryType::Semantic, "git_sync");
        let bad = Memory::new("   ", MemoryType::Semantic, "git_sync");
        let err = service.batch_store(&[good, bad]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        service.close();
    }
}
