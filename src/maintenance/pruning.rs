//! Smart pruning: multi-factor retention scoring with archive.
//!
//! Each candidate gets four sub-scores in [0, 1] (higher = more worth
//! keeping): age decay, content-size decay, access frequency+recency, and
//! stored importance. Memories under the threshold are archived as
//! tombstones and deleted — unless a protection rule applies, in which
//! case no threshold can touch them.
//!
//! # Protection rules
//!
//! | Rule | Default |
//! |---|---|
//! | importance at or above | 0.8 |
//! | access count at or above | 10 |
//! | younger than | 30 days |
//! | source tag in protected set | `manual`, `claude-code-hook` |
//! | memory type | preference |
//!
//! # Example
//!
//! ```rust,ignore
//! use kuzu_memory::maintenance::{PruningConfig, SmartPruner};
//!
//! let pruner = SmartPruner::new(store, PruningConfig::default());
//! let dry = pruner.prune(None, true)?;
//! println!("{} candidates would be archived", dry.candidates);
//! let result = pruner.prune(None, false)?;
//! println!("archived {} memories", result.archived);
//! ```

use crate::models::{ArchivedMemory, Memory, MemoryId, MemoryType};
use crate::storage::MemoryStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;
use tracing::instrument;

/// Tunables for the retention model.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PruningConfig {
    /// Memories scoring under this are prune candidates.
    pub threshold: f64,
    /// Age at which the age score reaches zero.
    pub max_age_days: f64,
    /// Content size at which the size score reaches zero.
    pub max_size_bytes: f64,
    /// Access count that saturates the frequency component.
    pub access_count_norm: u32,
    /// Days since last access at which the recency component reaches zero.
    pub access_recency_days: f64,
    /// Weight of the age score.
    pub age_weight: f64,
    /// Weight of the size score.
    pub size_weight: f64,
    /// Weight of the access score.
    pub access_weight: f64,
    /// Weight of the importance score.
    pub importance_weight: f64,
    /// Importance at or above this protects a memory outright.
    pub protected_importance: f64,
    /// Access count at or above this protects a memory outright.
    pub protected_access_count: u32,
    /// Memories younger than this are always protected.
    pub protected_age_days: i64,
    /// Source tags whose memories are never pruned.
    pub protected_sources: Vec<String>,
    /// Copy the database file aside before a destructive prune.
    pub backup_before_prune: bool,
}

impl Default for PruningConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            max_age_days: 365.0,
            max_size_bytes: 15_000.0,
            access_count_norm: 20,
            access_recency_days: 120.0,
            age_weight: 0.25,
            size_weight: 0.25,
            access_weight: 0.25,
            importance_weight: 0.25,
            protected_importance: 0.8,
            protected_access_count: 10,
            protected_age_days: 30,
            protected_sources: vec!["manual".to_string(), "claude-code-hook".to_string()],
            backup_before_prune: false,
        }
    }
}

impl PruningConfig {
    /// Sets the prune threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Enables the pre-prune snapshot.
    #[must_use]
    pub const fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_before_prune = enabled;
        self
    }

    /// Adds a protected source tag.
    #[must_use]
    pub fn with_protected_source(mut self, source: impl Into<String>) -> Self {
        self.protected_sources.push(source.into());
        self
    }
}

/// The four sub-scores and their weighted total for one memory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    /// Linear decay from 1.0 at age zero.
    pub age_score: f64,
    /// Linear decay from 1.0 at zero bytes.
    pub size_score: f64,
    /// Frequency and recency of access; never-accessed scores zero.
    pub access_score: f64,
    /// The stored importance.
    pub importance_score: f64,
    /// Weighted sum.
    pub total: f64,
}

/// Outcome of a pruning run.
#[derive(Debug, Clone)]
pub struct PruneResult {
    /// Live memories examined.
    pub examined: usize,
    /// Memories under the threshold and unprotected.
    pub candidates: usize,
    /// Memories protected by a rule.
    pub protected: usize,
    /// Tombstones written (0 under dry-run).
    pub archived: usize,
    /// Memories deleted (0 under dry-run).
    pub pruned: usize,
    /// Whether this was a dry run.
    pub dry_run: bool,
    /// Wall-clock duration.
    pub duration_ms: u64,
    /// Where the pre-prune snapshot landed, when one was taken.
    pub backup_path: Option<PathBuf>,
    /// Candidate ids with their scores, for dry-run inspection.
    pub breakdown: Vec<(MemoryId, f64)>,
}

/// Multi-factor pruner over a store.
#[derive(Debug)]
pub struct SmartPruner {
    store: MemoryStore,
    config: PruningConfig,
}

impl SmartPruner {
    /// Creates a pruner with the given retention model.
    #[must_use]
    pub const fn new(store: MemoryStore, config: PruningConfig) -> Self {
        Self { store, config }
    }

    fn age_score(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
        (1.0 - age_days / self.config.max_age_days).clamp(0.0, 1.0)
    }

    fn size_score(&self, content_bytes: usize) -> f64 {
        (1.0 - content_bytes as f64 / self.config.max_size_bytes).clamp(0.0, 1.0)
    }

    fn access_score(
        &self,
        access_count: u32,
        accessed_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> f64 {
        let Some(accessed_at) = accessed_at else {
            return 0.0;
        };
        if access_count == 0 {
            return 0.0;
        }
        let frequency = (f64::from(access_count) / f64::from(self.config.access_count_norm))
            .clamp(0.0, 1.0);
        let days_since = (now - accessed_at).num_seconds().max(0) as f64 / 86_400.0;
        let recency = (1.0 - days_since / self.config.access_recency_days).clamp(0.0, 1.0);
        (frequency + recency) / 2.0
    }

    /// Scores one memory against the retention model.
    #[must_use]
    pub fn score(&self, memory: &Memory, now: DateTime<Utc>) -> ScoreBreakdown {
        let age_score = self.age_score(memory.created_at, now);
        let size_score = self.size_score(memory.content.len());
        let access_score = self.access_score(memory.access_count, memory.accessed_at, now);
        let importance_score = memory.importance;
        let total = self.config.age_weight * age_score
            + self.config.size_weight * size_score
            + self.config.access_weight * access_score
            + self.config.importance_weight * importance_score;
        ScoreBreakdown {
            age_score,
            size_score,
            access_score,
            importance_score,
            total,
        }
    }

    /// Returns the protection rule shielding this memory, if any. A
    /// protected memory is never pruned, regardless of score or threshold.
    #[must_use]
    pub fn protection_reason(&self, memory: &Memory, now: DateTime<Utc>) -> Option<&'static str> {
        if memory.importance >= self.config.protected_importance {
            return Some("high_importance");
        }
        if memory.access_count >= self.config.protected_access_count {
            return Some("high_access_count");
        }
        let age_days = (now - memory.created_at).num_days();
        if age_days < self.config.protected_age_days {
            return Some("recent");
        }
        if self
            .config
            .protected_sources
            .iter()
            .any(|s| s == &memory.source_type)
        {
            return Some("protected_source");
        }
        if memory.memory_type == MemoryType::Preference {
            return Some("preference_type");
        }
        None
    }

    fn backup_database(&self) -> Option<PathBuf> {
        let db_path = self.store.adapter().path();
        let stamp = Utc::now().format("%Y%m%d%H%M%S");
        let backup = db_path.with_extension(format!("backup-{stamp}"));
        match std::fs::copy(db_path, &backup) {
            Ok(_) => Some(backup),
            Err(e) => {
                tracing::warn!(error = %e, "pre-prune backup failed, continuing without");
                None
            },
        }
    }

    /// Runs the pruner. `threshold` overrides the configured one.
    ///
    /// Dry-run reports counts and a score breakdown without mutating.
    /// Otherwise each candidate is archived as a tombstone carrying its
    /// prune score, then deleted from the live graph.
    #[instrument(skip(self), fields(dry_run))]
    pub fn prune(&self, threshold: Option<f64>, dry_run: bool) -> Result<PruneResult> {
        let started = Instant::now();
        let threshold = threshold.unwrap_or(self.config.threshold);
        let now = Utc::now();

        let live = self.store.all_live()?;
        let mut result = PruneResult {
            examined: live.len(),
            candidates: 0,
            protected: 0,
            archived: 0,
            pruned: 0,
            dry_run,
            duration_ms: 0,
            backup_path: None,
            breakdown: Vec::new(),
        };

        let mut condemned: Vec<(Memory, f64)> = Vec::new();
        for memory in live {
            let score = self.score(&memory, now);
            if score.total >= threshold {
                continue;
            }
            if let Some(reason) = self.protection_reason(&memory, now) {
                result.protected += 1;
                tracing::debug!(memory_id = %memory.id, reason, "memory protected from pruning");
                continue;
            }
            result.candidates += 1;
            result.breakdown.push((memory.id.clone(), score.total));
            condemned.push((memory, score.total));
        }

        if dry_run {
            result.duration_ms =
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                examined = result.examined,
                candidates = result.candidates,
                protected = result.protected,
                "prune dry-run finished"
            );
            return Ok(result);
        }

        if self.config.backup_before_prune && !condemned.is_empty() {
            result.backup_path = self.backup_database();
        }

        for (memory, prune_score) in condemned {
            let archive = ArchivedMemory::from_memory(&memory, prune_score, now);
            self.store.insert_archive(&archive)?;
            result.archived += 1;
            if self.store.delete_memory(&memory.id)? {
                result.pruned += 1;
            }
        }

        result.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::counter!("prune_runs_total").increment(1);
        metrics::gauge!("prune_archived").set(result.archived as f64);
        tracing::info!(
            examined = result.examined,
            pruned = result.pruned,
            archived = result.archived,
            protected = result.protected,
            "prune finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KuzuMemoryConfig;
    use crate::storage::{Generation, GraphAdapter};
    use chrono::Duration;
    use std::sync::Arc;

    fn open_store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let adapter = Arc::new(
            GraphAdapter::open(&dir.path().join("prune.db"), &KuzuMemoryConfig::default())
                .unwrap(),
        );
        (dir, MemoryStore::new(adapter, Arc::new(Generation::new())))
    }

    fn pruner(store: &MemoryStore) -> SmartPruner {
        SmartPruner::new(store.clone(), PruningConfig::default())
    }

    fn aged(content: &str, days_old: i64, access_count: u32, importance: f64) -> Memory {
        let mut m = Memory::new(content, MemoryType::Episodic, "ai-conversation")
            .with_importance(importance)
            .with_valid_to(None);
        m.created_at = Utc::now() - Duration::days(days_old);
        m.valid_from = m.created_at;
        m.access_count = access_count;
        if access_count > 0 {
            m.accessed_at = Some(Utc::now() - Duration::days(days_old.min(10)));
        }
        m
    }

    #[test]
    fn test_age_score_bounds() {
        let (_dir, store) = open_store();
        let p = pruner(&store);
        let now = Utc::now();

        let recent = p.age_score(now - Duration::days(1), now);
        assert!(recent > 0.9 && recent <= 1.0);

        let old = p.age_score(now - Duration::days(400), now);
        assert!(old.abs() < f64::EPSILON);

        let mid = p.age_score(now - Duration::days(182), now);
        assert!(mid > 0.4 && mid < 0.6);
    }

    #[test]
    fn test_size_score_bounds() {
        let (_dir, store) = open_store();
        let p = pruner(&store);
        assert!(p.size_score(100) > 0.9);
        assert!(p.size_score(15_000).abs() < f64::EPSILON);
        let mid = p.size_score(7_500);
        assert!(mid > 0.4 && mid < 0.6);
    }

    #[test]
    fn test_access_score_never_accessed_is_zero() {
        let (_dir, store) = open_store();
        let p = pruner(&store);
        assert!(p.access_score(0, None, Utc::now()).abs() < f64::EPSILON);
    }

    #[test]
    fn test_access_score_combines_frequency_and_recency() {
        let (_dir, store) = open_store();
        let p = pruner(&store);
        let now = Utc::now();

        let hot = p.access_score(25, Some(now - Duration::days(1)), now);
        assert!(hot > 0.8);

        let cold = p.access_score(5, Some(now - Duration::days(110)), now);
        assert!(cold < 0.5);

        let frequent_old = p.access_score(20, Some(now - Duration::days(60)), now);
        let rare_recent = p.access_score(5, Some(now - Duration::days(2)), now);
        assert!(frequent_old > 0.3 && frequent_old < 0.8);
        assert!(rare_recent > 0.3 && rare_recent < 0.8);
    }

    #[test]
    fn test_protection_rules() {
        let (_dir, store) = open_store();
        let p = pruner(&store);
        let now = Utc::now();

        let important = aged("vital", 200, 0, 0.9);
        assert_eq!(p.protection_reason(&important, now), Some("high_importance"));

        let popular = aged("popular", 200, 15, 0.2);
        assert_eq!(p.protection_reason(&popular, now), Some("high_access_count"));

        let young = aged("fresh", 5, 0, 0.2);
        assert_eq!(p.protection_reason(&young, now), Some("recent"));

        let mut manual = aged("hand entered", 200, 0, 0.2);
        manual.source_type = "manual".to_string();
        assert_eq!(p.protection_reason(&manual, now), Some("protected_source"));

        let mut preference = aged("prefers tabs", 200, 0, 0.2);
        preference.memory_type = MemoryType::Preference;
        assert_eq!(p.protection_reason(&preference, now), Some("preference_type"));

        let unprotected = aged("disposable", 200, 2, 0.2);
        assert_eq!(p.protection_reason(&unprotected, now), None);
    }

    #[test]
    fn test_dry_run_then_real_prune() {
        let (_dir, store) = open_store();
        // Low-value: old, never accessed, low importance
        for i in 0..5 {
            store
                .store_memory(&aged(&format!("stale observation number {i}"), 360, 0, 0.1))
                .unwrap();
        }
        // High-value: important
        store
            .store_memory(&aged("the critical architecture decision", 360, 0, 0.95))
            .unwrap();

        let p = pruner(&store);
        let before = store.count_live().unwrap();

        let dry = p.prune(Some(0.3), true).unwrap();
        assert!(dry.dry_run);
        assert_eq!(dry.pruned, 0);
        assert_eq!(dry.archived, 0);
        assert_eq!(dry.candidates, 5);
        assert_eq!(store.count_live().unwrap(), before);

        let wet = p.prune(Some(0.3), false).unwrap();
        assert_eq!(wet.pruned, dry.candidates);
        assert_eq!(wet.archived, dry.candidates);
        assert_eq!(store.count_live().unwrap(), before - dry.candidates as u64);
        assert_eq!(store.archive_count().unwrap(), dry.candidates as u64);
    }

    #[test]
    fn test_protected_memories_survive_any_threshold() {
        let (_dir, store) = open_store();
        let protected = aged("crucial but old and unread", 300, 0, 0.85);
        store.store_memory(&protected).unwrap();

        // Threshold 1.0 condemns everything scoreable
        let result = pruner(&store).prune(Some(1.0), false).unwrap();
        assert_eq!(result.pruned, 0);
        assert_eq!(result.protected, 1);
        assert!(store.get_memory_by_id(&protected.id).unwrap().is_some());
    }

    #[test]
    fn test_archive_carries_prune_score() {
        let (_dir, store) = open_store();
        store
            .store_memory(&aged("low value memory to archive", 360, 0, 0.1))
            .unwrap();

        pruner(&store).prune(Some(0.3), false).unwrap();
        let archives = store.list_archives(10).unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives[0].prune_score < 0.3);
    }

    #[test]
    fn test_custom_protected_source() {
        let (_dir, store) = open_store();
        let mut imported = aged("imported but sacred", 360, 0, 0.1);
        imported.source_type = "git_sync".to_string();
        store.store_memory(&imported).unwrap();

        let config = PruningConfig::default().with_protected_source("git_sync");
        let result = SmartPruner::new(store.clone(), config)
            .prune(Some(0.5), false)
            .unwrap();
        assert_eq!(result.pruned, 0);
        assert_eq!(result.protected, 1);
    }

    #[test]
    fn test_backup_before_prune() {
        let (dir, store) = open_store();
        store
            .store_memory(&aged("backup trigger memory", 360, 0, 0.1))
            .unwrap();

        let config = PruningConfig {
            backup_before_prune: true,
            ..PruningConfig::default()
        };
        let result = SmartPruner::new(store.clone(), config)
            .prune(Some(0.3), false)
            .unwrap();
        let backup = result.backup_path.unwrap();
        assert!(backup.exists());
        drop(dir);
    }
}
